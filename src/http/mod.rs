use actix_web::body::MessageBody;
use actix_web::dev::{Server, ServiceRequest, ServiceResponse};
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::order::OrderService;
use crate::health::HealthChecker;
use crate::messaging::OrderPublisher;
use crate::metrics::{metrics_handler, Metrics};

pub mod error;
pub mod handlers;

// ============================================================================
// HTTP Surface
// ============================================================================
//
// GET  /order/{order_uid}    read through the cache-aside path
// POST /order                direct create
// POST /order/publish        validate, then publish to the orders topic
// GET  /order/generate       publish N random orders (test data)
// GET  /health               store + cache probes
// GET  /metrics              prometheus exposition
//
// ============================================================================

/// Shared handles for every request handler
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub publisher: Arc<dyn OrderPublisher>,
    pub health: Arc<HealthChecker>,
    pub metrics: Arc<Metrics>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = error::error_response(actix_web::http::StatusCode::BAD_REQUEST, err.to_string());
        actix_web::error::InternalError::from_response(err, response).into()
    }))
    .route("/order", web::post().to(handlers::create_order))
    .route("/order/publish", web::post().to(handlers::publish_order))
    .route("/order/generate", web::get().to(handlers::generate_orders))
    .route("/order/{order_uid}", web::get().to(handlers::get_order))
    .route("/health", web::get().to(handlers::health))
    .route("/metrics", web::get().to(metrics_handler));
}

/// Logs method, path, status and latency for every request
pub async fn request_logger(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let method = req.method().clone();
    let path = req.path().to_string();
    let started = Instant::now();

    let res = next.call(req).await?;

    let status = res.status();
    let latency_ms = started.elapsed().as_millis() as u64;
    if status.is_client_error() || status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = latency_ms,
            "⬅️ Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            latency_ms = latency_ms,
            "⬅️ Request served"
        );
    }

    Ok(res)
}

/// Bind the HTTP server. Signals are handled by the caller.
pub fn build_server(
    state: AppState,
    address: &str,
    request_timeout: Duration,
    idle_timeout: Duration,
) -> std::io::Result<Server> {
    tracing::info!("🌐 Starting HTTP server on http://{}", address);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(state.metrics.clone()))
            .wrap(from_fn(request_logger))
            .configure(configure)
    })
    .client_request_timeout(request_timeout)
    .keep_alive(idle_timeout)
    .disable_signals()
    .bind(address)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryOrderCache;
    use crate::domain::order::generate_random_order;
    use crate::messaging::PublishError;
    use crate::models::Order;
    use crate::store::InMemoryOrderStore;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakePublisher {
        published: Mutex<Vec<String>>,
        unavailable: AtomicBool,
    }

    #[async_trait]
    impl OrderPublisher for FakePublisher {
        async fn publish(&self, order: &Order) -> Result<(), PublishError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PublishError::Unavailable);
            }
            self.published.lock().unwrap().push(order.order_uid.clone());
            Ok(())
        }
    }

    struct Harness {
        store: Arc<InMemoryOrderStore>,
        publisher: Arc<FakePublisher>,
        state: AppState,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        let cache = Arc::new(InMemoryOrderCache::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = Arc::new(FakePublisher::default());
        let service = Arc::new(OrderService::new(
            store.clone(),
            cache.clone(),
            Duration::from_secs(600),
            metrics.clone(),
        ));
        let health = Arc::new(HealthChecker::new(store.clone(), cache, Duration::from_millis(200)));

        let state = AppState {
            service,
            publisher: publisher.clone(),
            health,
            metrics,
        };
        Harness {
            store,
            publisher,
            state,
        }
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .app_data(web::Data::new($state.metrics.clone()))
                    .wrap(from_fn(request_logger))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_create_then_get() {
        let h = harness();
        let app = app!(h.state);
        let order = generate_random_order();

        let req = test::TestRequest::post().uri("/order").set_json(&order).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::get()
            .uri(&format!("/order/{}", order.order_uid))
            .to_request();
        let loaded: Order = test::call_and_read_body_json(&app, req).await;
        assert_eq!(loaded, order);
    }

    #[actix_web::test]
    async fn test_duplicate_create_is_conflict() {
        let h = harness();
        let app = app!(h.state);
        let order = generate_random_order();

        let req = test::TestRequest::post().uri("/order").set_json(&order).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post().uri("/order").set_json(&order).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(h.store.len(), 1);
    }

    #[actix_web::test]
    async fn test_bad_body_is_json_bad_request() {
        let h = harness();
        let app = app!(h.state);

        let req = test::TestRequest::post()
            .uri("/order")
            .insert_header(("content-type", "application/json"))
            .set_payload("{oops")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));
    }

    #[actix_web::test]
    async fn test_unknown_order_is_not_found() {
        let h = harness();
        let app = app!(h.state);

        let req = test::TestRequest::get().uri("/order/does-not-exist").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_store_outage_is_generic_500() {
        let h = harness();
        let app = app!(h.state);
        h.store.set_unavailable(true);

        let req = test::TestRequest::get().uri("/order/any").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn test_publish_validates_before_sending() {
        let h = harness();
        let app = app!(h.state);
        let mut order = generate_random_order();
        order.order_uid.clear();

        let req = test::TestRequest::post().uri("/order/publish").set_json(&order).to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(h.publisher.published.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_publish_unavailable_is_503() {
        let h = harness();
        let app = app!(h.state);
        h.publisher.unavailable.store(true, Ordering::SeqCst);

        let req = test::TestRequest::post()
            .uri("/order/publish")
            .set_json(generate_random_order())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_generate_publishes_requested_count() {
        let h = harness();
        let app = app!(h.state);

        let req = test::TestRequest::get().uri("/order/generate?count=3").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body: handlers::PublishedOrders = test::read_body_json(resp).await;
        assert_eq!(body.published.len(), 3);
        assert_eq!(*h.publisher.published.lock().unwrap(), body.published);
    }

    #[actix_web::test]
    async fn test_generate_rejects_out_of_range_count() {
        let h = harness();
        let app = app!(h.state);

        let req = test::TestRequest::get().uri("/order/generate?count=5000").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/order/generate?count=abc").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_health_reflects_store() {
        let h = harness();
        let app = app!(h.state);

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        h.store.set_unavailable(true);
        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[actix_web::test]
    async fn test_metrics_exposition() {
        let h = harness();
        let app = app!(h.state);
        h.state.metrics.orders_created.inc();

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert!(String::from_utf8_lossy(&body).contains("orders_created"));
    }
}
