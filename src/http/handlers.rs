use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::domain::order::{generate_random_order, ServiceError};
use crate::models::Order;
use super::error::error_response;
use super::AppState;

pub const MAX_GENERATE_COUNT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishedOrders {
    pub published: Vec<String>,
}

/// GET /order/{order_uid}
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let order = state.service.get_order_by_id(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

/// POST /order
pub async fn create_order(state: web::Data<AppState>, body: web::Bytes) -> Result<HttpResponse, ServiceError> {
    let order = Order::from_json(&body).map_err(ServiceError::Malformed)?;
    state.service.create_order(&order).await?;
    Ok(HttpResponse::Created().json(order))
}

/// POST /order/publish
pub async fn publish_order(state: web::Data<AppState>, body: web::Bytes) -> actix_web::Result<HttpResponse> {
    let order = Order::from_json(&body).map_err(ServiceError::Malformed)?;
    order.validate().map_err(ServiceError::from)?;

    state.publisher.publish(&order).await?;
    Ok(HttpResponse::Accepted().json(PublishedOrders {
        published: vec![order.order_uid],
    }))
}

/// GET /order/generate?count=N
pub async fn generate_orders(
    state: web::Data<AppState>,
    params: web::Query<GenerateParams>,
) -> actix_web::Result<HttpResponse> {
    let count = params.count.unwrap_or(1);
    if count == 0 || count > MAX_GENERATE_COUNT {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            format!("count must be between 1 and {MAX_GENERATE_COUNT}"),
        ));
    }

    let mut published = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let order = generate_random_order();
        if let Err(e) = state.publisher.publish(&order).await {
            tracing::warn!(
                published = published.len(),
                requested = count,
                "Stopped generating orders after publish failure"
            );
            return Err(e.into());
        }
        published.push(order.order_uid);
    }

    tracing::info!(count = published.len(), "🎲 Generated and published random orders");
    Ok(HttpResponse::Accepted().json(PublishedOrders { published }))
}

/// GET /health
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let health = state.health.check().await;
    if health.overall_status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(health)
    } else {
        HttpResponse::Ok().json(health)
    }
}
