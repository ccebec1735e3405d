use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;

use crate::models::Order;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("publisher unavailable: circuit breaker open")]
    Unavailable,

    #[error("failed to encode order: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("kafka delivery failed: {0}")]
    Delivery(#[from] KafkaError),
}

#[async_trait]
pub trait OrderPublisher: Send + Sync {
    /// Publish `order` to the orders topic, keyed by order_uid
    async fn publish(&self, order: &Order) -> Result<(), PublishError>;
}

/// Kafka producer for the orders topic, guarded by a circuit breaker
pub struct KafkaOrderPublisher {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl KafkaOrderPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            open_for: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            topic: topic.to_string(),
            circuit_breaker: CircuitBreaker::new("kafka_producer", cb_config),
            send_timeout: Duration::from_secs(5),
        })
    }

    /// Wait for queued messages to be delivered before shutdown
    pub async fn flush(&self, timeout: Duration) {
        let producer = self.producer.clone();
        match tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout))).await {
            Ok(Ok(())) => tracing::info!("Kafka producer flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Kafka producer flush incomplete"),
            Err(e) => tracing::warn!(error = %e, "Kafka producer flush task failed"),
        }
    }
}

#[async_trait]
impl OrderPublisher for KafkaOrderPublisher {
    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(order)?;

        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic)
                    .key(order.order_uid.as_str())
                    .payload(payload.as_slice());

                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    topic = %self.topic,
                    order_uid = %order.order_uid,
                    "📤 Published order to Kafka"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %self.topic, "Circuit breaker open - Kafka unavailable");
                Err(PublishError::Unavailable)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(
                    error = %e,
                    topic = %self.topic,
                    order_uid = %order.order_uid,
                    "Failed to publish order to Kafka"
                );
                Err(PublishError::Delivery(e))
            }
        }
    }
}
