// ============================================================================
// Messaging - queue transport seams
// ============================================================================
//
// Inbound:  MessageSource (subscribe, poll with timeout, per-message commit)
//           implemented by KafkaOrderSource
// Outbound: OrderPublisher (publish an order to the orders topic)
//           implemented by KafkaOrderPublisher
//
// The ingestion loop and HTTP layer only see the traits.
//
// ============================================================================

mod consumer;
mod producer;

use async_trait::async_trait;
use std::time::Duration;

use crate::utils::IsTransient;

pub use consumer::KafkaOrderSource;
pub use producer::{KafkaOrderPublisher, OrderPublisher, PublishError};

/// One message pulled from the queue, detached from the client's buffers
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The whole backing cluster is unreachable; polling cannot make progress
    #[error("broker cluster unavailable: {0}")]
    Unavailable(String),

    #[error("transient transport error: {0}")]
    Transient(String),

    #[error("message source closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
#[error("offset commit failed for {topic}[{partition}]@{offset}: {reason}")]
pub struct CommitError {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub reason: String,
    pub transient: bool,
}

impl CommitError {
    pub fn new(message: &InboundMessage, reason: impl Into<String>, transient: bool) -> Self {
        Self {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            reason: reason.into(),
            transient,
        }
    }
}

impl IsTransient for CommitError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Join the consumer group for the configured topic
    async fn subscribe(&self) -> Result<(), PollError>;

    /// Wait at most `timeout` for the next message; `Ok(None)` means nothing arrived
    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, PollError>;

    /// Acknowledge `message` so it is not redelivered
    async fn commit(&self, message: &InboundMessage) -> Result<(), CommitError>;

    /// Leave the group and release the connection
    async fn close(&self);
}
