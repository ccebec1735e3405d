use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::ServiceError;
use crate::messaging::InboundMessage;

// ============================================================================
// Dead Letter Hook
// ============================================================================
//
// Receives every message the ingestion loop could not process. The offset of
// such a message is never committed by the loop; the sink only records it
// for operators. The default sink logs. A sink that writes to a dedicated
// topic or table can be plugged in without touching the loop.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Short error class, e.g. `malformed` or `duplicate_key`
    pub error_kind: &'static str,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: &InboundMessage, error: &ServiceError) -> Self {
        Self {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            payload: message.payload.clone(),
            error_kind: error.kind(),
            error_message: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, letter: DeadLetter);
}

/// Logs dead letters at `error`; keeps nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn send(&self, letter: DeadLetter) {
        tracing::error!(
            topic = %letter.topic,
            partition = letter.partition,
            offset = letter.offset,
            error_kind = letter.error_kind,
            error = %letter.error_message,
            payload_bytes = letter.payload.len(),
            failed_at = %letter.failed_at,
            "💀 Message could not be processed, offset left uncommitted"
        );
    }
}
