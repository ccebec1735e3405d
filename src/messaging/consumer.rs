use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::{Message, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;

use super::{CommitError, InboundMessage, MessageSource, PollError};

// ============================================================================
// Kafka Order Source
// ============================================================================
//
// Manual-commit consumer: auto commit is off, and the ingestion loop commits
// each message only after its order is persisted. The committed position is
// `offset + 1`, the next message to read.
//
// Commits are synchronous so a broker rejection comes back as the result of
// `commit` and reaches the retry path. librdkafka blocks the calling thread
// for the round trip, so the call runs on the blocking pool.
//
// ============================================================================

pub struct KafkaOrderSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaOrderSource {
    pub fn new(brokers: &str, group_id: &str, offset_reset: &str, topic: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("auto.offset.reset", offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()?;

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaOrderSource {
    async fn subscribe(&self) -> Result<(), PollError> {
        self.consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(classify_poll_error)?;

        tracing::info!(topic = %self.topic, "Subscribed to Kafka topic");
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<InboundMessage>, PollError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(classify_poll_error(e)),
            Ok(Ok(message)) => Ok(Some(InboundMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            })),
        }
    }

    async fn commit(&self, message: &InboundMessage) -> Result<(), CommitError> {
        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| CommitError::new(message, e.to_string(), false))?;

        let consumer = Arc::clone(&self.consumer);
        let committed = tokio::task::spawn_blocking(move || consumer.commit(&positions, CommitMode::Sync))
            .await
            .map_err(|e| CommitError::new(message, format!("commit task failed: {e}"), true))?;

        committed.map_err(|e| {
            let transient = is_transient_commit_error(&e);
            CommitError::new(message, e.to_string(), transient)
        })
    }

    async fn close(&self) {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Kafka consumer unsubscribed");
    }
}

fn classify_poll_error(err: KafkaError) -> PollError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) => PollError::Unavailable(err.to_string()),
        _ => PollError::Transient(err.to_string()),
    }
}

/// Losing partition ownership cannot be fixed by committing again
fn is_transient_commit_error(err: &KafkaError) -> bool {
    !matches!(
        err.rdkafka_error_code(),
        Some(RDKafkaErrorCode::IllegalGeneration)
            | Some(RDKafkaErrorCode::UnknownMemberId)
            | Some(RDKafkaErrorCode::RebalanceInProgress)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_brokers_down_is_unavailable() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown);
        assert!(matches!(classify_poll_error(err), PollError::Unavailable(_)));
    }

    #[test]
    fn test_other_consume_errors_are_transient() {
        let err = KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure);
        assert!(matches!(classify_poll_error(err), PollError::Transient(_)));
    }

    #[test]
    fn test_rebalance_commit_errors_are_permanent() {
        let err = KafkaError::ConsumerCommit(RDKafkaErrorCode::RebalanceInProgress);
        assert!(!is_transient_commit_error(&err));

        let err = KafkaError::ConsumerCommit(RDKafkaErrorCode::RequestTimedOut);
        assert!(is_transient_commit_error(&err));
    }
}
