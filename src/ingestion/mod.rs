use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::order::{OrderService, ServiceError};
use crate::messaging::{InboundMessage, MessageSource, PollError};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

mod dead_letter;

pub use dead_letter::{DeadLetter, DeadLetterSink, LoggingDeadLetterSink};

// ============================================================================
// Ingestion Loop
// ============================================================================
//
// Polling
//   message     -> handle -> ok:  commit offset+1 -> Polling
//                         -> err: dead letter, no commit -> Polling
//   transient   -> log -> Polling
//   unavailable -> Stopped(BrokerUnavailable)
//   closed      -> Stopped(SourceClosed)
//   cancelled   -> Stopped(Cancelled)
//
// Only the poll races against the stop signal. Once a message is pulled, it
// is handled and committed to completion before the signal is looked at
// again, so a stop never interrupts a write in progress.
//
// ============================================================================

/// Processes one raw message payload
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), ServiceError>;
}

#[async_trait]
impl MessageHandler for OrderService {
    async fn handle(&self, payload: &[u8]) -> Result<(), ServiceError> {
        self.handle_order(payload).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    BrokerUnavailable,
    SourceClosed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Cancelled => "cancelled",
            StopReason::BrokerUnavailable => "broker_unavailable",
            StopReason::SourceClosed => "source_closed",
        }
    }
}

pub struct IngestionLoop {
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn MessageHandler>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<Metrics>,
    poll_timeout: Duration,
    commit_retry: RetryConfig,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<Metrics>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            handler,
            dead_letters: Arc::new(LoggingDeadLetterSink),
            metrics,
            poll_timeout,
            commit_retry: RetryConfig::commit(),
        }
    }

    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    pub fn with_commit_retry(mut self, config: RetryConfig) -> Self {
        self.commit_retry = config;
        self
    }

    /// Run the loop on its own task
    pub fn spawn(self, shutdown: CancellationToken) -> IngestionHandle {
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        IngestionHandle { shutdown, task }
    }

    /// Subscribe, then poll until stopped. The source is closed on every exit path.
    pub async fn run(&self, shutdown: CancellationToken) -> StopReason {
        if let Err(e) = self.source.subscribe().await {
            tracing::error!(error = %e, "Failed to subscribe, ingestion not started");
            self.source.close().await;
            return match e {
                PollError::Closed => StopReason::SourceClosed,
                _ => StopReason::BrokerUnavailable,
            };
        }

        tracing::info!(
            poll_timeout_ms = self.poll_timeout.as_millis() as u64,
            "🚀 Ingestion loop started"
        );

        let reason = loop {
            let polled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StopReason::Cancelled,
                polled = self.source.poll(self.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => continue,
                Ok(Some(message)) => self.process(&message).await,
                Err(PollError::Transient(reason)) => {
                    tracing::warn!(error = %reason, "Transient poll error, continuing");
                }
                Err(PollError::Unavailable(reason)) => {
                    tracing::error!(error = %reason, "Broker cluster unavailable, stopping ingestion");
                    break StopReason::BrokerUnavailable;
                }
                Err(PollError::Closed) => break StopReason::SourceClosed,
            }
        };

        self.source.close().await;
        tracing::info!(reason = reason.as_str(), "🛑 Ingestion loop stopped");
        reason
    }

    async fn process(&self, message: &InboundMessage) {
        tracing::debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Message received"
        );

        match self.handler.handle(&message.payload).await {
            Ok(()) => self.commit(message).await,
            Err(e) => {
                let outcome = match e {
                    ServiceError::Malformed(_) => "malformed",
                    _ => "failed",
                };
                self.metrics.record_ingest(outcome);
                self.dead_letters.send(DeadLetter::new(message, &e)).await;
            }
        }
    }

    async fn commit(&self, message: &InboundMessage) {
        let source: &dyn MessageSource = self.source.as_ref();

        let result = retry_on_transient(self.commit_retry.clone(), move |_attempt| source.commit(message))
            .await
            .into_result();

        match result {
            Ok(()) => {
                self.metrics.record_ingest("committed");
                tracing::debug!(
                    partition = message.partition,
                    offset = message.offset,
                    "Offset committed"
                );
            }
            Err(e) => {
                self.metrics.record_ingest("commit_failed");
                tracing::warn!(
                    error = %e,
                    "Order persisted but offset not committed, message will be redelivered"
                );
            }
        }
    }
}

/// Owner's side of a spawned ingestion loop
pub struct IngestionHandle {
    shutdown: CancellationToken,
    task: JoinHandle<StopReason>,
}

impl IngestionHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait up to `drain_timeout` for it.
    ///
    /// Returns `None` when the loop did not finish in time. The task is left
    /// running in that case so the in-flight message still completes.
    pub async fn shutdown(self, drain_timeout: Duration) -> Option<StopReason> {
        self.shutdown.cancel();

        let mut task = self.task;
        match tokio::time::timeout(drain_timeout, &mut task).await {
            Ok(Ok(reason)) => Some(reason),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Ingestion task failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    drain_timeout_ms = drain_timeout.as_millis() as u64,
                    "Ingestion drain timed out, in-flight message left to finish"
                );
                None
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
