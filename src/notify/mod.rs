// Bucket notifications
//
// The media bucket publishes S3 event notifications to a queue. A
// `NotificationSource` fetches raw messages from it and a `Subscription`
// turns them into a pull-based, cancellable sequence of `ObjectCreated`
// events:
// - SQS: aws-sdk-sqs implementation of `NotificationSource`

pub mod event;
pub mod sqs;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use event::{ObjectCreated, parse_event_message};
pub use sqs::SqsNotificationSource;

use crate::error::Result;

/// Pause after a failed poll before asking the source again
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A message as delivered by the queue
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Handle used to delete the message once processed
    pub receipt: String,
    pub body: String,
}

/// Queue-like source of event notification messages
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Wait for the next batch. An empty batch is a normal long-poll timeout.
    async fn receive(&self) -> Result<Vec<RawMessage>>;

    /// Remove a processed message so it is not delivered again
    async fn acknowledge(&self, receipt: &str) -> Result<()>;
}

/// Lazy, infinite sequence of object-created events.
///
/// Records are handed out one at a time. The message they came from is
/// acknowledged only when the consumer asks for the record after its last
/// one, so a message is never removed before all of its records were
/// processed. Anything not acknowledged is redelivered by the queue.
pub struct Subscription {
    source: Box<dyn NotificationSource>,
    bucket: String,
    event_prefix: String,
    cancel: CancellationToken,
    retry_delay: Duration,
    pending: VecDeque<RawMessage>,
    buffer: VecDeque<ObjectCreated>,
    unacked: Option<String>,
    backing_off: bool,
}

impl Subscription {
    pub fn new(
        source: Box<dyn NotificationSource>,
        bucket: impl Into<String>,
        event_prefix: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            bucket: bucket.into(),
            event_prefix: event_prefix.into(),
            cancel,
            retry_delay: RECEIVE_RETRY_DELAY,
            pending: VecDeque::new(),
            buffer: VecDeque::new(),
            unacked: None,
            backing_off: false,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Next event, an inline error for a bad delivery, or `None` once cancelled.
    pub async fn next(&mut self) -> Option<Result<ObjectCreated>> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            if let Some(event) = self.buffer.pop_front() {
                return Some(Ok(event));
            }

            if let Some(receipt) = self.unacked.take() {
                self.acknowledge(&receipt).await;
            }

            if let Some(message) = self.pending.pop_front() {
                match parse_event_message(&message.body, &self.bucket, &self.event_prefix) {
                    Ok(events) => {
                        debug!("Message carries {} matching records", events.len());
                        self.buffer.extend(events);
                        self.unacked = Some(message.receipt);
                    }
                    Err(e) => {
                        // Redelivering a malformed message would fail forever
                        self.acknowledge(&message.receipt).await;
                        return Some(Err(e));
                    }
                }
                continue;
            }

            if self.backing_off {
                self.backing_off = false;
                tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(self.retry_delay) => {}
                }
            }

            let received = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                received = self.source.receive() => received,
            };

            match received {
                Ok(messages) => self.pending.extend(messages),
                Err(e) => {
                    self.backing_off = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Release the subscription, acknowledging the last message if all of
    /// its records were handed out.
    pub async fn close(mut self) {
        if self.buffer.is_empty() {
            if let Some(receipt) = self.unacked.take() {
                self.acknowledge(&receipt).await;
            }
        }
        debug!(
            "Subscription closed with {} undelivered messages",
            self.pending.len()
        );
    }

    async fn acknowledge(&self, receipt: &str) {
        if let Err(e) = self.source.acknowledge(receipt).await {
            warn!("Failed to acknowledge message, it will be redelivered: {}", e);
        }
    }
}
