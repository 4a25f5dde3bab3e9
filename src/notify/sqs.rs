//! SQS notification source.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::Credentials;
use tracing::debug;

use super::{NotificationSource, RawMessage};
use crate::config::{NotificationConfig, StoreConfig};
use crate::error::{Result, ThumbnailerError};

/// Receives the media bucket's event notifications from an SQS queue.
pub struct SqsNotificationSource {
    client: Client,
    queue_url: String,
    wait_time_seconds: i32,
    max_batch_size: i32,
}

impl SqsNotificationSource {
    pub fn new(client: Client, queue_url: impl Into<String>, config: &NotificationConfig) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            wait_time_seconds: config.wait_time(),
            max_batch_size: config.batch_size(),
        }
    }

    /// Create a source that shares region and credentials with the object store.
    ///
    /// The client is pointed at `notifications.endpoint`, or at the scheme and
    /// host of `queue_url` when no endpoint is configured.
    pub async fn from_config(
        store: &StoreConfig,
        notifications: &NotificationConfig,
        queue_url: &str,
    ) -> Result<Self> {
        let endpoint = notifications.endpoint_url(queue_url)?;
        let credentials = Credentials::new(
            &store.access_key,
            &store.secret_key,
            None,
            None,
            "s3g-thumbnailer",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(store.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(&endpoint)
            .load()
            .await;

        debug!(endpoint = %endpoint, queue_url = %queue_url, "SQS client configured");
        Ok(Self::new(Client::new(&aws_config), queue_url, notifications))
    }
}

#[async_trait]
impl NotificationSource for SqsNotificationSource {
    async fn receive(&self) -> Result<Vec<RawMessage>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_batch_size)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .map_err(|e| ThumbnailerError::Notification(format!("SQS receive failed: {}", e)))?;

        let messages: Vec<RawMessage> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|msg| RawMessage {
                receipt: msg.receipt_handle.unwrap_or_default(),
                body: msg.body.unwrap_or_default(),
            })
            .collect();

        debug!("Received {} messages from SQS", messages.len());
        Ok(messages)
    }

    async fn acknowledge(&self, receipt: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| ThumbnailerError::Notification(format!("SQS delete failed: {}", e)))?;
        Ok(())
    }
}
