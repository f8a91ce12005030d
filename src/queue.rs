use crate::config::QueueConfig;
use crate::error::IngestError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client as SqsClient;
use tracing::{debug, info};

/// A raw message received from the queue
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Raw message body (JSON string)
    pub body: String,
    /// Provider handle used to acknowledge (delete) the message
    pub receipt_handle: String,
    /// How many times this message has been delivered, for operators
    /// watching for poison messages
    pub receive_count: u32,
}

/// Trait for the at-least-once delivery queue the worker consumes.
///
/// Implementations long-poll for at most one message per call and remove
/// messages only on explicit acknowledgment; unacknowledged messages become
/// redeliverable after the provider's visibility timeout.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Poll for at most one message, blocking up to the long-poll wait.
    ///
    /// Returns `None` when the queue is empty.
    async fn receive(&self) -> Result<Option<QueueMessage>, IngestError>;

    /// Acknowledge successful processing: removes the message from the queue.
    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), IngestError>;
}

/// SQS-backed queue consumer
pub struct SqsQueue {
    client: SqsClient,
    queue_url: String,
    wait_time_seconds: i32,
}

impl SqsQueue {
    /// Create a new SQS queue consumer
    pub async fn new(config: &QueueConfig) -> Result<Self, IngestError> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut sqs_config_builder = aws_sdk_sqs::config::Builder::from(&aws_config);

        // Configure custom endpoint for LocalStack/ElasticMQ
        if let Some(ref endpoint_url) = config.endpoint_url {
            sqs_config_builder = sqs_config_builder.endpoint_url(endpoint_url);
        }

        let client = SqsClient::from_conf(sqs_config_builder.build());

        info!(
            queue_url = %config.queue_url,
            region = %config.region,
            "SQS queue consumer initialized"
        );

        Ok(Self {
            client,
            queue_url: config.queue_url.clone(),
            wait_time_seconds: config.wait_time_seconds as i32,
        })
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>, IngestError> {
        debug!(wait_time_seconds = self.wait_time_seconds, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(|e| IngestError::QueueTransport(format!("SQS receive failed: {e:?}")))?;

        let Some(message) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };

        let receipt_handle = message
            .receipt_handle()
            .ok_or_else(|| IngestError::QueueTransport("message missing receipt handle".into()))?
            .to_string();

        let body = message.body().unwrap_or("").to_string();

        let receive_count = message
            .attributes()
            .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
            .and_then(|c| c.parse::<u32>().ok())
            .unwrap_or(1);

        debug!(receive_count, "Received SQS message");

        Ok(Some(QueueMessage {
            body,
            receipt_handle,
            receive_count,
        }))
    }

    async fn acknowledge(&self, receipt_handle: &str) -> Result<(), IngestError> {
        debug!(receipt_handle, "Deleting SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| IngestError::QueueTransport(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }
}
