//! Amazon SQS queues.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::types::{
    DeleteMessageBatchRequestEntry, QueueAttributeName, SendMessageBatchRequestEntry,
};
use aws_sdk_sqs::Client;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use serde::Deserialize;
use tracing::info;

use crate::error::{Result, WorkerError};
use crate::queue::{
    check_batch_len, dead_letter_queue_name, verify_queue_name, BatchResult, DeleteEntry,
    MessageQueue, QueueMessage, SendEntry, MAX_BATCH,
};

/// Client tuning for SQS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// Endpoint override (LocalStack)
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Retries after the initial attempt
    pub max_retries: Option<u32>,
}

/// Attributes of a newly created source queue.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub visibility_timeout: Duration,
    pub retention_period: Duration,
    /// Receives before SQS itself moves a message to the dead-letter queue
    pub max_receive_count: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(18 * 60),
            retention_period: Duration::from_secs(7 * 24 * 3600),
            max_receive_count: 5,
        }
    }
}

/// Build an SQS client from the shared SDK config plus overrides.
pub fn client(sdk_config: &aws_config::SdkConfig, config: &SqsConfig) -> Result<Client> {
    if sdk_config.region().is_none() {
        return Err(WorkerError::invalid_config("AWS region is not configured"));
    }
    let mut builder = aws_sdk_sqs::config::Builder::from(sdk_config);
    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }
    if let Some(retries) = config.max_retries {
        builder = builder
            .retry_config(RetryConfig::standard().with_max_attempts(retries.saturating_add(1)));
    }
    if let Some(ms) = config.timeout_ms {
        builder = builder.timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(ms))
                .build(),
        );
    }
    Ok(Client::from_conf(builder.build()))
}

#[derive(Clone)]
pub struct SqsQueue {
    client: Client,
    name: String,
    url: String,
}

impl Debug for SqsQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsQueue")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}

impl SqsQueue {
    /// Look up an existing queue by name.
    pub async fn open(client: Client, name: &str) -> Result<Self> {
        let response = client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| sqs_error("get_queue_url", name, e))?;
        let url = response
            .queue_url()
            .ok_or_else(|| WorkerError::queue(format!("no URL returned for queue '{name}'")))?
            .to_string();
        Ok(Self {
            client,
            name: name.to_string(),
            url,
        })
    }

    /// Open the `<name>_deadletter` queue paired with this one.
    pub async fn open_dead_letter(&self) -> Result<Self> {
        Self::open(self.client.clone(), &dead_letter_queue_name(&self.name)).await
    }

    /// Create `name` and its dead-letter queue, wiring a redrive policy
    /// between them. Existing queues with the same attributes are reused.
    pub async fn create_with_dead_letter(
        client: Client,
        name: &str,
        settings: &QueueSettings,
    ) -> Result<Self> {
        let dlq_name = dead_letter_queue_name(name);
        verify_queue_name(name)?;

        let dlq = client
            .create_queue()
            .queue_name(&dlq_name)
            .send()
            .await
            .map_err(|e| sqs_error("create_queue", &dlq_name, e))?;
        let dlq_url = dlq
            .queue_url()
            .ok_or_else(|| WorkerError::queue(format!("no URL returned for '{dlq_name}'")))?;

        let attrs = client
            .get_queue_attributes()
            .queue_url(dlq_url)
            .attribute_names(QueueAttributeName::QueueArn)
            .send()
            .await
            .map_err(|e| sqs_error("get_queue_attributes", &dlq_name, e))?;
        let dlq_arn = attrs
            .attributes()
            .and_then(|a| a.get(&QueueAttributeName::QueueArn))
            .ok_or_else(|| WorkerError::queue(format!("no ARN returned for '{dlq_name}'")))?;

        let redrive = serde_json::json!({
            "deadLetterTargetArn": dlq_arn,
            "maxReceiveCount": settings.max_receive_count.to_string(),
        });
        let source = client
            .create_queue()
            .queue_name(name)
            .attributes(
                QueueAttributeName::VisibilityTimeout,
                settings.visibility_timeout.as_secs().to_string(),
            )
            .attributes(
                QueueAttributeName::MessageRetentionPeriod,
                settings.retention_period.as_secs().to_string(),
            )
            .attributes(QueueAttributeName::RedrivePolicy, redrive.to_string())
            .send()
            .await
            .map_err(|e| sqs_error("create_queue", name, e))?;
        let url = source
            .queue_url()
            .ok_or_else(|| WorkerError::queue(format!("no URL returned for '{name}'")))?
            .to_string();

        info!(queue = name, dead_letter = %dlq_name, "created queue");
        Ok(Self {
            client,
            name: name.to_string(),
            url,
        })
    }

    /// Delete this queue.
    pub async fn delete(self) -> Result<()> {
        self.client
            .delete_queue()
            .queue_url(&self.url)
            .send()
            .await
            .map_err(|e| sqs_error("delete_queue", &self.name, e))?;
        info!(queue = %self.name, "deleted queue");
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, max: usize, visibility_timeout: Duration) -> Result<Vec<QueueMessage>> {
        let max = max.clamp(1, MAX_BATCH) as i32;
        let timeout = i32::try_from(visibility_timeout.as_secs())
            .map_err(|_| WorkerError::invalid_config("visibility timeout too large"))?;
        let response = self
            .client
            .receive_message()
            .queue_url(&self.url)
            .max_number_of_messages(max)
            .visibility_timeout(timeout)
            .send()
            .await
            .map_err(|e| sqs_error("receive_message", &self.name, e))?;

        Ok(response
            .messages()
            .iter()
            .filter_map(|m| {
                Some(QueueMessage {
                    id: m.message_id()?.to_string(),
                    receipt: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn send_batch(&self, entries: &[SendEntry]) -> Result<BatchResult> {
        check_batch_len(entries.len())?;
        if entries.is_empty() {
            return Ok(BatchResult::default());
        }
        let mut request = self.client.send_message_batch().queue_url(&self.url);
        for entry in entries {
            request = request.entries(
                SendMessageBatchRequestEntry::builder()
                    .id(sanitise_entry_id(&entry.id))
                    .message_body(&entry.body)
                    .build()
                    .map_err(|e| WorkerError::queue(e.to_string()))?,
            );
        }
        let response = request
            .send()
            .await
            .map_err(|e| sqs_error("send_message_batch", &self.name, e))?;
        Ok(batch_result(
            entries.iter().map(|e| e.id.as_str()),
            response.successful().iter().map(|s| s.id()),
            response.failed().iter().map(|f| f.id()),
        ))
    }

    async fn delete_batch(&self, entries: &[DeleteEntry]) -> Result<BatchResult> {
        check_batch_len(entries.len())?;
        if entries.is_empty() {
            return Ok(BatchResult::default());
        }
        let mut request = self.client.delete_message_batch().queue_url(&self.url);
        for entry in entries {
            request = request.entries(
                DeleteMessageBatchRequestEntry::builder()
                    .id(sanitise_entry_id(&entry.id))
                    .receipt_handle(&entry.receipt)
                    .build()
                    .map_err(|e| WorkerError::queue(e.to_string()))?,
            );
        }
        let response = request
            .send()
            .await
            .map_err(|e| sqs_error("delete_message_batch", &self.name, e))?;
        Ok(batch_result(
            entries.iter().map(|e| e.id.as_str()),
            response.successful().iter().map(|s| s.id()),
            response.failed().iter().map(|f| f.id()),
        ))
    }
}

/// Batch entry ids may only hold alphanumerics, `-` and `_`.
fn sanitise_entry_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(80)
        .collect()
}

/// Map SQS entry ids back to the caller's ids.
fn batch_result<'a>(
    ours: impl Iterator<Item = &'a str>,
    successful: impl Iterator<Item = &'a str>,
    failed: impl Iterator<Item = &'a str>,
) -> BatchResult {
    let ours: Vec<(String, &str)> = ours.map(|id| (sanitise_entry_id(id), id)).collect();
    let lookup = |sent: &str| {
        ours.iter()
            .find(|(s, _)| s == sent)
            .map(|(_, id)| id.to_string())
    };
    BatchResult {
        successful: successful.filter_map(lookup).collect(),
        failed: failed.filter_map(lookup).collect(),
    }
}

fn sqs_error<E: Debug>(op: &str, queue: &str, err: aws_sdk_sqs::error::SdkError<E>) -> WorkerError {
    use aws_sdk_sqs::error::SdkError;

    match &err {
        SdkError::ServiceError(service_err) => WorkerError::queue(format!(
            "{op} on '{queue}' failed (HTTP {}): {err:?}",
            service_err.raw().status().as_u16()
        )),
        SdkError::TimeoutError(_) => WorkerError::queue(format!("{op} on '{queue}' timed out")),
        _ => WorkerError::queue(format!("{op} on '{queue}' failed: {err:?}")),
    }
}
