//! Queue inspector - reads the approximate backlog from the queue collaborator

use crate::capacity::BacklogSnapshot;
use crate::error::ScalingError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const COLLABORATOR: &str = "queue";

pub const MESSAGE_COUNT_ATTRIBUTE: &str = "ApproximateNumberOfMessages";
pub const IN_FLIGHT_COUNT_ATTRIBUTE: &str = "ApproximateNumberOfMessagesNotVisible";

/// Read-only view of the queue feeding the worker pool
#[async_trait]
pub trait QueueInspector: Send + Sync {
    /// Observe the current backlog
    async fn backlog(&self) -> Result<BacklogSnapshot, ScalingError>;
}

/// Queue attributes response. Only the counts are read; every other
/// attribute is skipped whatever its shape.
#[derive(Debug, Deserialize)]
struct QueueAttributesResponse {
    #[serde(rename = "Attributes")]
    attributes: QueueAttributes,
}

#[derive(Debug, Deserialize)]
struct QueueAttributes {
    #[serde(rename = "ApproximateNumberOfMessages")]
    messages: Option<ReportedCount>,
    #[serde(rename = "ApproximateNumberOfMessagesNotVisible")]
    in_flight: Option<ReportedCount>,
}

/// A count may be string- or number-encoded
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReportedCount {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl ReportedCount {
    fn parse(&self, attribute: &str) -> Result<i64, ScalingError> {
        match self {
            ReportedCount::Number(n) => Ok(*n),
            ReportedCount::Text(s) => s.trim().parse().map_err(|_| {
                ScalingError::observation(
                    COLLABORATOR,
                    format!("attribute {} is not an integer: {:?}", attribute, s),
                )
            }),
            ReportedCount::Other(v) => Err(ScalingError::observation(
                COLLABORATOR,
                format!("attribute {} is not an integer: {}", attribute, v),
            )),
        }
    }
}

/// Queue inspector backed by the queue service's HTTP attributes endpoint
pub struct HttpQueueInspector {
    attributes_url: String,
    client: reqwest::Client,
}

impl HttpQueueInspector {
    pub fn new(endpoint: &str, queue_identifier: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build queue HTTP client")?;

        Ok(Self {
            attributes_url: format!(
                "{}/queues/{}/attributes",
                endpoint.trim_end_matches('/'),
                queue_identifier
            ),
            client,
        })
    }
}

#[async_trait]
impl QueueInspector for HttpQueueInspector {
    async fn backlog(&self) -> Result<BacklogSnapshot, ScalingError> {
        let response = self
            .client
            .get(&self.attributes_url)
            .send()
            .await
            .map_err(|e| ScalingError::observation(COLLABORATOR, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ScalingError::observation(
                COLLABORATOR,
                format!("queue API returned error status {}: {}", status, body),
            ));
        }

        let parsed: QueueAttributesResponse = response.json().await.map_err(|e| {
            ScalingError::observation(COLLABORATOR, format!("malformed attributes response: {}", e))
        })?;
        let observed_at = Utc::now();

        let messages = parsed
            .attributes
            .messages
            .as_ref()
            .ok_or_else(|| {
                ScalingError::observation(
                    COLLABORATOR,
                    format!("attributes response has no {}", MESSAGE_COUNT_ATTRIBUTE),
                )
            })?
            .parse(MESSAGE_COUNT_ATTRIBUTE)?;

        let mut snapshot = BacklogSnapshot::from_reported(messages, observed_at)?;

        if let Some(in_flight) = &parsed.attributes.in_flight {
            // In-flight is informational; an unusable value is dropped, not fatal
            match in_flight
                .parse(IN_FLIGHT_COUNT_ATTRIBUTE)
                .ok()
                .and_then(|n| u64::try_from(n).ok())
            {
                Some(n) => snapshot = snapshot.with_in_flight(n),
                None => debug!("Ignoring unusable in-flight count"),
            }
        }

        debug!(
            url = %self.attributes_url,
            backlog = snapshot.approximate_message_count,
            in_flight = ?snapshot.approximate_in_flight_count,
            "Observed queue backlog"
        );
        Ok(snapshot)
    }
}
