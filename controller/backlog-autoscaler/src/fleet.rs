//! Fleet collaborators - reads the running worker count and writes the desired count
//!
//! The orchestrator HTTP client implements both sides. The log-only scaler is
//! used for dry runs: it records what would have been written and succeeds.

use crate::capacity::FleetSnapshot;
use crate::error::ScalingError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const COLLABORATOR: &str = "fleet";

/// Read-only view of the worker fleet
#[async_trait]
pub trait FleetInspector: Send + Sync {
    /// Observe the number of workers currently running
    async fn active_workers(&self) -> Result<FleetSnapshot, ScalingError>;
}

/// Write side of the orchestrator
#[async_trait]
pub trait FleetScaler: Send + Sync {
    /// Request that the fleet run `count` workers
    async fn set_desired_worker_count(&self, count: u32) -> Result<(), ScalingError>;
}

/// Dry-run scaler (log only)
pub struct LogOnlyFleetScaler {
    cluster: String,
    service: String,
}

impl LogOnlyFleetScaler {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
        }
    }
}

#[async_trait]
impl FleetScaler for LogOnlyFleetScaler {
    async fn set_desired_worker_count(&self, count: u32) -> Result<(), ScalingError> {
        info!(
            cluster = %self.cluster,
            service = %self.service,
            desired_count = count,
            "Scaling action (log-only mode)"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RunningTasksResponse {
    #[serde(rename = "taskArns")]
    task_arns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DesiredCountRequest<'a> {
    cluster: &'a str,
    service: &'a str,
    #[serde(rename = "desiredCount")]
    desired_count: u32,
}

/// HTTP client for the orchestration collaborator
pub struct HttpOrchestratorClient {
    service_url: String,
    cluster: String,
    service: String,
    client: reqwest::Client,
}

impl HttpOrchestratorClient {
    pub fn new(
        endpoint: &str,
        cluster: &str,
        service: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build orchestrator HTTP client")?;

        Ok(Self {
            service_url: format!(
                "{}/clusters/{}/services/{}",
                endpoint.trim_end_matches('/'),
                cluster,
                service
            ),
            cluster: cluster.to_string(),
            service: service.to_string(),
            client,
        })
    }
}

#[async_trait]
impl FleetInspector for HttpOrchestratorClient {
    async fn active_workers(&self) -> Result<FleetSnapshot, ScalingError> {
        let url = format!("{}/tasks", self.service_url);
        let response = self
            .client
            .get(&url)
            .query(&[("desiredStatus", "RUNNING")])
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
                format!("orchestrator returned error status {}: {}", status, body),
            ));
        }

        let tasks: RunningTasksResponse = response.json().await.map_err(|e| {
            ScalingError::observation(COLLABORATOR, format!("malformed task list: {}", e))
        })?;
        let active = u32::try_from(tasks.task_arns.len()).map_err(|_| {
            ScalingError::observation(COLLABORATOR, "running task count exceeds u32")
        })?;

        debug!(
            cluster = %self.cluster,
            service = %self.service,
            active_workers = active,
            "Observed running workers"
        );
        Ok(FleetSnapshot::new(active, Utc::now()))
    }
}

#[async_trait]
impl FleetScaler for HttpOrchestratorClient {
    async fn set_desired_worker_count(&self, count: u32) -> Result<(), ScalingError> {
        let url = format!("{}/desired-count", self.service_url);
        let request = DesiredCountRequest {
            cluster: &self.cluster,
            service: &self.service,
            desired_count: count,
        };

        let failed = |message: String| ScalingError::ScalingActionFailed {
            attempted: count,
            message,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| failed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(failed(format!(
                "orchestrator returned error status {}: {}",
                status, body
            )));
        }

        info!(
            cluster = %self.cluster,
            service = %self.service,
            desired_count = count,
            status = %status,
            "Orchestrator accepted desired count"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_only_scaler_succeeds() {
        let scaler = LogOnlyFleetScaler::new("queue-cluster", "queue-processing");
        assert!(scaler.set_desired_worker_count(7).await.is_ok());
    }

    #[test]
    fn test_service_url() {
        let client = HttpOrchestratorClient::new(
            "http://orchestrator:8080/",
            "queue-cluster",
            "queue-processing",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.service_url,
            "http://orchestrator:8080/clusters/queue-cluster/services/queue-processing"
        );
    }
}
