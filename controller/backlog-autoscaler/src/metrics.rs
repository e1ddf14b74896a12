//! Backlog-per-worker metric emission
//!
//! The emitted datum is what an external target-tracking policy consumes when
//! actuation is delegated. Delivery failures never abort a cycle; callers log
//! them and carry on.

use crate::error::ScalingError;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// One backlog-per-worker measurement with its publishing coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogMetric {
    pub namespace: String,
    pub name: String,
    pub unit: String,
    pub value: f64,
    pub cluster: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

/// Where backlog metrics are published, fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTarget {
    pub namespace: String,
    pub name: String,
    pub unit: String,
    pub cluster: String,
    pub service: String,
}

impl MetricTarget {
    pub fn datum(&self, value: f64, timestamp: DateTime<Utc>) -> BacklogMetric {
        BacklogMetric {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
            value,
            cluster: self.cluster.clone(),
            service: self.service.clone(),
            timestamp,
        }
    }
}

/// Publishes metrics to an observability collaborator
#[async_trait]
pub trait MetricEmitter: Send + Sync {
    async fn emit(&self, metric: &BacklogMetric) -> Result<(), ScalingError>;
}

/// Emitter used when no metrics endpoint is configured
pub struct LogOnlyMetricEmitter;

#[async_trait]
impl MetricEmitter for LogOnlyMetricEmitter {
    async fn emit(&self, metric: &BacklogMetric) -> Result<(), ScalingError> {
        info!(
            namespace = %metric.namespace,
            metric = %metric.name,
            value = metric.value,
            unit = %metric.unit,
            cluster = %metric.cluster,
            service = %metric.service,
            "Backlog metric (log-only mode)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PutMetricDataRequest<'a> {
    namespace: &'a str,
    #[serde(rename = "metricData")]
    metric_data: Vec<MetricDatum<'a>>,
}

#[derive(Debug, Serialize)]
struct MetricDatum<'a> {
    #[serde(rename = "metricName")]
    metric_name: &'a str,
    value: f64,
    unit: &'a str,
    timestamp: String,
    dimensions: Vec<Dimension<'a>>,
}

#[derive(Debug, Serialize)]
struct Dimension<'a> {
    name: &'static str,
    value: &'a str,
}

impl<'a> From<&'a BacklogMetric> for PutMetricDataRequest<'a> {
    fn from(metric: &'a BacklogMetric) -> Self {
        Self {
            namespace: &metric.namespace,
            metric_data: vec![MetricDatum {
                metric_name: &metric.name,
                value: metric.value,
                unit: &metric.unit,
                timestamp: metric.timestamp.to_rfc3339(),
                dimensions: vec![
                    Dimension {
                        name: "ClusterName",
                        value: &metric.cluster,
                    },
                    Dimension {
                        name: "ServiceName",
                        value: &metric.service,
                    },
                ],
            }],
        }
    }
}

/// HTTP metric emitter - POSTs metric data to the metrics collaborator
pub struct HttpMetricEmitter {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpMetricEmitter {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build metrics HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/metrics", endpoint.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl MetricEmitter for HttpMetricEmitter {
    async fn emit(&self, metric: &BacklogMetric) -> Result<(), ScalingError> {
        let request = PutMetricDataRequest::from(metric);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ScalingError::MetricEmissionFailed {
                message: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(ScalingError::MetricEmissionFailed {
                message: format!("metrics API returned error status {}: {}", status, body),
            });
        }

        debug!(
            namespace = %metric.namespace,
            metric = %metric.name,
            value = metric.value,
            "Published backlog metric"
        );
        Ok(())
    }
}
