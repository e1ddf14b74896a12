//! Configuration for the backlog autoscaler

use crate::actuator::{CooldownPolicy, DEFAULT_COOLDOWN_SECS};
use crate::capacity::CapacityParameters;
use crate::error::ScalingError;
use crate::metrics::MetricTarget;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::time::Duration;

/// Who turns the backlog measurement into a scaling action
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActuationMode {
    /// Compute, emit the metric, and apply the worker count directly
    Direct,
    /// Compute and emit the metric; an external target-tracking policy acts on it
    ExternalPolicy,
}

/// Configuration for the backlog autoscaler
#[derive(Debug, Clone, Parser)]
#[command(name = "backlog-autoscaler")]
#[command(about = "Scales a queue worker fleet in proportion to queue backlog")]
pub struct Config {
    /// Queue to inspect
    #[arg(long, env)]
    pub queue_identifier: String,

    /// Base URL of the queue service API
    #[arg(long, env)]
    pub queue_endpoint: String,

    /// Cluster running the worker fleet
    #[arg(long, env)]
    pub cluster_identifier: String,

    /// Service (worker pool) within the cluster
    #[arg(long, env)]
    pub service_identifier: String,

    /// Base URL of the orchestration API
    #[arg(long, env)]
    pub orchestrator_endpoint: String,

    /// Base URL of the metrics API (metrics are only logged when unset)
    #[arg(long, env)]
    pub metrics_endpoint: Option<String>,

    /// Latency bound a queued message should stay under, in seconds
    #[arg(long, env, default_value_t = 10.0)]
    pub acceptable_latency_seconds: f64,

    /// Average time a worker spends on one message, in seconds
    #[arg(long, env, default_value_t = 0.5)]
    pub average_processing_time_seconds: f64,

    #[arg(long, env, default_value_t = 1)]
    pub min_workers: u32,

    #[arg(long, env, default_value_t = 40)]
    pub max_workers: u32,

    #[arg(long, env, default_value = "QueueProcessing")]
    pub metric_namespace: String,

    #[arg(long, env, default_value = "BacklogPerWorker")]
    pub metric_name: String,

    #[arg(long, env, default_value = "Count")]
    pub metric_unit: String,

    #[arg(long, env, default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub scale_out_cooldown_seconds: u64,

    #[arg(long, env, default_value_t = DEFAULT_COOLDOWN_SECS)]
    pub scale_in_cooldown_seconds: u64,

    /// Direct actuation or delegation to an external target-tracking policy
    #[arg(long, env, value_enum, default_value_t = ActuationMode::Direct)]
    pub actuation_mode: ActuationMode,

    /// Dry-run mode (log scaling actions instead of writing them)
    #[arg(long, env)]
    pub dry_run: bool,

    /// Timeout for every collaborator call, in seconds
    #[arg(long, env, default_value_t = 5)]
    pub call_timeout_secs: u64,

    /// Run a cycle every N seconds instead of once
    #[arg(long, env)]
    pub interval_secs: Option<u64>,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Check everything that would make a run meaningless
    pub fn validate(&self) -> Result<(), ScalingError> {
        self.capacity_parameters()?;

        for (name, value) in [
            ("queue identifier", &self.queue_identifier),
            ("cluster identifier", &self.cluster_identifier),
            ("service identifier", &self.service_identifier),
        ] {
            if value.trim().is_empty() {
                return Err(ScalingError::invalid(format!("{} must not be empty", name)));
            }
        }

        if self.call_timeout_secs == 0 {
            return Err(ScalingError::invalid("call timeout must be at least one second"));
        }
        if self.interval_secs == Some(0) {
            return Err(ScalingError::invalid("interval must be at least one second"));
        }
        Ok(())
    }

    pub fn capacity_parameters(&self) -> Result<CapacityParameters, ScalingError> {
        CapacityParameters::new(
            self.acceptable_latency_seconds,
            self.average_processing_time_seconds,
            self.min_workers,
            self.max_workers,
        )
    }

    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy::from_secs(self.scale_out_cooldown_seconds, self.scale_in_cooldown_seconds)
    }

    pub fn metric_target(&self) -> MetricTarget {
        MetricTarget {
            namespace: self.metric_namespace.clone(),
            name: self.metric_name.clone(),
            unit: self.metric_unit.clone(),
            cluster: self.cluster_identifier.clone(),
            service: self.service_identifier.clone(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Whether scaling writes actually reach the orchestrator
    pub fn writes_to_orchestrator(&self) -> bool {
        self.actuation_mode == ActuationMode::Direct && !self.dry_run
    }
}
