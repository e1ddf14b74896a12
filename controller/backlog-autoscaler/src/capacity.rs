//! Capacity model - maps queue backlog to the worker count that keeps latency bounded
//!
//! ```text
//! acceptable_backlog_per_worker = acceptable_latency / average_processing_time
//! desired = clamp(ceil(backlog / acceptable_backlog_per_worker), min, max)
//! backlog_per_worker = backlog / max(active_workers, 1)
//! ```
//!
//! `backlog_per_worker` divides by the workers running *now*, never by the
//! desired count. Everything here is pure and safe to call from any number of
//! evaluators at once.

use crate::error::ScalingError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Queue depth observed at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogSnapshot {
    pub approximate_message_count: u64,
    /// Messages received by a worker but not yet deleted, when the queue reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approximate_in_flight_count: Option<u64>,
    pub observed_at: DateTime<Utc>,
}

impl BacklogSnapshot {
    pub fn new(approximate_message_count: u64, observed_at: DateTime<Utc>) -> Self {
        Self {
            approximate_message_count,
            approximate_in_flight_count: None,
            observed_at,
        }
    }

    /// Build a snapshot from a count reported by a collaborator.
    ///
    /// Negative counts are malformed input and fail with `InvalidParameters`.
    pub fn from_reported(count: i64, observed_at: DateTime<Utc>) -> Result<Self, ScalingError> {
        let count = u64::try_from(count).map_err(|_| {
            ScalingError::invalid(format!("approximate message count {} is negative", count))
        })?;
        Ok(Self::new(count, observed_at))
    }

    pub fn with_in_flight(mut self, in_flight: u64) -> Self {
        self.approximate_in_flight_count = Some(in_flight);
        self
    }
}

/// Running worker count observed at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub active_worker_count: u32,
    pub observed_at: DateTime<Utc>,
}

impl FleetSnapshot {
    pub fn new(active_worker_count: u32, observed_at: DateTime<Utc>) -> Self {
        Self {
            active_worker_count,
            observed_at,
        }
    }
}

/// Capacity model inputs, loaded once at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityParameters {
    pub acceptable_latency_seconds: f64,
    pub average_processing_time_seconds: f64,
    pub min_workers: u32,
    pub max_workers: u32,
}

impl CapacityParameters {
    /// Create validated parameters
    pub fn new(
        acceptable_latency_seconds: f64,
        average_processing_time_seconds: f64,
        min_workers: u32,
        max_workers: u32,
    ) -> Result<Self, ScalingError> {
        let params = Self {
            acceptable_latency_seconds,
            average_processing_time_seconds,
            min_workers,
            max_workers,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ScalingError> {
        if !(self.acceptable_latency_seconds.is_finite() && self.acceptable_latency_seconds > 0.0)
        {
            return Err(ScalingError::invalid(format!(
                "acceptable latency must be a positive number of seconds, got {}",
                self.acceptable_latency_seconds
            )));
        }
        if !(self.average_processing_time_seconds.is_finite()
            && self.average_processing_time_seconds > 0.0)
        {
            return Err(ScalingError::invalid(format!(
                "average processing time must be a positive number of seconds, got {}",
                self.average_processing_time_seconds
            )));
        }
        if self.max_workers < self.min_workers {
            return Err(ScalingError::invalid(format!(
                "max workers {} is below min workers {}",
                self.max_workers, self.min_workers
            )));
        }
        Ok(())
    }

    /// Queue depth a single worker can absorb while staying under the latency bound.
    ///
    /// This is also the target value for an external target-tracking policy.
    pub fn acceptable_backlog_per_worker(&self) -> Result<f64, ScalingError> {
        let per_worker = self.acceptable_latency_seconds / self.average_processing_time_seconds;
        if per_worker.is_nan() || per_worker <= 0.0 {
            return Err(ScalingError::invalid(format!(
                "acceptable backlog per worker must be positive, got {} ({}s / {}s)",
                per_worker, self.acceptable_latency_seconds, self.average_processing_time_seconds
            )));
        }
        Ok(per_worker)
    }
}

/// Output of one capacity evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingDecision {
    pub desired_worker_count: u32,
    pub backlog_per_worker: f64,
    pub target_backlog_per_worker: f64,
    pub computed_at: DateTime<Utc>,
}

/// Compute the worker count needed for the observed backlog.
///
/// `computed_at` is the later of the two observation instants, so identical
/// inputs always produce an identical decision.
pub fn compute_desired_workers(
    backlog: &BacklogSnapshot,
    fleet: &FleetSnapshot,
    params: &CapacityParameters,
) -> Result<ScalingDecision, ScalingError> {
    if params.max_workers < params.min_workers {
        return Err(ScalingError::invalid(format!(
            "max workers {} is below min workers {}",
            params.max_workers, params.min_workers
        )));
    }
    let target = params.acceptable_backlog_per_worker()?;

    let messages = backlog.approximate_message_count as f64;
    let raw_desired = messages / target;
    let desired_worker_count = clamp_worker_count(raw_desired, params.min_workers, params.max_workers);

    let backlog_per_worker = messages / f64::from(fleet.active_worker_count.max(1));

    Ok(ScalingDecision {
        desired_worker_count,
        backlog_per_worker,
        target_backlog_per_worker: target,
        computed_at: backlog.observed_at.max(fleet.observed_at),
    })
}

/// Round up and clamp into `[min, max]`; NaN maps to `min`, infinities to the bounds.
fn clamp_worker_count(raw: f64, min: u32, max: u32) -> u32 {
    if raw.is_nan() {
        return min;
    }
    let rounded = raw.ceil();
    if rounded <= f64::from(min) {
        min
    } else if rounded >= f64::from(max) {
        max
    } else {
        rounded as u32
    }
}
