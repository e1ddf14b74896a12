//! Scaling actuator - applies decisions to the fleet, honoring per-direction cooldowns
//!
//! Scale-out and scale-in each have their own cooldown timer. A timer is only
//! started once the orchestrator confirms the write, so a failed action never
//! blocks the retry on the next tick.

use crate::capacity::{FleetSnapshot, ScalingDecision};
use crate::error::ScalingError;
use crate::fleet::FleetScaler;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Out,
    In,
}

/// Minimum time between two actions in the same direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub scale_out: chrono::Duration,
    pub scale_in: chrono::Duration,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_COOLDOWN_SECS, DEFAULT_COOLDOWN_SECS)
    }
}

impl CooldownPolicy {
    pub fn from_secs(scale_out_secs: u64, scale_in_secs: u64) -> Self {
        Self {
            scale_out: seconds(scale_out_secs),
            scale_in: seconds(scale_in_secs),
        }
    }

    fn period(&self, direction: ScaleDirection) -> chrono::Duration {
        match direction {
            ScaleDirection::Out => self.scale_out,
            ScaleDirection::In => self.scale_in,
        }
    }
}

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::from(u32::try_from(secs).unwrap_or(u32::MAX)))
}

/// Last successful action per direction. A cold start has none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownState {
    pub last_scale_out_at: Option<DateTime<Utc>>,
    pub last_scale_in_at: Option<DateTime<Utc>>,
}

impl CooldownState {
    fn last(&self, direction: ScaleDirection) -> Option<DateTime<Utc>> {
        match direction {
            ScaleDirection::Out => self.last_scale_out_at,
            ScaleDirection::In => self.last_scale_in_at,
        }
    }

    fn record(&mut self, direction: ScaleDirection, at: DateTime<Utc>) {
        match direction {
            ScaleDirection::Out => self.last_scale_out_at = Some(at),
            ScaleDirection::In => self.last_scale_in_at = Some(at),
        }
    }

    /// Time left before `direction` may act again, if still cooling down
    pub fn remaining(
        &self,
        direction: ScaleDirection,
        policy: &CooldownPolicy,
        now: DateTime<Utc>,
    ) -> Option<chrono::Duration> {
        let last = self.last(direction)?;
        let elapsed = now.signed_duration_since(last);
        let period = policy.period(direction);
        if elapsed < period {
            Some(period - elapsed)
        } else {
            None
        }
    }
}

/// What the actuator did with a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActuationOutcome {
    Applied {
        direction: ScaleDirection,
        #[serde(rename = "previousWorkerCount")]
        previous_worker_count: u32,
        #[serde(rename = "desiredWorkerCount")]
        desired_worker_count: u32,
    },
    Deferred {
        direction: ScaleDirection,
        #[serde(rename = "currentWorkerCount")]
        current_worker_count: u32,
        #[serde(rename = "desiredWorkerCount")]
        desired_worker_count: u32,
        #[serde(rename = "retryAfterSeconds")]
        retry_after_seconds: i64,
    },
    Unchanged {
        #[serde(rename = "workerCount")]
        worker_count: u32,
    },
}

/// Applies scaling decisions and owns the process-wide cooldown state
pub struct ScalingActuator {
    scaler: Arc<dyn FleetScaler>,
    policy: CooldownPolicy,
    call_timeout: Duration,
    cooldown: Mutex<CooldownState>,
}

impl ScalingActuator {
    pub fn new(scaler: Arc<dyn FleetScaler>, policy: CooldownPolicy, call_timeout: Duration) -> Self {
        Self {
            scaler,
            policy,
            call_timeout,
            cooldown: Mutex::new(CooldownState::default()),
        }
    }

    /// Start from a known cooldown state instead of a cold start
    pub fn with_state(self, state: CooldownState) -> Self {
        Self {
            cooldown: Mutex::new(state),
            ..self
        }
    }

    pub fn policy(&self) -> &CooldownPolicy {
        &self.policy
    }

    pub async fn cooldown_state(&self) -> CooldownState {
        *self.cooldown.lock().await
    }

    /// Apply `decision` against the fleet observed in `current`.
    ///
    /// The cooldown lock is held from the check through the timestamp update,
    /// so overlapping ticks are serialized here.
    pub async fn apply(
        &self,
        decision: &ScalingDecision,
        current: &FleetSnapshot,
        now: DateTime<Utc>,
    ) -> Result<ActuationOutcome, ScalingError> {
        let desired = decision.desired_worker_count;
        let active = current.active_worker_count;

        let direction = match desired.cmp(&active) {
            std::cmp::Ordering::Greater => ScaleDirection::Out,
            std::cmp::Ordering::Less => ScaleDirection::In,
            std::cmp::Ordering::Equal => {
                debug!(worker_count = active, "Fleet already at desired size");
                return Ok(ActuationOutcome::Unchanged {
                    worker_count: active,
                });
            }
        };

        let mut cooldown = self.cooldown.lock().await;

        if let Some(remaining) = cooldown.remaining(direction, &self.policy, now) {
            info!(
                direction = ?direction,
                current = active,
                desired = desired,
                retry_after_secs = remaining.num_seconds(),
                "Scaling decision deferred by cooldown"
            );
            return Ok(ActuationOutcome::Deferred {
                direction,
                current_worker_count: active,
                desired_worker_count: desired,
                retry_after_seconds: remaining.num_seconds(),
            });
        }

        let write = self.scaler.set_desired_worker_count(desired);
        let result = match tokio::time::timeout(self.call_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(ScalingError::ScalingActionFailed {
                attempted: desired,
                message: format!(
                    "orchestrator call timed out after {}ms",
                    self.call_timeout.as_millis()
                ),
            }),
        };

        if let Err(e) = result {
            let err = match e {
                e @ ScalingError::ScalingActionFailed { .. } => e,
                other => ScalingError::ScalingActionFailed {
                    attempted: desired,
                    message: other.to_string(),
                },
            };
            warn!(
                direction = ?direction,
                attempted = desired,
                error = %err,
                "Scaling action failed; cooldown not consumed"
            );
            return Err(err);
        }

        cooldown.record(direction, now);
        info!(
            direction = ?direction,
            from = active,
            to = desired,
            "Scaling action applied"
        );

        Ok(ActuationOutcome::Applied {
            direction,
            previous_worker_count: active,
            desired_worker_count: desired,
        })
    }
}
