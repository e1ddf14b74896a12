//! Control loop driver - runs one observe → compute → emit → act cycle per tick
//!
//! The driver owns no schedule. Whoever invokes it decides the cadence; the
//! only state carried between ticks is the actuator's cooldown state.

use crate::actuator::{ActuationOutcome, ScalingActuator};
use crate::capacity::{
    compute_desired_workers, BacklogSnapshot, CapacityParameters, FleetSnapshot, ScalingDecision,
};
use crate::config::ActuationMode;
use crate::error::ScalingError;
use crate::fleet::FleetInspector;
use crate::metrics::{MetricEmitter, MetricTarget};
use crate::queue::QueueInspector;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a completed cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The core actuator handled the decision (applied, deferred or unchanged)
    Actuated(ActuationOutcome),
    /// Actuation is owned by an external policy consuming the emitted metric
    DelegatedToExternalPolicy,
}

/// Everything observed and decided during one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub backlog: BacklogSnapshot,
    pub fleet: FleetSnapshot,
    pub decision: ScalingDecision,
    pub metric_emitted: bool,
    pub outcome: CycleOutcome,
}

pub struct ControlLoop {
    params: CapacityParameters,
    metric_target: MetricTarget,
    queue: Arc<dyn QueueInspector>,
    fleet: Arc<dyn FleetInspector>,
    emitter: Arc<dyn MetricEmitter>,
    actuator: Option<ScalingActuator>,
    call_timeout: Duration,
}

impl ControlLoop {
    /// Create a control loop that only measures and emits.
    ///
    /// Attach an actuator with [`ControlLoop::with_actuator`] for direct actuation.
    pub fn new(
        params: CapacityParameters,
        metric_target: MetricTarget,
        queue: Arc<dyn QueueInspector>,
        fleet: Arc<dyn FleetInspector>,
        emitter: Arc<dyn MetricEmitter>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            params,
            metric_target,
            queue,
            fleet,
            emitter,
            actuator: None,
            call_timeout,
        }
    }

    pub fn with_actuator(mut self, actuator: ScalingActuator) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn mode(&self) -> ActuationMode {
        if self.actuator.is_some() {
            ActuationMode::Direct
        } else {
            ActuationMode::ExternalPolicy
        }
    }

    pub fn actuator(&self) -> Option<&ScalingActuator> {
        self.actuator.as_ref()
    }

    /// Run one cycle now
    pub async fn run_cycle(&self) -> Result<CycleReport, ScalingError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle, using `now` for cooldown checks.
    ///
    /// Every call logs exactly one outcome record.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, ScalingError> {
        let result = self.cycle(now).await;

        match &result {
            Ok(report) => info!(
                backlog = report.backlog.approximate_message_count,
                active_workers = report.fleet.active_worker_count,
                desired_workers = report.decision.desired_worker_count,
                backlog_per_worker = report.decision.backlog_per_worker,
                metric_emitted = report.metric_emitted,
                outcome = ?report.outcome,
                "Control cycle completed"
            ),
            Err(e) if e.is_transient() => warn!(
                kind = ?e.kind(),
                error = %e,
                "Control cycle skipped; waiting for next tick"
            ),
            Err(e) => error!(
                kind = ?e.kind(),
                error = %e,
                "Control cycle failed; operator action required"
            ),
        }

        result
    }

    async fn cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, ScalingError> {
        // Both reads are issued together so they observe roughly the same instant
        let (backlog, fleet) = tokio::join!(
            bounded("queue", self.call_timeout, self.queue.backlog()),
            bounded("fleet", self.call_timeout, self.fleet.active_workers()),
        );
        let backlog = backlog?;
        let fleet = fleet?;

        let decision = compute_desired_workers(&backlog, &fleet, &self.params)?;

        let metric_emitted = self.emit(&decision).await;

        let outcome = match &self.actuator {
            Some(actuator) => CycleOutcome::Actuated(actuator.apply(&decision, &fleet, now).await?),
            None => CycleOutcome::DelegatedToExternalPolicy,
        };

        Ok(CycleReport {
            backlog,
            fleet,
            decision,
            metric_emitted,
            outcome,
        })
    }

    /// Publish the backlog-per-worker metric. Failure is logged, never propagated.
    async fn emit(&self, decision: &ScalingDecision) -> bool {
        let metric = self
            .metric_target
            .datum(decision.backlog_per_worker, decision.computed_at);

        let result = match tokio::time::timeout(self.call_timeout, self.emitter.emit(&metric)).await
        {
            Ok(result) => result,
            Err(_) => Err(ScalingError::MetricEmissionFailed {
                message: format!("timed out after {}ms", self.call_timeout.as_millis()),
            }),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    metric = %metric.name,
                    value = metric.value,
                    error = %e,
                    "Metric emission failed; continuing cycle"
                );
                false
            }
        }
    }
}

/// Bound an observation call by `timeout`, reporting expiry as unavailable
async fn bounded<T>(
    collaborator: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T, ScalingError>>,
) -> Result<T, ScalingError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ScalingError::observation(
            collaborator,
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}
