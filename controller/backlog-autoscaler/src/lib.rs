//! Backlog Autoscaler - keeps a queue consumer's worker fleet proportional to its backlog
//!
//! Each control cycle reads the queue backlog and the running worker count,
//! computes how many workers are needed to keep message latency under the
//! configured bound, publishes the backlog-per-worker metric, and (in direct
//! actuation mode) applies the new worker count subject to cooldowns.

pub mod actuator;
pub mod capacity;
pub mod config;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod metrics;
pub mod queue;
pub mod response;

pub use actuator::{ActuationOutcome, CooldownPolicy, CooldownState, ScalingActuator};
pub use capacity::{
    compute_desired_workers, BacklogSnapshot, CapacityParameters, FleetSnapshot, ScalingDecision,
};
pub use config::{ActuationMode, Config};
pub use driver::{ControlLoop, CycleOutcome, CycleReport};
pub use error::{ErrorKind, ScalingError};
pub use fleet::{FleetInspector, FleetScaler, HttpOrchestratorClient, LogOnlyFleetScaler};
pub use metrics::{BacklogMetric, HttpMetricEmitter, LogOnlyMetricEmitter, MetricEmitter, MetricTarget};
pub use queue::{HttpQueueInspector, QueueInspector};
pub use response::CycleResponse;
