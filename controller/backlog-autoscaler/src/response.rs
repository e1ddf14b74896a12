//! Status/body response returned to the scheduler that invoked a cycle
//!
//! Success is 200 with the cycle report; any caught failure is 400 with the
//! error kind and message.

use crate::driver::CycleReport;
use crate::error::ScalingError;
use serde::Serialize;
use serde_json::{json, Value};

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 400;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResponse {
    pub status_code: u16,
    pub body: Value,
}

impl CycleResponse {
    pub fn from_result(result: &Result<CycleReport, ScalingError>) -> Self {
        match result {
            Ok(report) => Self::ok(report),
            Err(e) => Self::error(e),
        }
    }

    pub fn ok(report: &CycleReport) -> Self {
        match serde_json::to_value(report) {
            Ok(body) => Self {
                status_code: STATUS_OK,
                body,
            },
            Err(e) => Self {
                status_code: STATUS_FAILED,
                body: json!({
                    "kind": "SerializationFailed",
                    "message": e.to_string(),
                }),
            },
        }
    }

    pub fn error(err: &ScalingError) -> Self {
        let mut body = json!({
            "kind": err.kind(),
            "message": err.to_string(),
        });
        if let ScalingError::ScalingActionFailed { attempted, .. } = err {
            body["attemptedWorkerCount"] = json!(attempted);
        }
        Self {
            status_code: STATUS_FAILED,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}
