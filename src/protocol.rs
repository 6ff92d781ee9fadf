//! Command protocol between external callers and the rig components.
//!
//! The wire format is a flat JSON key/value map with a textual `command`
//! field, both for requests and responses. Rather than threading
//! loosely-typed maps through the components, requests are parsed up front
//! into closed enums ([`ControllerCommand`], [`SamplerCommand`]) with their
//! parameters validated per variant; the components only ever see
//! well-formed commands.
//!
//! Unknown command names and malformed parameters are rejected here with
//! descriptive [`RigError`]s and never reach a component.

use crate::core::{CaptureRequest, CaptureSummary};
use crate::error::{AppResult, RigError};
use serde::Serialize;
use serde_json::Value;

/// Commands accepted by the cycle/trial controller.
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerCommand {
    /// Run one full cycle in the foreground
    ExecuteCycle,
    /// Begin a trial and its background cycle loop
    Start,
    /// End the active trial
    Stop,
    /// Read the controller state snapshot
    Status,
}

impl ControllerCommand {
    /// Parse a controller command from its wire representation.
    pub fn parse(cmd: &Value) -> AppResult<Self> {
        match command_name(cmd)? {
            "execute_cycle" => Ok(Self::ExecuteCycle),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            other => Err(RigError::UnknownCommand(other.to_string())),
        }
    }
}

/// Commands accepted by the force-capture sampler.
#[derive(Clone, Debug, PartialEq)]
pub enum SamplerCommand {
    /// Open a capture window, optionally tagged with trial metadata
    StartCapture(CaptureRequest),
    /// Close the capture window and report its summary
    EndCapture,
}

impl SamplerCommand {
    /// Parse a sampler command from its wire representation.
    pub fn parse(cmd: &Value) -> AppResult<Self> {
        match command_name(cmd)? {
            "start_capture" => Ok(Self::StartCapture(parse_capture_request(cmd)?)),
            "end_capture" => Ok(Self::EndCapture),
            other => Err(RigError::UnknownCommand(other.to_string())),
        }
    }
}

/// Extract and validate the `command` field.
fn command_name(cmd: &Value) -> AppResult<&str> {
    cmd.get("command")
        .and_then(Value::as_str)
        .ok_or(RigError::MissingCommand)
}

/// Extract the optional trial metadata of a `start_capture` command.
///
/// Both fields default (empty id, zero count) when absent, but a present
/// field of the wrong shape is rejected rather than silently ignored.
fn parse_capture_request(cmd: &Value) -> AppResult<CaptureRequest> {
    let trial_id = match cmd.get("trial_id") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(RigError::InvalidParameter {
                field: "trial_id",
                reason: format!("expected a string, got {other}"),
            })
        }
    };

    let cycle_count = match cmd.get("cycle_count") {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| RigError::InvalidParameter {
                field: "cycle_count",
                reason: format!("expected a non-negative integer, got {n}"),
            })?,
        Some(other) => {
            return Err(RigError::InvalidParameter {
                field: "cycle_count",
                reason: format!("expected a number, got {other}"),
            })
        }
    };

    Ok(CaptureRequest {
        trial_id,
        cycle_count,
    })
}

/// Response to a successful `execute_cycle`.
#[derive(Clone, Debug, Serialize)]
pub struct CycleResponse {
    /// Always `"completed"`
    pub status: &'static str,
    /// The sampler's end-capture result, when a window was opened and
    /// closed; carries the same shape a direct `end_capture` returns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_capture: Option<EndCaptureResponse>,
}

/// Response to a successful `start`.
#[derive(Clone, Debug, Serialize)]
pub struct StartResponse {
    /// Identifier of the freshly created trial
    pub trial_id: String,
}

/// Response to a successful `stop`.
#[derive(Clone, Debug, Serialize)]
pub struct StopResponse {
    /// Identifier of the trial that just ended
    pub trial_id: String,
    /// Final number of completed cycles
    pub cycle_count: u64,
}

/// Response to a successful `start_capture`.
#[derive(Clone, Debug, Serialize)]
pub struct StartCaptureResponse {
    /// Always `"waiting"`
    pub status: &'static str,
}

/// Response to a successful `end_capture`.
#[derive(Clone, Debug, Serialize)]
pub struct EndCaptureResponse {
    /// Always `"completed"`
    pub status: &'static str,
    /// Summary of the closed window, flattened into the payload
    #[serde(flatten)]
    pub summary: CaptureSummary,
}

/// Serialize a response struct to its wire map.
///
/// Response types are plain data and cannot fail to serialize; `Null` is
/// returned in the unreachable error case to keep callers infallible.
pub(crate) fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_controller_commands() {
        assert_eq!(
            ControllerCommand::parse(&json!({"command": "execute_cycle"})).unwrap(),
            ControllerCommand::ExecuteCycle
        );
        assert_eq!(
            ControllerCommand::parse(&json!({"command": "status"})).unwrap(),
            ControllerCommand::Status
        );
    }

    #[test]
    fn test_missing_command_field() {
        let err = ControllerCommand::parse(&json!({"cmd": "start"})).unwrap_err();
        assert!(matches!(err, RigError::MissingCommand));

        let err = ControllerCommand::parse(&json!({"command": 7})).unwrap_err();
        assert!(matches!(err, RigError::MissingCommand));
    }

    #[test]
    fn test_unknown_command() {
        let err = SamplerCommand::parse(&json!({"command": "self_destruct"})).unwrap_err();
        assert_eq!(err.to_string(), "unknown command: self_destruct");
    }

    #[test]
    fn test_start_capture_with_metadata() {
        let cmd = SamplerCommand::parse(&json!({
            "command": "start_capture",
            "trial_id": "trial-123",
            "cycle_count": 5,
        }))
        .unwrap();
        assert_eq!(
            cmd,
            SamplerCommand::StartCapture(CaptureRequest {
                trial_id: "trial-123".to_string(),
                cycle_count: 5,
            })
        );
    }

    #[test]
    fn test_start_capture_without_metadata() {
        let cmd = SamplerCommand::parse(&json!({"command": "start_capture"})).unwrap();
        assert_eq!(cmd, SamplerCommand::StartCapture(CaptureRequest::default()));
    }

    #[test]
    fn test_start_capture_float_cycle_count() {
        // JSON transports frequently deliver integers as floats.
        let cmd = SamplerCommand::parse(&json!({
            "command": "start_capture",
            "cycle_count": 5.0,
        }))
        .unwrap();
        assert!(matches!(
            cmd,
            SamplerCommand::StartCapture(CaptureRequest { cycle_count: 5, .. })
        ));
    }

    #[test]
    fn test_start_capture_rejects_bad_types() {
        let err = SamplerCommand::parse(&json!({
            "command": "start_capture",
            "trial_id": 42,
        }))
        .unwrap_err();
        assert!(err.to_string().contains("trial_id"));

        let err = SamplerCommand::parse(&json!({
            "command": "start_capture",
            "cycle_count": "five",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("cycle_count"));

        let err = SamplerCommand::parse(&json!({
            "command": "start_capture",
            "cycle_count": -3,
        }))
        .unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_cycle_response_omits_absent_capture() {
        let payload = to_payload(&CycleResponse {
            status: "completed",
            force_capture: None,
        });
        assert_eq!(payload, json!({"status": "completed"}));
    }

    #[test]
    fn test_cycle_response_nests_end_capture_result() {
        let payload = to_payload(&CycleResponse {
            status: "completed",
            force_capture: Some(EndCaptureResponse {
                status: "completed",
                summary: CaptureSummary {
                    sample_count: 2,
                    max_force: 61.0,
                    trial_id: String::new(),
                    cycle_count: 0,
                },
            }),
        });
        assert_eq!(payload["status"], "completed");
        // The nested payload matches a direct end_capture response.
        assert_eq!(payload["force_capture"]["status"], "completed");
        assert_eq!(payload["force_capture"]["sample_count"], 2);
        assert_eq!(payload["force_capture"]["max_force"], 61.0);
    }

    #[test]
    fn test_end_capture_response_flattens_summary() {
        let payload = to_payload(&EndCaptureResponse {
            status: "completed",
            summary: CaptureSummary {
                sample_count: 3,
                max_force: 50.0,
                trial_id: "trial-123".to_string(),
                cycle_count: 5,
            },
        });
        assert_eq!(payload["status"], "completed");
        assert_eq!(payload["sample_count"], 3);
        assert_eq!(payload["max_force"], 50.0);
        assert_eq!(payload["trial_id"], "trial-123");
        assert_eq!(payload["cycle_count"], 5);
    }
}
