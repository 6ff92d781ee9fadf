//! Custom error types for the application.
//!
//! This module defines the primary error type, `RigError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors that can occur,
//! from malformed commands to instrument failures.
//!
//! ## Error Taxonomy
//!
//! - **Protocol errors** (`MissingCommand`, `UnknownCommand`,
//!   `InvalidParameter`): malformed requests, returned to the caller and
//!   never fatal to the component.
//! - **State conflicts** (`TrialAlreadyRunning`, `NoActiveTrial`,
//!   `CaptureInProgress`, `NoCaptureInProgress`): a command arrived in a
//!   state that cannot accept it.
//! - **Hardware errors** (`PoseTrigger`, `Actuator`): failures from the
//!   actuator side. A failed pour aborts the cycle and surfaces; everything
//!   confined to instrumentation is logged instead.
//! - **`Cancelled`**: process-level shutdown observed mid-wait.
//!
//! Timing problems (movement-confirmation timeout, capture timeout) are
//! deliberately absent: they are logged recoveries, never surfaced as errors.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, RigError>;

/// Primary error type for rig commands and cycle execution.
#[derive(Error, Debug)]
pub enum RigError {
    #[error("missing or invalid 'command' field")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid '{field}' parameter: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: String,
    },

    #[error("trial already running: {0}")]
    TrialAlreadyRunning(String),

    #[error("no active trial to stop")]
    NoActiveTrial,

    #[error("capture already in progress (state: {0})")]
    CaptureInProgress(&'static str),

    #[error("no capture in progress")]
    NoCaptureInProgress,

    #[error("moving to {pose} position: {source}")]
    PoseTrigger {
        pose: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("checking actuator movement: {0}")]
    Actuator(#[source] anyhow::Error),

    #[error("operation cancelled")]
    Cancelled,
}
