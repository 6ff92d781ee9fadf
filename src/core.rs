//! Core traits and data types for the cycle rig.
//!
//! This module defines the seams between the rig logic and everything it
//! drives:
//!
//! - [`PoseTrigger`], [`Actuator`], [`ForceReader`]: hardware-facing traits.
//!   Real drivers live outside this crate; [`crate::hardware`] provides
//!   simulated implementations for tests and the demo binary.
//! - [`CaptureSampler`]: the command boundary the controller uses to bracket
//!   a set-down with a force-capture window. Coordination between the
//!   controller and the sampler happens only through this trait, never
//!   through shared state, which keeps the two component locks independent.
//! - [`ShutdownToken`]: process-level cancellation observed by every
//!   background loop and settle wait.
//!
//! # Thread Safety
//!
//! All traits require `Send + Sync` so components can be shared across
//! Tokio tasks behind `Arc`.

use crate::error::AppResult;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Triggers one fixed actuator pose (a blocking remote call that can fail).
#[async_trait]
pub trait PoseTrigger: Send + Sync {
    /// Command the actuator toward this trigger's pose.
    async fn trigger(&self) -> Result<()>;
}

/// Movement query for the actuator being cycled.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Whether the actuator is currently in motion.
    async fn is_moving(&self) -> Result<bool>;
}

/// A single-value force measurement source, polled by the sampling loop.
#[async_trait]
pub trait ForceReader: Send + Sync {
    /// Read the current force value.
    async fn read_force(&self) -> Result<f64>;

    /// Hint that a capture window opened or closed.
    ///
    /// Simulated sources use this to start or stop their contact ramp;
    /// hardware readers ignore it.
    fn simulate_contact(&self, _in_contact: bool) {}
}

/// Trial metadata attached to a `start_capture` command.
///
/// Both fields are empty/zero when no trial is active, which keeps the
/// sampler's should-sync flag false for standalone cycles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Identifier of the active trial, or empty
    #[serde(default)]
    pub trial_id: String,
    /// Cycle count at capture start, or zero
    #[serde(default)]
    pub cycle_count: u64,
}

/// Result of an `end_capture` command.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Number of samples in the buffer when the window closed
    pub sample_count: usize,
    /// Peak value in the buffer (0.0 when no sample crossed the threshold)
    pub max_force: f64,
    /// Trial identifier as supplied at capture start
    pub trial_id: String,
    /// Cycle count as supplied at capture start
    pub cycle_count: u64,
}

/// Command boundary between the cycle controller and a force-capture
/// sampler.
///
/// The controller only ever issues these two commands; it never touches the
/// sampler's state directly. Tests substitute their own implementations to
/// observe or fail the capture half of a cycle.
#[async_trait]
pub trait CaptureSampler: Send + Sync {
    /// Open a capture window, attaching trial metadata.
    ///
    /// Fails if a capture is already in progress.
    async fn start_capture(&self, request: CaptureRequest) -> AppResult<()>;

    /// Close the capture window and return its summary.
    ///
    /// Fails if no capture is in progress.
    async fn end_capture(&self) -> AppResult<CaptureSummary>;
}

/// Process-level cancellation signal.
///
/// Cheap to clone; every background loop and settle wait observes the same
/// underlying flag. Distinct from trial stop: triggering the token unblocks
/// in-progress waits immediately, while a trial stop only suppresses future
/// loop iterations.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Create a fresh, untriggered token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal shutdown to every clone of this token.
    pub fn trigger(&self) {
        // Send only fails with no receivers; we always hold one.
        let _ = self.tx.send(true);
    }

    /// Whether shutdown has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is signalled.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_token_unblocks_waiters() {
        let token = ShutdownToken::new();
        assert!(!token.is_cancelled());

        let mut waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        token.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_token_already_triggered() {
        let token = ShutdownToken::new();
        token.trigger();

        // A clone taken after triggering must resolve immediately.
        let mut late = token.clone();
        tokio::time::timeout(Duration::from_millis(100), late.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_capture_request_default_is_untracked() {
        let req = CaptureRequest::default();
        assert!(req.trial_id.is_empty());
        assert_eq!(req.cycle_count, 0);
    }
}
