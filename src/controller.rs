//! Cycle/trial controller.
//!
//! [`CycleController`] owns the two-state trial machine (idle/running) and
//! executes the physical test cycle: trigger the pour/lift pose, settle,
//! open a force-capture window, trigger the rest/lower pose, wait for the
//! actuator to stop, close the window, count the cycle, settle again. The
//! capture start/end bracket only the set-down half so the force signature
//! of placing the test object is isolated from the lift.
//!
//! `start` spawns a background loop that repeats the cycle until `stop` or
//! process shutdown; `stop` only suppresses future iterations, it never
//! preempts the cycle in flight.
//!
//! Failure policy: a failed pour aborts the cycle and surfaces to the
//! caller. Everything confined to instrumentation — capture start/end
//! failures, a movement-confirmation timeout — is logged and the cycle
//! proceeds, because the rig's job is repeated mechanical stress even when
//! the measurement side misbehaves. A trial is never auto-stopped by a
//! failing cycle.

use crate::config::ControllerConfig;
use crate::core::{
    Actuator, CaptureRequest, CaptureSampler, CaptureSummary, PoseTrigger, ShutdownToken,
};
use crate::error::{AppResult, RigError};
use crate::protocol::{
    to_payload, ControllerCommand, CycleResponse, EndCaptureResponse, StartResponse, StopResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

/// The active trial record. Exists iff the controller is running.
struct TrialState {
    trial_id: String,
    cycle_count: u64,
    started_at: DateTime<Utc>,
    last_cycle_at: Option<DateTime<Utc>>,
    stop_tx: watch::Sender<bool>,
}

/// Result of one completed cycle.
#[derive(Clone, Debug)]
pub struct CycleOutcome {
    /// Summary of the capture window, when one was opened and closed
    pub force_capture: Option<CaptureSummary>,
}

/// Read-only snapshot of the controller, taken under the lock in one piece.
#[derive(Clone, Debug, Serialize)]
pub struct ControllerSnapshot {
    /// `idle` or `running`
    pub state: &'static str,
    /// Active trial identifier, or empty
    pub trial_id: String,
    /// Cycles completed in the active trial, or zero
    pub cycle_count: u64,
    /// RFC 3339 completion time of the last cycle, or empty
    pub last_cycle_at: String,
    /// True exactly when a trial is running
    pub should_sync: bool,
}

struct Inner {
    arm: Arc<dyn Actuator>,
    pour_prep: Arc<dyn PoseTrigger>,
    resting: Arc<dyn PoseTrigger>,
    sampler: Option<Arc<dyn CaptureSampler>>,
    settle: Duration,
    move_poll: Duration,
    move_timeout: Duration,
    shutdown: ShutdownToken,
    trial_seq: AtomicU64,
    trial: Mutex<Option<TrialState>>,
}

/// Cycle/trial controller handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CycleController {
    inner: Arc<Inner>,
}

impl CycleController {
    /// Build a controller from validated configuration and its hardware.
    pub fn new(
        config: &ControllerConfig,
        arm: Arc<dyn Actuator>,
        pour_prep: Arc<dyn PoseTrigger>,
        resting: Arc<dyn PoseTrigger>,
        sampler: Option<Arc<dyn CaptureSampler>>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                arm,
                pour_prep,
                resting,
                sampler,
                settle: Duration::from_millis(config.settle_ms),
                move_poll: Duration::from_millis(config.move_poll_ms),
                move_timeout: Duration::from_millis(config.move_timeout_ms),
                shutdown,
                trial_seq: AtomicU64::new(1),
                trial: Mutex::new(None),
            }),
        }
    }

    /// Lock the trial record, recovering the guard if a holder panicked.
    fn trial(&self) -> MutexGuard<'_, Option<TrialState>> {
        self.inner
            .trial
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one full cycle in the foreground.
    ///
    /// Usable standalone (no trial) or as the background loop body. When a
    /// trial is active its cycle count is incremented after the capture
    /// window closes.
    pub async fn execute_cycle(&self) -> AppResult<CycleOutcome> {
        self.inner
            .pour_prep
            .trigger()
            .await
            .map_err(|source| RigError::PoseTrigger {
                pose: "pour_prep",
                source,
            })?;

        self.settle_wait().await?;

        // Best effort: a capture that fails to open must not stop the
        // physical cycle.
        let mut capture_started = false;
        if let Some(sampler) = &self.inner.sampler {
            let request = self.capture_request();
            match sampler.start_capture(request).await {
                Ok(()) => capture_started = true,
                Err(err) => warn!("failed to start force capture: {err}"),
            }
        }

        if let Err(source) = self.inner.resting.trigger().await {
            if capture_started {
                if let Some(sampler) = &self.inner.sampler {
                    if let Err(end_err) = sampler.end_capture().await {
                        warn!("failed to end force capture after move error: {end_err}");
                    }
                }
            }
            return Err(RigError::PoseTrigger {
                pose: "resting",
                source,
            });
        }

        if let Err(err) = self.wait_for_arm_stopped().await {
            match err {
                RigError::Cancelled => return Err(RigError::Cancelled),
                other => warn!("error waiting for arm to stop: {other}"),
            }
        }

        let mut force_capture = None;
        if capture_started {
            if let Some(sampler) = &self.inner.sampler {
                match sampler.end_capture().await {
                    Ok(summary) => {
                        info!(
                            "force capture: {} samples, max force {:.2}",
                            summary.sample_count, summary.max_force
                        );
                        force_capture = Some(summary);
                    }
                    Err(err) => warn!("failed to end force capture: {err}"),
                }
            }
        }

        {
            let mut trial = self.trial();
            if let Some(trial) = trial.as_mut() {
                trial.cycle_count += 1;
                trial.last_cycle_at = Some(Utc::now());
            }
        }

        self.settle_wait().await?;

        Ok(CycleOutcome { force_capture })
    }

    /// Begin a trial and spawn its background cycle loop.
    ///
    /// Fails with [`RigError::TrialAlreadyRunning`] if a trial is active.
    /// Returns immediately; the loop runs until [`CycleController::stop`]
    /// or process shutdown.
    pub fn start(&self) -> AppResult<StartResponse> {
        let now = Utc::now();
        let seq = self.inner.trial_seq.fetch_add(1, Ordering::Relaxed);
        let trial_id = format!("trial-{}-{seq}", now.format("%Y%m%d-%H%M%S"));
        let (stop_tx, stop_rx) = watch::channel(false);

        {
            let mut trial = self.trial();
            if let Some(active) = trial.as_ref() {
                return Err(RigError::TrialAlreadyRunning(active.trial_id.clone()));
            }
            *trial = Some(TrialState {
                trial_id: trial_id.clone(),
                cycle_count: 0,
                started_at: now,
                last_cycle_at: None,
                stop_tx,
            });
        }

        let cycle_loop = self.clone();
        tokio::spawn(async move {
            cycle_loop.run_cycle_loop(stop_rx).await;
        });

        info!("trial started: {trial_id}");
        Ok(StartResponse { trial_id })
    }

    /// End the active trial.
    ///
    /// Fails with [`RigError::NoActiveTrial`] if idle. The in-flight cycle,
    /// if any, completes; only future iterations are suppressed.
    pub fn stop(&self) -> AppResult<StopResponse> {
        let active = self.trial().take().ok_or(RigError::NoActiveTrial)?;
        let _ = active.stop_tx.send(true);

        let elapsed = Utc::now().signed_duration_since(active.started_at);
        info!(
            "trial stopped: {} after {} cycles in {}s",
            active.trial_id,
            active.cycle_count,
            elapsed.num_seconds()
        );
        Ok(StopResponse {
            trial_id: active.trial_id,
            cycle_count: active.cycle_count,
        })
    }

    /// Take a consistent snapshot of the controller state.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let trial = self.trial();
        match trial.as_ref() {
            None => ControllerSnapshot {
                state: "idle",
                trial_id: String::new(),
                cycle_count: 0,
                last_cycle_at: String::new(),
                should_sync: false,
            },
            Some(active) => ControllerSnapshot {
                state: "running",
                trial_id: active.trial_id.clone(),
                cycle_count: active.cycle_count,
                last_cycle_at: active
                    .last_cycle_at
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_default(),
                should_sync: true,
            },
        }
    }

    /// Dispatch one wire-format command.
    pub async fn do_command(&self, cmd: &Value) -> AppResult<Value> {
        match ControllerCommand::parse(cmd)? {
            ControllerCommand::ExecuteCycle => {
                let outcome = self.execute_cycle().await?;
                Ok(to_payload(&CycleResponse {
                    status: "completed",
                    force_capture: outcome.force_capture.map(|summary| EndCaptureResponse {
                        status: "completed",
                        summary,
                    }),
                }))
            }
            ControllerCommand::Start => Ok(to_payload(&self.start()?)),
            ControllerCommand::Stop => Ok(to_payload(&self.stop()?)),
            ControllerCommand::Status => Ok(to_payload(&self.snapshot())),
        }
    }

    /// Background loop body: cycle until stop or shutdown, logging failed
    /// cycles without ending the trial.
    async fn run_cycle_loop(self, stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() || self.inner.shutdown.is_cancelled() {
                break;
            }
            match self.execute_cycle().await {
                Ok(_) => {}
                Err(RigError::Cancelled) => break,
                Err(err) => warn!("cycle failed: {err}"),
            }
        }
        info!("cycle loop exited");
    }

    /// Trial metadata for a capture start, empty/zero when idle.
    fn capture_request(&self) -> CaptureRequest {
        match self.trial().as_ref() {
            Some(active) => CaptureRequest {
                trial_id: active.trial_id.clone(),
                cycle_count: active.cycle_count,
            },
            None => CaptureRequest::default(),
        }
    }

    /// Fixed settle wait, cut short only by process shutdown.
    async fn settle_wait(&self) -> AppResult<()> {
        let mut shutdown = self.inner.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(self.inner.settle) => Ok(()),
            _ = shutdown.cancelled() => Err(RigError::Cancelled),
        }
    }

    /// Poll the actuator until it reports not moving.
    ///
    /// The timeout is a logged recovery (`Ok`); only shutdown and actuator
    /// query failures return `Err`, and the caller treats the latter as
    /// non-fatal.
    async fn wait_for_arm_stopped(&self) -> AppResult<()> {
        let mut shutdown = self.inner.shutdown.clone();
        let deadline = Instant::now() + self.inner.move_timeout;
        let mut poll = tokio::time::interval(self.inner.move_poll);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if Instant::now() >= deadline {
                        warn!(
                            "timeout waiting for arm to stop after {:?}",
                            self.inner.move_timeout
                        );
                        return Ok(());
                    }
                    match self.inner.arm.is_moving().await {
                        Ok(false) => return Ok(()),
                        Ok(true) => {}
                        Err(source) => return Err(RigError::Actuator(source)),
                    }
                }
                _ = shutdown.cancelled() => return Err(RigError::Cancelled),
            }
        }
    }
}
