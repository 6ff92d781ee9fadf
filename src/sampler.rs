//! Force-capture sampler.
//!
//! [`ForceSampler`] owns a three-state capture machine (idle, waiting for
//! contact, actively capturing) and a fixed-capacity rolling buffer of force
//! samples. A background task polls the [`ForceReader`] at the configured
//! rate for the component's entire lifetime; samples are only buffered while
//! a capture window is open.
//!
//! A window opens on `start_capture` and normally closes on `end_capture`.
//! If the caller never ends the window, the armed timeout resets the machine
//! to idle on a later tick — a logged recovery, not an error, so a wedged
//! controller can always start the next capture.
//!
//! All shared state lives behind one mutex with short critical sections;
//! the force read itself happens without the lock held.

use crate::config::SamplerConfig;
use crate::core::{CaptureRequest, CaptureSampler, CaptureSummary, ForceReader, ShutdownToken};
use crate::error::{AppResult, RigError};
use crate::protocol::{
    to_payload, EndCaptureResponse, SamplerCommand, StartCaptureResponse,
};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Capture window state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CaptureState {
    /// No window open; ticks are skipped
    Idle,
    /// Window open, waiting for the first reading at or above the threshold
    Waiting,
    /// Contact detected; samples are being buffered
    Active,
}

impl CaptureState {
    fn label(self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::Waiting => "waiting",
            CaptureState::Active => "capturing",
        }
    }
}

/// Mutable state shared between the sampling loop and command handlers.
struct CaptureInner {
    state: CaptureState,
    samples: VecDeque<f64>,
    trial_id: String,
    cycle_count: u64,
    deadline: Option<Instant>,
}

/// Read-only snapshot of the sampler, taken under the lock in one piece.
#[derive(Clone, Debug, Serialize)]
pub struct SamplerSnapshot {
    /// Trial identifier recorded at capture start, or empty
    pub trial_id: String,
    /// Cycle count recorded at capture start, or zero
    pub cycle_count: u64,
    /// True iff a non-empty trial identifier is recorded
    pub should_sync: bool,
    /// Copy of the current buffer contents, oldest first
    pub samples: Vec<f64>,
    /// Number of buffered samples
    pub sample_count: usize,
    /// Capture state label: `idle`, `waiting`, or `capturing`
    pub capture_state: &'static str,
    /// Peak value in the buffer; omitted while the buffer is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_force: Option<f64>,
}

/// Force-capture sampler. See the module docs for the state machine.
pub struct ForceSampler {
    reader: Arc<dyn ForceReader>,
    sample_rate_hz: u32,
    buffer_size: usize,
    zero_threshold: f64,
    capture_timeout: Duration,
    inner: Mutex<CaptureInner>,
}

impl ForceSampler {
    /// Build a sampler without starting its sampling loop.
    ///
    /// Most callers want [`ForceSampler::spawn`]; this constructor exists so
    /// tests can drive ticks by hand.
    pub fn new(reader: Arc<dyn ForceReader>, config: &SamplerConfig) -> Self {
        Self {
            reader,
            sample_rate_hz: config.sample_rate_hz,
            buffer_size: config.buffer_size,
            zero_threshold: config.zero_threshold,
            capture_timeout: Duration::from_millis(config.capture_timeout_ms),
            inner: Mutex::new(CaptureInner {
                state: CaptureState::Idle,
                samples: VecDeque::with_capacity(config.buffer_size),
                trial_id: String::new(),
                cycle_count: 0,
                deadline: None,
            }),
        }
    }

    /// Build a sampler and launch its lifetime sampling task.
    ///
    /// The task runs until the shutdown token fires.
    pub fn spawn(
        reader: Arc<dyn ForceReader>,
        config: &SamplerConfig,
        shutdown: ShutdownToken,
    ) -> Arc<Self> {
        let sampler = Arc::new(Self::new(reader, config));
        let task_ref = Arc::clone(&sampler);
        tokio::spawn(async move {
            task_ref.sampling_loop(shutdown).await;
        });
        sampler
    }

    /// Lock the shared state, recovering the guard if a holder panicked.
    fn inner(&self) -> MutexGuard<'_, CaptureInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn sampling_loop(self: Arc<Self>, mut shutdown: ShutdownToken) {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.sample_rate_hz));
        let mut interval = tokio::time::interval(period);

        info!("force sampling loop started at {} Hz", self.sample_rate_hz);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.cancelled() => {
                    info!("force sampling loop shutting down");
                    break;
                }
            }
        }
    }

    /// One sampling tick: timeout check, read, state transition, append.
    async fn tick(&self) {
        {
            let mut inner = self.inner();
            match inner.state {
                CaptureState::Idle => return,
                CaptureState::Waiting | CaptureState::Active => {}
            }
            if let Some(deadline) = inner.deadline {
                if Instant::now() >= deadline {
                    warn!(
                        "capture timeout: end_capture not called within {:?}",
                        self.capture_timeout
                    );
                    Self::reset_to_idle(&mut inner);
                    drop(inner);
                    self.reader.simulate_contact(false);
                    return;
                }
            }
        }

        // Read without the lock; the command handlers stay responsive.
        let force = match self.reader.read_force().await {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to read force: {err:#}");
                return;
            }
        };

        let mut inner = self.inner();
        if inner.state == CaptureState::Waiting && force >= self.zero_threshold {
            // First contact: discard pre-contact noise.
            inner.state = CaptureState::Active;
            inner.samples.clear();
            info!("force capture active (first reading: {force:.2})");
        }
        if inner.state == CaptureState::Active {
            if inner.samples.len() >= self.buffer_size {
                inner.samples.pop_front();
            }
            inner.samples.push_back(force);
        }
    }

    /// Clear trial metadata and disarm the timeout. The buffer is left in
    /// place for post-mortem snapshots; the next `start_capture` clears it.
    fn reset_to_idle(inner: &mut CaptureInner) {
        inner.state = CaptureState::Idle;
        inner.trial_id.clear();
        inner.cycle_count = 0;
        inner.deadline = None;
    }

    /// Open a capture window, recording the caller's trial metadata.
    pub fn start_capture(&self, request: CaptureRequest) -> AppResult<()> {
        {
            let mut inner = self.inner();
            if inner.state != CaptureState::Idle {
                return Err(RigError::CaptureInProgress(inner.state.label()));
            }
            inner.trial_id = request.trial_id;
            inner.cycle_count = request.cycle_count;
            inner.state = CaptureState::Waiting;
            inner.samples.clear();
            inner.deadline = Some(Instant::now() + self.capture_timeout);
        }

        self.reader.simulate_contact(true);
        info!(
            "capture started, waiting for reading >= {:.2}",
            self.zero_threshold
        );
        Ok(())
    }

    /// Close the capture window and return its summary.
    pub fn end_capture(&self) -> AppResult<CaptureSummary> {
        let summary = {
            let mut inner = self.inner();
            if inner.state == CaptureState::Idle {
                return Err(RigError::NoCaptureInProgress);
            }

            let was = inner.state.label();
            let summary = CaptureSummary {
                sample_count: inner.samples.len(),
                max_force: peak(&inner.samples).unwrap_or(0.0),
                trial_id: inner.trial_id.clone(),
                cycle_count: inner.cycle_count,
            };
            Self::reset_to_idle(&mut inner);
            info!(
                "capture ended (was {was}): {} samples, max force: {:.2}",
                summary.sample_count, summary.max_force
            );
            summary
        };

        self.reader.simulate_contact(false);
        Ok(summary)
    }

    /// Take a consistent snapshot of the sampler state.
    pub fn snapshot(&self) -> SamplerSnapshot {
        let inner = self.inner();
        let samples: Vec<f64> = inner.samples.iter().copied().collect();
        SamplerSnapshot {
            trial_id: inner.trial_id.clone(),
            cycle_count: inner.cycle_count,
            should_sync: !inner.trial_id.is_empty(),
            max_force: peak(&inner.samples),
            sample_count: samples.len(),
            capture_state: inner.state.label(),
            samples,
        }
    }

    /// Dispatch one wire-format command.
    pub fn do_command(&self, cmd: &Value) -> AppResult<Value> {
        match SamplerCommand::parse(cmd)? {
            SamplerCommand::StartCapture(request) => {
                self.start_capture(request)?;
                Ok(to_payload(&StartCaptureResponse { status: "waiting" }))
            }
            SamplerCommand::EndCapture => {
                let summary = self.end_capture()?;
                Ok(to_payload(&EndCaptureResponse {
                    status: "completed",
                    summary,
                }))
            }
        }
    }
}

#[async_trait]
impl CaptureSampler for ForceSampler {
    async fn start_capture(&self, request: CaptureRequest) -> AppResult<()> {
        ForceSampler::start_capture(self, request)
    }

    async fn end_capture(&self) -> AppResult<CaptureSummary> {
        ForceSampler::end_capture(self)
    }
}

fn peak(samples: &VecDeque<f64>) -> Option<f64> {
    samples.iter().copied().reduce(f64::max)
}
