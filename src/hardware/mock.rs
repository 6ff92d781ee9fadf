//! Mock hardware that generates synthetic behavior.

use crate::core::{Actuator, ForceReader, PoseTrigger};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

/// Simulates a realistic force profile: a near-zero noise floor while the
/// test object is lifted, then a ramp toward a plateau on contact.
pub struct MockForceReader {
    state: Mutex<MockCurveState>,
}

struct MockCurveState {
    in_contact: bool,
    contact_count: u32,
}

impl MockForceReader {
    /// Build a reader in the lifted (no-contact) state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockCurveState {
                in_contact: false,
                contact_count: 0,
            }),
        }
    }
}

impl Default for MockForceReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForceReader for MockForceReader {
    async fn read_force(&self) -> Result<f64> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !state.in_contact {
            // Lifted: near-zero reading, below any sane threshold.
            return Ok(0.5);
        }

        state.contact_count += 1;
        // Deterministic wobble; thread_rng is not Send-friendly in
        // spawned sampling tasks.
        let noise = (f64::from(state.contact_count) * 0.7).sin() * 0.5;

        // Ramp from 50 to 200 over 50 samples, then hold.
        if state.contact_count < 50 {
            Ok(50.0 + f64::from(state.contact_count) * 3.0 + noise)
        } else {
            Ok(200.0 + noise)
        }
    }

    fn simulate_contact(&self, in_contact: bool) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.in_contact = in_contact;
        if in_contact {
            state.contact_count = 0;
        }
    }
}

/// Records pose triggers and optionally fails the next one.
pub struct MockPoseTrigger {
    triggers: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl MockPoseTrigger {
    /// Build a trigger with no planned failure.
    pub fn new() -> Self {
        Self {
            triggers: AtomicU64::new(0),
            fail_next: Mutex::new(None),
        }
    }

    /// Number of successful triggers so far.
    pub fn trigger_count(&self) -> u64 {
        self.triggers.load(Ordering::SeqCst)
    }

    /// Make the next trigger fail with the given message.
    pub fn fail_next(&self, message: &str) {
        let mut fail = self
            .fail_next
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *fail = Some(message.to_string());
    }
}

impl Default for MockPoseTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PoseTrigger for MockPoseTrigger {
    async fn trigger(&self) -> Result<()> {
        let planned_failure = {
            let mut fail = self
                .fail_next
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            fail.take()
        };
        if let Some(message) = planned_failure {
            return Err(anyhow!(message));
        }
        self.triggers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reports "moving" for a fixed number of polls, then settled.
///
/// The counter re-arms after settling so each movement phase of a cycle
/// sees the same short motion.
pub struct MockActuator {
    polls_until_settled: u32,
    remaining: AtomicU32,
}

impl MockActuator {
    /// Build an actuator that settles after `polls_until_settled` polls.
    pub fn new(polls_until_settled: u32) -> Self {
        Self {
            polls_until_settled,
            remaining: AtomicU32::new(polls_until_settled),
        }
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn is_moving(&self) -> Result<bool> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining == 0 {
            self.remaining
                .store(self.polls_until_settled, Ordering::SeqCst);
            return Ok(false);
        }
        self.remaining.store(remaining - 1, Ordering::SeqCst);
        Ok(true)
    }
}
