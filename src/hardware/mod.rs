//! Simulated hardware implementations.
//!
//! Real actuator and load-cell drivers live outside this crate behind the
//! traits in [`crate::core`]; the mocks here back the demo binary and the
//! test suite.

pub mod mock;

pub use mock::{MockActuator, MockForceReader, MockPoseTrigger};
