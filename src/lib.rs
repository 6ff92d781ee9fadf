//! Core library for the cycle-rig application.
//!
//! This library contains the trial/cycle controller, the force-capture
//! sampler, and the command protocol that ties them together. It is used by
//! the demo binary and by integration tests; real deployments wire their own
//! hardware behind the traits in [`core`].

pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod hardware;
pub mod protocol;
pub mod sampler;
