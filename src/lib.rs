//! # Flowguard
//!
//! The decision core of a request-level traffic-control library.
//! For every inbound call to a protected resource it maintains rolling
//! statistics per resource and per calling origin, evaluates circuit-breaking
//! rules with a stepped half-open recovery protocol, and extracts request
//! parameters to derive per-parameter flow-control keys.

pub mod core;
pub mod logging;
pub mod utils;

pub use crate::core::*;

pub use anyhow::{Error, Result};
