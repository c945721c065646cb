// src/utils/mod.rs
//! Shared utilities: configuration, errors and time

pub mod clock;
pub mod config;
pub mod errors;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, PolicyConfig, PolicyOverrides};
pub use errors::{EngineError, Result};
