//! Runtime glue: configuration, run state, progress tracking, fatal error
//! supervision, telemetry and the signal-aware runner.

pub mod config;
pub mod fatal;
pub mod progress;
pub mod runner;
pub mod state;
pub mod telemetry;
