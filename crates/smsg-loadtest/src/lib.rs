//! # smsg Load Test
//!
//! Ramps request rate against a bus in broadcast, call and mixed modes and
//! reports the highest rate each mode sustains.
//!
//! Configuration is read from `SMSG_LOADTEST_*` environment variables; see
//! [`LoadTestConfig::from_env`].

pub mod config;
pub mod runner;

pub use config::{ConfigError, LoadTestConfig, TestMode};
pub use runner::{render_table, LoadRunner, StepResult};
