//! Load test configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Inconsistent(String),
}

/// Traffic shape of one test phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// Every request is a `publish`
    Broadcast,
    /// Every request is an `invoke`
    Call,
    /// Requests alternate between `publish` and `invoke`
    Mixed,
}

impl TestMode {
    pub const ALL: [TestMode; 3] = [TestMode::Broadcast, TestMode::Call, TestMode::Mixed];

    pub fn name(&self) -> &'static str {
        match self {
            TestMode::Broadcast => "broadcast",
            TestMode::Call => "call",
            TestMode::Mixed => "mixed",
        }
    }
}

impl FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "broadcast" => Ok(TestMode::Broadcast),
            "call" => Ok(TestMode::Call),
            "mixed" => Ok(TestMode::Mixed),
            other => Err(other.to_string()),
        }
    }
}

/// Ramp parameters.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Requests per second of the first step
    pub initial_rps: u64,
    /// Increase per step
    pub rps_step: u64,
    /// Ramp stops after this rate
    pub max_rps: u64,
    /// How long each step drives traffic
    pub step_duration: Duration,
    /// Wait after a step before counting completions
    pub settle_delay: Duration,
    /// Minimum completed/sent ratio to keep ramping
    pub success_threshold: f64,
    /// Phases to run, in order
    pub modes: Vec<TestMode>,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            initial_rps: 1_000,
            rps_step: 1_000,
            max_rps: 50_000,
            step_duration: Duration::from_millis(2_000),
            settle_delay: Duration::from_millis(200),
            success_threshold: 0.999,
            modes: TestMode::ALL.to_vec(),
        }
    }
}

impl LoadTestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SMSG_LOADTEST_INITIAL_RPS` (default: 1000)
    /// - `SMSG_LOADTEST_RPS_STEP` (default: 1000)
    /// - `SMSG_LOADTEST_MAX_RPS` (default: 50000)
    /// - `SMSG_LOADTEST_STEP_MS` (default: 2000)
    /// - `SMSG_LOADTEST_SETTLE_MS` (default: 200)
    /// - `SMSG_LOADTEST_SUCCESS_THRESHOLD` (default: 0.999)
    /// - `SMSG_LOADTEST_MODES`: comma separated, e.g. `broadcast,call`
    ///   (default: all)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            initial_rps: parse_var("SMSG_LOADTEST_INITIAL_RPS", defaults.initial_rps)?,
            rps_step: parse_var("SMSG_LOADTEST_RPS_STEP", defaults.rps_step)?,
            max_rps: parse_var("SMSG_LOADTEST_MAX_RPS", defaults.max_rps)?,
            step_duration: Duration::from_millis(parse_var(
                "SMSG_LOADTEST_STEP_MS",
                defaults.step_duration.as_millis() as u64,
            )?),
            settle_delay: Duration::from_millis(parse_var(
                "SMSG_LOADTEST_SETTLE_MS",
                defaults.settle_delay.as_millis() as u64,
            )?),
            success_threshold: parse_var(
                "SMSG_LOADTEST_SUCCESS_THRESHOLD",
                defaults.success_threshold,
            )?,
            modes: match env::var("SMSG_LOADTEST_MODES") {
                Ok(raw) => parse_modes(&raw)?,
                Err(_) => defaults.modes,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_rps == 0 || self.rps_step == 0 {
            return Err(ConfigError::Inconsistent(
                "initial_rps and rps_step must be positive".to_string(),
            ));
        }
        if self.max_rps < self.initial_rps {
            return Err(ConfigError::Inconsistent(format!(
                "max_rps {} is below initial_rps {}",
                self.max_rps, self.initial_rps
            )));
        }
        if !(0.0..=1.0).contains(&self.success_threshold) {
            return Err(ConfigError::Inconsistent(format!(
                "success_threshold {} is outside 0..=1",
                self.success_threshold
            )));
        }
        if self.step_duration.is_zero() {
            return Err(ConfigError::Inconsistent(
                "step duration must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Rates visited by the ramp, in order. Ends before a rate that would
    /// overflow `u64`.
    pub fn steps(&self) -> impl Iterator<Item = u64> + '_ {
        (0u64..)
            .map_while(move |i| i.checked_mul(self.rps_step)?.checked_add(self.initial_rps))
            .take_while(move |rps| *rps <= self.max_rps)
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

fn parse_modes(raw: &str) -> Result<Vec<TestMode>, ConfigError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse().map_err(|value| ConfigError::InvalidValue {
                var: "SMSG_LOADTEST_MODES",
                value,
            })
        })
        .collect()
}
