//! # smsg Telemetry
//!
//! Logging and metrics bootstrap for processes that use the bus.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use smsg_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Bus diagnostics are now written through tracing-subscriber,
//!     // and bus counters can be exported with `record_bus_snapshot`.
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SMSG_SERVICE_NAME` | `smsg` | Service name in log lines |
//! | `SMSG_COMPONENT` | (none) | Component suffix |
//! | `SMSG_LOG_LEVEL` | `info` | Log filter (`RUST_LOG` also honoured) |
//! | `SMSG_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SMSG_JSON_LOGS` | `false` | JSON log lines |

pub mod config;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, LoggingGuard};
pub use metrics::{record_bus_snapshot, register_metrics, MetricsHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics and install the logging subscriber.
///
/// The returned guard should be held for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first; they do not depend on logging
    let metrics = register_metrics()?;
    let logging = init_logging(&config)?;

    Ok(TelemetryGuard {
        config,
        metrics,
        _logging: logging,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    config: TelemetryConfig,
    metrics: MetricsHandle,
    _logging: LoggingGuard,
}

impl TelemetryGuard {
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.config.full_service_name(), "Shutting down telemetry");
    }
}
