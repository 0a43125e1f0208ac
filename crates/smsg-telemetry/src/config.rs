//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Component within the service (e.g. "loadtest"); empty for none
    pub component: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to write log lines to stdout
    pub console_output: bool,

    /// Whether log lines are JSON instead of human-readable
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "smsg".to_string(),
            component: String::new(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SMSG_SERVICE_NAME`: Service name (default: smsg)
    /// - `SMSG_COMPONENT`: Component name (default: none)
    /// - `SMSG_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `SMSG_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `SMSG_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("SMSG_SERVICE_NAME").unwrap_or_else(|_| "smsg".to_string()),

            component: env::var("SMSG_COMPONENT").unwrap_or_default(),

            log_level: env::var("SMSG_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("SMSG_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            json_logs: env::var("SMSG_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),
        }
    }

    /// Configuration for a named component, other fields from the environment.
    pub fn for_component(component: &str) -> Self {
        let mut config = Self::from_env();
        config.component = component.to_string();
        config
    }

    /// Service name including the component, if any.
    pub fn full_service_name(&self) -> String {
        if self.component.is_empty() {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.component)
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
