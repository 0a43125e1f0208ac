use anyhow::{Context, Result};
use tracing::info;

use smsg_bus::bus;
use smsg_loadtest::{render_table, LoadRunner, LoadTestConfig};
use smsg_telemetry::{init_telemetry, record_bus_snapshot, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::for_component("loadtest"))?;

    let config = LoadTestConfig::from_env().context("loading load test configuration")?;
    info!(
        initial_rps = config.initial_rps,
        rps_step = config.rps_step,
        max_rps = config.max_rps,
        step_ms = config.step_duration.as_millis() as u64,
        threshold = config.success_threshold,
        service = %telemetry.config().full_service_name(),
        "Starting load test"
    );

    let shared = bus();
    let runner = LoadRunner::new(shared, config);
    let results = runner.run_installed().await?;

    let snapshot = shared.metrics().snapshot();
    record_bus_snapshot(&snapshot);
    info!(
        handler_runs = snapshot.successful_handler_runs(),
        call_failures = snapshot.call_failures,
        broadcast_failures = snapshot.broadcast_failures,
        "Load test finished"
    );

    println!("{}", render_table(&results));
    println!("{}", telemetry.metrics().encode()?);

    Ok(())
}
