//! Ramp driver.
//!
//! Each step sends `rps` requests per second for the configured duration,
//! waits for the settle delay, then compares handler runs against requests
//! sent. The ramp for a mode stops at the first step whose completion ratio
//! is below the threshold.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use smsg_bus::{Bus, BroadcastHandler, CallHandler, PendingResult};
use smsg_telemetry::metrics::{HistogramTimer, CALL_LATENCY};
use tracing::{debug, info, warn};

use crate::config::{LoadTestConfig, TestMode};

pub const BROADCAST_TOPIC: &str = "loadtest.broadcast";
pub const CALL_TOPIC: &str = "loadtest.call";

/// Requests are sent in batches on this tick.
const TICK: Duration = Duration::from_millis(10);

/// Outcome of one ramp step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub mode: &'static str,
    pub target_rps: u64,
    pub sent: u64,
    pub completed: u64,
    pub elapsed_ms: u64,
}

impl StepResult {
    pub fn success_rate(&self) -> f64 {
        if self.sent == 0 {
            return 1.0;
        }
        self.completed as f64 / self.sent as f64
    }

    pub fn achieved_rps(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.sent as f64 * 1000.0 / self.elapsed_ms as f64
    }
}

/// Drives load against one bus.
pub struct LoadRunner<'a> {
    bus: &'a Bus,
    config: LoadTestConfig,
    completed: Arc<AtomicU64>,
    subscription: BroadcastHandler,
    responder: CallHandler,
}

impl<'a> LoadRunner<'a> {
    pub fn new(bus: &'a Bus, config: LoadTestConfig) -> Self {
        let completed = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&completed);
        let subscription = BroadcastHandler::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let counter = Arc::clone(&completed);
        let responder = CallHandler::new(move |data| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(json!({ "success": true, "echo": data }))
        });

        Self {
            bus,
            config,
            completed,
            subscription,
            responder,
        }
    }

    /// Attach the counting subscriber and call handler.
    pub fn install(&self) -> Result<()> {
        self.bus
            .subscribe(BROADCAST_TOPIC, self.subscription.clone())
            .context("subscribing load test listener")?;

        self.bus
            .try_register(CALL_TOPIC, self.responder.clone())
            .context("registering load test call handler")?;

        debug!("Load test handlers installed");
        Ok(())
    }

    /// Detach everything [`install`](Self::install) attached. A call handler
    /// someone else registered on the topic is left alone.
    pub fn uninstall(&self) -> Result<()> {
        self.bus.unsubscribe(BROADCAST_TOPIC, &self.subscription)?;
        self.bus.unregister_handler(CALL_TOPIC, &self.responder)?;
        debug!("Load test handlers removed");
        Ok(())
    }

    /// Install, run every configured mode, then uninstall whether or not
    /// the run succeeded.
    pub async fn run_installed(&self) -> Result<Vec<StepResult>> {
        let outcome = match self.install() {
            Ok(()) => self.run().await,
            Err(e) => Err(e),
        };
        let cleanup = self.uninstall();
        let results = outcome?;
        cleanup?;
        Ok(results)
    }

    /// Run every configured mode.
    pub async fn run(&self) -> Result<Vec<StepResult>> {
        let mut results = Vec::new();
        for mode in self.config.modes.clone() {
            results.extend(self.run_mode(mode).await?);
        }
        Ok(results)
    }

    /// Ramp one mode until it saturates or reaches `max_rps`.
    pub async fn run_mode(&self, mode: TestMode) -> Result<Vec<StepResult>> {
        info!(mode = mode.name(), "Starting ramp");
        let mut results = Vec::new();

        for rps in self.config.steps() {
            let result = self.run_step(mode, rps).await?;
            let rate = result.success_rate();

            info!(
                mode = mode.name(),
                target_rps = rps,
                sent = result.sent,
                completed = result.completed,
                success_rate = rate,
                "Step finished"
            );

            results.push(result);
            if rate < self.config.success_threshold {
                warn!(
                    mode = mode.name(),
                    target_rps = rps,
                    threshold = self.config.success_threshold,
                    "Completion ratio below threshold, stopping ramp"
                );
                break;
            }
        }

        Ok(results)
    }

    async fn run_step(&self, mode: TestMode, rps: u64) -> Result<StepResult> {
        self.completed.store(0, Ordering::Relaxed);

        let ticks = (self.config.step_duration.as_millis() / TICK.as_millis()).max(1) as u64;
        let step_ms = u64::try_from(self.config.step_duration.as_millis()).unwrap_or(u64::MAX);
        let total = rps.saturating_mul(step_ms) / 1000;
        let mut interval = tokio::time::interval(TICK);
        let mut pending = Vec::new();
        let mut sent = 0u64;
        let start = Instant::now();

        for tick in 0..ticks {
            interval.tick().await;
            // Spread the remainder over the first ticks
            let batch = total / ticks + u64::from(tick < total % ticks);
            for _ in 0..batch {
                self.send(mode, sent, &mut pending)?;
                sent += 1;
            }
        }
        let elapsed = start.elapsed();

        let settle = tokio::time::timeout(self.config.settle_delay, join_all(pending)).await;
        if settle.is_err() {
            debug!(mode = mode.name(), rps, "Pending calls still outstanding after settle delay");
        }

        Ok(StepResult {
            mode: mode.name(),
            target_rps: rps,
            sent,
            completed: self.completed.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    fn send(
        &self,
        mode: TestMode,
        sequence: u64,
        pending: &mut Vec<tokio::task::JoinHandle<()>>,
    ) -> Result<()> {
        let use_call = match mode {
            TestMode::Broadcast => false,
            TestMode::Call => true,
            TestMode::Mixed => sequence % 2 == 1,
        };

        let data = json!({ "seq": sequence });
        if use_call {
            let timer =
                smsg_telemetry::time_histogram!(CALL_LATENCY.with_label_values(&["deferred"]));
            let result = self.bus.invoke(CALL_TOPIC, data)?;
            pending.push(tokio::spawn(observe(result, timer)));
        } else {
            self.bus.publish(BROADCAST_TOPIC, data)?;
        }
        Ok(())
    }
}

async fn observe(result: PendingResult, _timer: HistogramTimer) {
    if let Err(e) = result.await {
        debug!(error = %e, "Load test call failed");
    }
}

/// Render results as a fixed-width table.
pub fn render_table(results: &[StepResult]) -> String {
    let mut out = format!(
        "{:<10} {:>10} {:>10} {:>10} {:>12} {:>9}\n",
        "mode", "target", "sent", "completed", "achieved/s", "success"
    );
    for r in results {
        out.push_str(&format!(
            "{:<10} {:>10} {:>10} {:>10} {:>12.1} {:>8.2}%\n",
            r.mode,
            r.target_rps,
            r.sent,
            r.completed,
            r.achieved_rps(),
            r.success_rate() * 100.0
        ));
    }
    out
}
