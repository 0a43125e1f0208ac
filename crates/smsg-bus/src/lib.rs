//! # smsg Bus - In-Process Message Bus
//!
//! Two orthogonal channels share one registry:
//!
//! - **Broadcast:** many handlers per topic, fired in subscription order.
//!   Producers never see consumer results.
//! - **Call:** at most one handler per topic. Callers get a result back,
//!   either deferred ([`Bus::invoke`]) or immediately ([`Bus::invoke_sync`]).
//!
//! ```text
//!  subscribe()/publish()            register()/invoke()
//!         │                                │
//!         ▼                                ▼
//! ┌──────────────────────────────────────────────────┐
//! │                       Bus                        │
//! │   listeners: topic -> [Subscription, ...]        │
//! │   calls:     topic -> CallRegistration           │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Process-wide instance
//!
//! [`bus()`] (or [`Bus::instance`]) returns the shared bus, created on first
//! access and never torn down. [`Bus::clear_all_subscriptions`] and
//! [`Bus::clear_all_registrations`] reset it. [`Bus::new`] builds a private
//! bus with the same semantics.
//!
//! ## Failure isolation
//!
//! - `publish` logs handler failures and keeps going.
//! - `invoke` logs and fails the returned [`PendingResult`].
//! - `invoke_sync` logs and returns the failure to the caller, or fails the
//!   [`SyncReply::Pending`] reply of a deferred handler.
//!
//! ```rust,ignore
//! use serde_json::json;
//! use smsg_bus::{bus, BroadcastHandler, CallHandler};
//!
//! let on_ready = BroadcastHandler::new(|data| {
//!     tracing::info!(%data, "module ready");
//!     Ok(())
//! });
//! bus().subscribe("module.ready", on_ready.clone())?;
//! bus().publish("module.ready", json!({ "name": "a" }))?;
//!
//! bus().register("math.add", CallHandler::new(|data| {
//!     Ok(json!(data["a"].as_i64().unwrap_or(0) + data["b"].as_i64().unwrap_or(0)))
//! }))?;
//! let sum = bus().invoke("math.add", json!({ "a": 1, "b": 2 }))?.await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broadcast;
pub mod bus;
pub mod call;
pub mod error;
pub mod handler;
pub mod metrics;
mod registry;
pub mod topic;

// Re-export main types
pub use bus::{bus, Bus, TopicStatus};
pub use call::{PendingResult, SyncReply};
pub use error::{BusError, Channel};
pub use handler::{BoundContext, BroadcastHandler, CallHandler, HandlerResult};
pub use metrics::{BusMetrics, BusMetricsSnapshot};

/// Payload carried by broadcasts and calls.
pub type Payload = serde_json::Value;
