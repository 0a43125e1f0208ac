//! # Bus
//!
//! The registry container and its process-wide instance. Channel operations
//! live in [`broadcast`](crate::broadcast) and [`call`](crate::call).
//!
//! The registry sits behind one `RwLock`. Operations that run user code clone
//! what they need out of the registry and drop the guard first, so handlers
//! may use the bus re-entrantly.

use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BusError;
use crate::metrics::BusMetrics;
use crate::registry::Registry;
use crate::topic;

lazy_static! {
    static ref SHARED: Bus = Bus::new();
}

/// The process-wide bus, created on first access.
pub fn bus() -> &'static Bus {
    Bus::instance()
}

/// What is currently attached to a topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStatus {
    /// Number of broadcast subscriptions (0 if none).
    pub subscriber_count: usize,
    /// Whether a call handler is registered.
    pub has_call_handler: bool,
}

/// Message bus with a broadcast channel and a call channel.
#[derive(Debug, Default)]
pub struct Bus {
    pub(crate) registry: RwLock<Registry>,
    pub(crate) metrics: Arc<BusMetrics>,
}

impl Bus {
    /// A private bus, independent of the shared one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide bus. Every call returns the same instance.
    pub fn instance() -> &'static Bus {
        &SHARED
    }

    /// Subscription count and call handler presence for `topic`.
    pub fn check(&self, topic: &str) -> Result<TopicStatus, BusError> {
        let topic = topic::validate(topic)?;
        let registry = self.registry.read();
        Ok(TopicStatus {
            subscriber_count: registry.listener_count(topic),
            has_call_handler: registry.has_call(topic),
        })
    }

    /// Topics with at least one subscription or a call handler, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.registry.read().topics()
    }

    /// Drop every broadcast subscription. Call registrations are untouched.
    pub fn clear_all_subscriptions(&self) -> &Self {
        let topics = self.registry.write().clear_listeners();
        debug!(topics, "Cleared all broadcast subscriptions");
        self
    }

    /// Drop every call registration. Subscriptions are untouched.
    pub fn clear_all_registrations(&self) -> &Self {
        let topics = self.registry.write().clear_calls();
        debug!(topics, "Cleared all call registrations");
        self
    }

    pub fn metrics(&self) -> &BusMetrics {
        &self.metrics
    }
}
