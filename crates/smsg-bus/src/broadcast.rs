//! # Broadcast Channel
//!
//! Fan-out by topic. `publish` runs every subscriber on the caller's thread,
//! in subscription order, against a snapshot of the listener list taken when
//! `publish` starts. Subscriptions added or removed by a handler take effect
//! from the next `publish`.
//!
//! A publish with no subscribers is dropped; nothing is queued for later
//! subscribers.

use tracing::{debug, error, trace};

use crate::bus::Bus;
use crate::error::{BusError, Channel};
use crate::handler::{BoundContext, BroadcastHandler};
use crate::registry::Subscription;
use crate::topic;
use crate::Payload;

impl Bus {
    /// Append `handler` to the topic's subscribers.
    pub fn subscribe(&self, topic: &str, handler: BroadcastHandler) -> Result<&Self, BusError> {
        self.subscribe_with(topic, handler, BoundContext::none())
    }

    /// Append `handler`, to be invoked against `context`.
    ///
    /// The same pair may be subscribed more than once; each entry fires.
    pub fn subscribe_with(
        &self,
        topic: &str,
        handler: BroadcastHandler,
        context: BoundContext,
    ) -> Result<&Self, BusError> {
        let topic = topic::validate(topic)?;
        let subscribers = self
            .registry
            .write()
            .add_listener(topic, Subscription { handler, context });
        debug!(topic, subscribers, "Broadcast subscription added");
        Ok(self)
    }

    /// Run every subscriber of `topic` with `data`.
    ///
    /// Handler failures are logged and never reach the caller; later
    /// subscribers still run.
    pub fn publish(&self, topic: &str, data: Payload) -> Result<&Self, BusError> {
        let topic = topic::validate(topic)?;
        let subscribers = self.registry.read().listeners_snapshot(topic);

        if subscribers.is_empty() {
            trace!(topic, "Broadcast dropped (no subscribers)");
            self.metrics.record_publish(0, 0);
            return Ok(self);
        }

        let mut failed = 0;
        for (index, subscription) in subscribers.iter().enumerate() {
            if let Err(source) = subscription.handler.call(&subscription.context, &data) {
                failed += 1;
                let err = BusError::handler(topic, Channel::Broadcast, source);
                error!(topic, subscriber = index, error = %err, "Broadcast handler failed");
            }
        }

        self.metrics.record_publish(subscribers.len(), failed);
        trace!(topic, delivered = subscribers.len(), failed, "Broadcast published");
        Ok(self)
    }

    /// Remove every subscription of `handler` without a receiver.
    pub fn unsubscribe(&self, topic: &str, handler: &BroadcastHandler) -> Result<&Self, BusError> {
        self.unsubscribe_with(topic, handler, &BoundContext::none())
    }

    /// Remove every subscription matching `handler` and `context` exactly.
    ///
    /// A topic whose last subscription goes away is removed entirely.
    pub fn unsubscribe_with(
        &self,
        topic: &str,
        handler: &BroadcastHandler,
        context: &BoundContext,
    ) -> Result<&Self, BusError> {
        let topic = topic::validate(topic)?;
        let removed = self
            .registry
            .write()
            .remove_listener(topic, handler, context);
        debug!(topic, removed, "Broadcast subscription removed");
        Ok(self)
    }
}
