//! Registration bookkeeping shared by both channels.
//!
//! The registry is plain data; locking lives in [`Bus`](crate::Bus).

use std::collections::HashMap;

use crate::handler::{BoundContext, BroadcastHandler, CallHandler};

/// One entry in a topic's listener sequence.
#[derive(Clone, Debug)]
pub(crate) struct Subscription {
    pub(crate) handler: BroadcastHandler,
    pub(crate) context: BoundContext,
}

impl Subscription {
    fn matches(&self, handler: &BroadcastHandler, context: &BoundContext) -> bool {
        self.handler.same_as(handler) && self.context.same_as(context)
    }
}

/// The single handler bound to a call topic.
#[derive(Clone, Debug)]
pub(crate) struct CallRegistration {
    pub(crate) handler: CallHandler,
    pub(crate) context: BoundContext,
}

#[derive(Default, Debug)]
pub(crate) struct Registry {
    /// Never holds an empty sequence; emptied topics are removed.
    listeners: HashMap<String, Vec<Subscription>>,
    calls: HashMap<String, CallRegistration>,
}

impl Registry {
    pub(crate) fn add_listener(&mut self, topic: &str, subscription: Subscription) -> usize {
        let entries = self.listeners.entry(topic.to_string()).or_default();
        entries.push(subscription);
        entries.len()
    }

    /// Remove every entry matching the pair. Returns how many were removed.
    pub(crate) fn remove_listener(
        &mut self,
        topic: &str,
        handler: &BroadcastHandler,
        context: &BoundContext,
    ) -> usize {
        let Some(entries) = self.listeners.get_mut(topic) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|s| !s.matches(handler, context));
        let removed = before - entries.len();
        if entries.is_empty() {
            self.listeners.remove(topic);
        }
        removed
    }

    /// Copy of the topic's listeners at this instant.
    pub(crate) fn listeners_snapshot(&self, topic: &str) -> Vec<Subscription> {
        self.listeners.get(topic).cloned().unwrap_or_default()
    }

    pub(crate) fn listener_count(&self, topic: &str) -> usize {
        self.listeners.get(topic).map_or(0, Vec::len)
    }

    /// Bind `registration` unless the slot is taken. Returns whether it was bound.
    pub(crate) fn add_call(&mut self, topic: &str, registration: CallRegistration) -> bool {
        if self.calls.contains_key(topic) {
            return false;
        }
        self.calls.insert(topic.to_string(), registration);
        true
    }

    pub(crate) fn call(&self, topic: &str) -> Option<CallRegistration> {
        self.calls.get(topic).cloned()
    }

    pub(crate) fn has_call(&self, topic: &str) -> bool {
        self.calls.contains_key(topic)
    }

    /// Empty the slot. With a handler given, only when handler and context
    /// both match the stored registration.
    pub(crate) fn remove_call(
        &mut self,
        topic: &str,
        expected: Option<(&CallHandler, &BoundContext)>,
    ) -> bool {
        let matches = match (self.calls.get(topic), expected) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some((handler, context))) => {
                current.handler.same_as(handler) && current.context.same_as(context)
            }
        };
        if matches {
            self.calls.remove(topic);
        }
        matches
    }

    pub(crate) fn clear_listeners(&mut self) -> usize {
        let topics = self.listeners.len();
        self.listeners.clear();
        topics
    }

    pub(crate) fn clear_calls(&mut self) -> usize {
        let topics = self.calls.len();
        self.calls.clear();
        topics
    }

    /// Every topic with a listener or a call handler, sorted.
    pub(crate) fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .listeners
            .keys()
            .chain(self.calls.keys().filter(|t| !self.listeners.contains_key(*t)))
            .cloned()
            .collect();
        topics.sort();
        topics
    }
}
