//! # Call Channel
//!
//! At most one handler per topic.
//!
//! ```text
//!                register            unregister
//! Unregistered ─────────────► Registered ─────────────► Unregistered
//!                (duplicate register / failed invocations: no transition)
//! ```
//!
//! - [`Bus::invoke`] schedules the handler on the tokio runtime and hands
//!   back a [`PendingResult`]. The spawned task holds off until the pending
//!   result is first polled or dropped, so the handler never runs while the
//!   caller is still inside its own turn, even on a multi-threaded runtime.
//! - [`Bus::invoke_sync`] runs the handler on the caller's thread. An
//!   immediate handler's reply comes back as [`SyncReply::Value`]; a deferred
//!   handler is started in place and its reply comes back unawaited as
//!   [`SyncReply::Pending`].
//!
//! Both report `Ok(None)` when nothing is registered for the topic.

use std::fmt;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::bus::Bus;
use crate::error::{BusError, Channel};
use crate::handler::{BoundContext, CallHandler, HandlerResult, Reply};
use crate::metrics::BusMetrics;
use crate::registry::CallRegistration;
use crate::topic;
use crate::Payload;

/// Reply of [`Bus::invoke`], available once the handler has run.
///
/// Resolves to `Ok(None)` when no handler was registered, `Ok(Some(value))`
/// on success and `Err(BusError::HandlerExecution)` when the handler failed.
/// Dropping it does not cancel the handler; it releases it to run unobserved.
#[must_use = "the call's reply or failure is only observable by awaiting it"]
pub struct PendingResult {
    state: PendingState,
}

enum PendingState {
    Ready(future::Ready<Result<Option<Payload>, BusError>>),
    Scheduled {
        topic: String,
        task: JoinHandle<Result<Payload, BusError>>,
        release: Option<oneshot::Sender<()>>,
    },
    /// Deferred reply started by `invoke_sync`, polled on the awaiting task.
    InPlace {
        topic: String,
        reply: BoxFuture<'static, HandlerResult<Payload>>,
        metrics: Arc<BusMetrics>,
    },
}

impl PendingResult {
    fn resolved(value: Option<Payload>) -> Self {
        Self {
            state: PendingState::Ready(future::ready(Ok(value))),
        }
    }

    /// Whether a handler was scheduled for this call.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        !matches!(self.state, PendingState::Ready(_))
    }
}

impl Future for PendingResult {
    type Output = Result<Option<Payload>, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Ready(ready) => Pin::new(ready).poll(cx),
            PendingState::Scheduled {
                topic,
                task,
                release,
            } => {
                if let Some(release) = release.take() {
                    // The task may already be gone if the runtime shut down.
                    let _ = release.send(());
                }
                match Pin::new(task).poll(cx) {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Ok(reply)) => Poll::Ready(reply.map(Some)),
                    // The handler is run under catch_unwind, so this is a
                    // runtime shutdown or an aborted task.
                    Poll::Ready(Err(join_err)) => Poll::Ready(Err(BusError::handler(
                        topic,
                        Channel::Call,
                        anyhow::Error::new(join_err),
                    ))),
                }
            }
            PendingState::InPlace {
                topic,
                reply,
                metrics,
            } => match reply.as_mut().poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(value)) => Poll::Ready(Ok(Some(value))),
                Poll::Ready(Err(source)) => {
                    metrics.record_call_failure();
                    let err = BusError::handler(topic, Channel::Call, source);
                    error!(topic = %topic, error = %err, "Call handler failed");
                    Poll::Ready(Err(err))
                }
            },
        }
    }
}

impl fmt::Debug for PendingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            PendingState::Ready(_) => write!(f, "PendingResult::Ready"),
            PendingState::Scheduled { topic, .. } => {
                write!(f, "PendingResult::Scheduled({topic})")
            }
            PendingState::InPlace { topic, .. } => write!(f, "PendingResult::InPlace({topic})"),
        }
    }
}

/// Reply of [`Bus::invoke_sync`].
#[derive(Debug)]
pub enum SyncReply {
    /// An immediate handler's reply.
    Value(Payload),
    /// A deferred handler's reply. The handler has already been called; only
    /// the future it returned is left to await.
    Pending(PendingResult),
}

impl SyncReply {
    /// The reply value, or `None` when it is still pending.
    #[must_use]
    pub fn into_value(self) -> Option<Payload> {
        match self {
            Self::Value(value) => Some(value),
            Self::Pending(_) => None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

/// Values compare by content; a pending reply never equals anything.
impl PartialEq for SyncReply {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl Bus {
    /// Bind `handler` to `topic`.
    ///
    /// If the topic already has a handler this logs a warning and keeps the
    /// existing one.
    pub fn register(&self, topic: &str, handler: CallHandler) -> Result<&Self, BusError> {
        self.register_with(topic, handler, BoundContext::none())
    }

    pub fn register_with(
        &self,
        topic: &str,
        handler: CallHandler,
        context: BoundContext,
    ) -> Result<&Self, BusError> {
        match self.try_register_with(topic, handler, context) {
            Err(BusError::DuplicateRegistration { topic }) => {
                warn!(topic = %topic, "Call topic already registered, keeping existing handler");
                Ok(self)
            }
            other => other,
        }
    }

    /// Like [`register`](Self::register), but a taken slot is an error.
    pub fn try_register(&self, topic: &str, handler: CallHandler) -> Result<&Self, BusError> {
        self.try_register_with(topic, handler, BoundContext::none())
    }

    pub fn try_register_with(
        &self,
        topic: &str,
        handler: CallHandler,
        context: BoundContext,
    ) -> Result<&Self, BusError> {
        let topic = topic::validate(topic)?;
        let deferred = handler.is_deferred();
        let added = self
            .registry
            .write()
            .add_call(topic, CallRegistration { handler, context });

        if !added {
            self.metrics.record_duplicate_registration();
            return Err(BusError::DuplicateRegistration {
                topic: topic.to_string(),
            });
        }
        debug!(topic, deferred, "Call handler registered");
        Ok(self)
    }

    /// Schedule the topic's handler with `data`.
    ///
    /// Topic validation and the missing-runtime case fail here, synchronously.
    /// Handler failures only show up through the returned [`PendingResult`].
    pub fn invoke(&self, topic: &str, data: Payload) -> Result<PendingResult, BusError> {
        let topic = topic::validate(topic)?;
        let Some(registration) = self.registry.read().call(topic) else {
            trace!(topic, "Call to unregistered topic");
            self.metrics.record_unhandled_call();
            return Ok(PendingResult::resolved(None));
        };
        let runtime = Handle::try_current().map_err(|_| BusError::RuntimeUnavailable)?;

        self.metrics.record_deferred_call();
        let metrics = Arc::clone(&self.metrics);
        let owned_topic = topic.to_string();
        let (release, released) = oneshot::channel::<()>();
        let task = runtime.spawn(async move {
            // Sent on first poll, or dropped with the pending result.
            let _ = released.await;
            registration
                .handler
                .call(&registration.context, data)
                .await
                .map_err(|source| {
                    metrics.record_call_failure();
                    let err = BusError::handler(&owned_topic, Channel::Call, source);
                    error!(topic = %owned_topic, error = %err, "Call handler failed");
                    err
                })
        });
        Ok(PendingResult {
            state: PendingState::Scheduled {
                topic: topic.to_string(),
                task,
                release: Some(release),
            },
        })
    }

    /// Run the topic's handler now.
    ///
    /// An immediate handler's failure is logged and returned. A deferred
    /// handler is called here and its reply returned unawaited; a panic while
    /// it builds that reply fails here too, later failures surface when the
    /// [`SyncReply::Pending`] result is awaited.
    pub fn invoke_sync(&self, topic: &str, data: Payload) -> Result<Option<SyncReply>, BusError> {
        let topic = topic::validate(topic)?;
        let Some(registration) = self.registry.read().call(topic) else {
            trace!(topic, "Sync call to unregistered topic");
            self.metrics.record_unhandled_call();
            return Ok(None);
        };

        self.metrics.record_sync_call();
        match registration.handler.call_now(&registration.context, data) {
            Reply::Done(Ok(value)) => Ok(Some(SyncReply::Value(value))),
            Reply::Later(reply) => Ok(Some(SyncReply::Pending(PendingResult {
                state: PendingState::InPlace {
                    topic: topic.to_string(),
                    reply,
                    metrics: Arc::clone(&self.metrics),
                },
            }))),
            Reply::Done(Err(source)) => {
                self.metrics.record_call_failure();
                let err = BusError::handler(topic, Channel::Call, source);
                error!(topic, error = %err, "Call handler failed");
                Err(err)
            }
        }
    }

    /// Remove whatever handler is bound to `topic`.
    pub fn unregister(&self, topic: &str) -> Result<&Self, BusError> {
        self.unregister_matching(topic, None)
    }

    /// Remove the topic's handler only if it is `handler` with no receiver.
    pub fn unregister_handler(&self, topic: &str, handler: &CallHandler) -> Result<&Self, BusError> {
        self.unregister_matching(topic, Some((handler, &BoundContext::none())))
    }

    /// Remove the topic's handler only if both `handler` and `context` match.
    pub fn unregister_with(
        &self,
        topic: &str,
        handler: &CallHandler,
        context: &BoundContext,
    ) -> Result<&Self, BusError> {
        self.unregister_matching(topic, Some((handler, context)))
    }

    fn unregister_matching(
        &self,
        topic: &str,
        expected: Option<(&CallHandler, &BoundContext)>,
    ) -> Result<&Self, BusError> {
        let topic = topic::validate(topic)?;
        let removed = self.registry.write().remove_call(topic, expected);
        debug!(topic, removed, "Call handler unregistered");
        Ok(self)
    }
}
