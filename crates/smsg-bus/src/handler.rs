//! # Handlers and Bound Receivers
//!
//! Handlers are stored as `Arc`s so that the caller can keep a clone and use
//! it later as the removal key: two handlers are "the same" when they share
//! the allocation, never by comparing closure bodies.
//!
//! A [`BoundContext`] is the optional receiver a handler is invoked against.
//! It takes part in identity too, so one handler subscribed against two
//! receivers yields two independently removable entries.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::Payload;

/// Result type user handlers return. Any error type converts into it.
pub type HandlerResult<T = ()> = anyhow::Result<T>;

/// Optional receiver a handler is bound to.
#[derive(Clone, Default)]
pub struct BoundContext(Option<Arc<dyn Any + Send + Sync>>);

impl BoundContext {
    /// No receiver.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Bind to `receiver`. Identity follows the `Arc`, not the value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(receiver: Arc<T>) -> Self {
        Self(Some(receiver))
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The receiver as a `T`, if one is bound and it has that type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone()?.downcast::<T>().ok()
    }

    /// Pointer identity; an absent receiver only matches another absent one.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl fmt::Debug for BoundContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => write!(f, "BoundContext(none)"),
            Some(receiver) => write!(f, "BoundContext({:p})", Arc::as_ptr(receiver)),
        }
    }
}

type BroadcastFn = dyn Fn(&BoundContext, &Payload) -> HandlerResult + Send + Sync;

/// A broadcast subscriber callback. Its return value is never seen by the
/// publisher; an `Err` is only logged.
#[derive(Clone)]
pub struct BroadcastHandler {
    f: Arc<BroadcastFn>,
}

impl BroadcastHandler {
    /// Handler that ignores any bound receiver.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |_: &BoundContext, data: &Payload| f(data)),
        }
    }

    /// Handler invoked against a receiver of type `T`.
    ///
    /// Fails (and is reported like any other handler failure) when subscribed
    /// without a receiver of that type.
    pub fn bound<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(move |context: &BoundContext, data: &Payload| -> HandlerResult {
                let receiver = context
                    .downcast::<T>()
                    .ok_or_else(missing_receiver::<T>)?;
                f(&receiver, data)
            }),
        }
    }

    /// Handler that sees the raw [`BoundContext`].
    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(&BoundContext, &Payload) -> HandlerResult + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        ptr::addr_eq(Arc::as_ptr(&self.f), Arc::as_ptr(&other.f))
    }

    /// Run the handler, turning a panic into an error.
    pub(crate) fn call(&self, context: &BoundContext, data: &Payload) -> HandlerResult {
        guarded(|| (self.f)(context, data))
    }
}

impl fmt::Debug for BroadcastHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BroadcastHandler({:p})", Arc::as_ptr(&self.f))
    }
}

type ImmediateFn = dyn Fn(&BoundContext, Payload) -> HandlerResult<Payload> + Send + Sync;
type DeferredFn =
    dyn Fn(&BoundContext, Payload) -> BoxFuture<'static, HandlerResult<Payload>> + Send + Sync;

#[derive(Clone)]
enum CallFn {
    Immediate(Arc<ImmediateFn>),
    Deferred(Arc<DeferredFn>),
}

/// The single responder bound to a call topic.
///
/// Immediate handlers compute their reply inline; deferred handlers hand back
/// a future, which [`Bus::invoke`](crate::Bus::invoke) awaits and
/// [`Bus::invoke_sync`](crate::Bus::invoke_sync) returns unawaited.
#[derive(Clone)]
pub struct CallHandler {
    f: CallFn,
}

impl CallHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Payload) -> HandlerResult<Payload> + Send + Sync + 'static,
    {
        Self {
            f: CallFn::Immediate(Arc::new(move |_: &BoundContext, data: Payload| f(data))),
        }
    }

    pub fn bound<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, Payload) -> HandlerResult<Payload> + Send + Sync + 'static,
    {
        Self {
            f: CallFn::Immediate(Arc::new(
                move |context: &BoundContext, data: Payload| -> HandlerResult<Payload> {
                    let receiver = context
                        .downcast::<T>()
                        .ok_or_else(missing_receiver::<T>)?;
                    f(&receiver, data)
                },
            )),
        }
    }

    /// Handler whose reply arrives later.
    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Payload>> + Send + 'static,
    {
        Self {
            f: CallFn::Deferred(Arc::new(move |_: &BoundContext, data: Payload| f(data).boxed())),
        }
    }

    /// Deferred handler invoked against a receiver of type `T`.
    pub fn deferred_bound<T, F, Fut>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Arc<T>, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Payload>> + Send + 'static,
    {
        Self {
            f: CallFn::Deferred(Arc::new(move |context: &BoundContext, data: Payload| {
                match context.downcast::<T>() {
                    Some(receiver) => f(receiver, data).boxed(),
                    None => future::ready(Err(missing_receiver::<T>())).boxed(),
                }
            })),
        }
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self.f, CallFn::Deferred(_))
    }

    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.f, &other.f) {
            (CallFn::Immediate(a), CallFn::Immediate(b)) => {
                ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (CallFn::Deferred(a), CallFn::Deferred(b)) => {
                ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Run the handler in the caller's turn.
    ///
    /// An immediate handler's result is returned as is. A deferred handler is
    /// called too, and its unawaited reply comes back guarded against panics.
    pub(crate) fn call_now(&self, context: &BoundContext, data: Payload) -> Reply {
        match &self.f {
            CallFn::Immediate(f) => Reply::Done(guarded(|| f(context, data))),
            CallFn::Deferred(f) => match guarded(|| Ok(f(context, data))) {
                Ok(reply) => Reply::Later(
                    AssertUnwindSafe(reply)
                        .catch_unwind()
                        .map(|outcome| outcome.unwrap_or_else(|panic| Err(panic_error(panic))))
                        .boxed(),
                ),
                Err(err) => Reply::Done(Err(err)),
            },
        }
    }

    /// Run the handler to completion, awaiting a deferred reply.
    pub(crate) async fn call(
        &self,
        context: &BoundContext,
        data: Payload,
    ) -> HandlerResult<Payload> {
        match self.call_now(context, data) {
            Reply::Done(result) => result,
            Reply::Later(reply) => reply.await,
        }
    }
}

/// Outcome of [`CallHandler::call_now`].
pub(crate) enum Reply {
    /// Immediate result, or a failure while starting a deferred handler
    Done(HandlerResult<Payload>),
    /// Deferred handler's reply, still to be awaited
    Later(BoxFuture<'static, HandlerResult<Payload>>),
}

impl fmt::Debug for CallHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.f {
            CallFn::Immediate(h) => write!(f, "CallHandler::Immediate({:p})", Arc::as_ptr(h)),
            CallFn::Deferred(h) => write!(f, "CallHandler::Deferred({:p})", Arc::as_ptr(h)),
        }
    }
}

fn guarded<T>(f: impl FnOnce() -> HandlerResult<T>) -> HandlerResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| Err(panic_error(panic)))
}

fn panic_error(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string());
    anyhow::anyhow!(message)
}

fn missing_receiver<T>() -> anyhow::Error {
    anyhow::anyhow!("handler expects a bound receiver of type {}", type_name::<T>())
}
