//! Capture interceptor around the host's per-message dispatch.
//!
//! [`CaptureInterceptor`] decorates a host [`MessageHandler`]. Every inbound
//! message for a connected actor first passes the host's [`ReceiveHook`],
//! which may cancel handling; the handler then runs, and whatever failure
//! escapes it (an `Err` or a panic) is recorded against the actor and
//! re-raised unchanged.
//!
//! Batch messages are not recorded at the container level. A batch handler
//! unpacks its contents and sends each one back through the
//! [`Redispatch`] handle it was given, so a failure is recorded exactly once,
//! at the innermost message.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::capture::{self, FailureReport};
use crate::engine::Engine;

/// A connected client whose messages are dispatched.
pub trait Actor {
    /// Identity substituted out of recorded messages (e.g. a player name).
    fn identity(&self) -> &str;
    fn is_connected(&self) -> bool;
}

/// One decoded inbound message.
pub trait InboundMessage {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Containers whose contents are re-dispatched individually.
    fn is_batch(&self) -> bool {
        false
    }
}

/// Verdict of the pre-handling hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Cancel,
}

/// Host's cancellable receive event, fired before the handler runs.
pub trait ReceiveHook<A, M> {
    fn before_handle(&self, actor: &A, message: &M) -> HookDecision;
}

/// Hook that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHook;

impl<A, M> ReceiveHook<A, M> for NoHook {
    fn before_handle(&self, _actor: &A, _message: &M) -> HookDecision {
        HookDecision::Continue
    }
}

/// What happened to one dispatched message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Handled,
    /// The receive hook cancelled handling.
    Cancelled,
    /// The actor was gone; nothing ran.
    Disconnected,
}

/// Route a message back through the full interception path.
pub trait Redispatch<A, M, E> {
    fn redispatch(&self, actor: &A, message: &M) -> Result<Dispatched, E>;
}

/// Host message handler being decorated.
pub trait MessageHandler {
    type Actor: Actor;
    type Message: InboundMessage;
    type Error: FailureReport;

    /// Handle one message. Batch handlers re-dispatch their contents via
    /// `dispatch` instead of handling them inline.
    fn handle(
        &self,
        actor: &Self::Actor,
        message: &Self::Message,
        dispatch: &dyn Redispatch<Self::Actor, Self::Message, Self::Error>,
    ) -> Result<(), Self::Error>;
}

/// Decorator that records failures escaping a [`MessageHandler`].
pub struct CaptureInterceptor<H, K = NoHook> {
    engine: Arc<Engine>,
    handler: H,
    hook: K,
}

impl<H: MessageHandler> CaptureInterceptor<H, NoHook> {
    pub fn new(engine: Arc<Engine>, handler: H) -> Self {
        Self::with_hook(engine, handler, NoHook)
    }
}

impl<H, K> CaptureInterceptor<H, K>
where
    H: MessageHandler,
    K: ReceiveHook<H::Actor, H::Message>,
{
    pub fn with_hook(engine: Arc<Engine>, handler: H, hook: K) -> Self {
        capture::install_panic_hook();
        Self {
            engine,
            handler,
            hook,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Dispatch one message for `actor`.
    ///
    /// Returns the handler's own error unchanged, and resumes a handler
    /// panic with its original payload, after recording either.
    pub fn dispatch(
        &self,
        actor: &H::Actor,
        message: &H::Message,
    ) -> Result<Dispatched, H::Error> {
        if !actor.is_connected() {
            trace!(message = message.name(), "Actor disconnected; message dropped");
            return Ok(Dispatched::Disconnected);
        }

        if self.hook.before_handle(actor, message) == HookDecision::Cancel {
            debug!(message = message.name(), "Receive hook cancelled handling");
            return Ok(Dispatched::Cancelled);
        }

        // Discard a panic stashed by code outside any dispatch.
        let _ = capture::take_last_panic();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.handle(actor, message, self)
        }));

        match outcome {
            Ok(Ok(())) => Ok(Dispatched::Handled),
            Ok(Err(err)) => {
                if !message.is_batch() {
                    self.engine.record_failure(actor.identity(), &err);
                }
                Err(err)
            }
            Err(payload) => {
                if message.is_batch() {
                    let _ = capture::take_last_panic();
                } else {
                    let info = capture::panic_failure(payload.as_ref());
                    self.engine.record_failure(actor.identity(), &info);
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<H, K> Redispatch<H::Actor, H::Message, H::Error> for CaptureInterceptor<H, K>
where
    H: MessageHandler,
    K: ReceiveHook<H::Actor, H::Message>,
{
    fn redispatch(&self, actor: &H::Actor, message: &H::Message) -> Result<Dispatched, H::Error> {
        self.dispatch(actor, message)
    }
}
