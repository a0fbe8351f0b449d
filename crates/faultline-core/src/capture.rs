//! Failure descriptions handed to the capture pipeline.
//!
//! Host failures reach the store in two ways: as `Err` values implementing
//! [`FailureReport`], or as panics unwinding out of a message handler. For
//! the latter, [`install_panic_hook`] chains a hook that stashes the panic's
//! message, location and backtrace in a thread-local so the interceptor can
//! record it after `catch_unwind` returns.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, Location};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Classification used for panics.
pub const PANIC_KIND: &str = "panic";

/// Everything the store needs from one failure, before sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Failure classification (error type name, `panic`, ...).
    pub kind: String,
    pub message: String,
    pub file: String,
    pub line: u32,
    /// Formatted stack trace, treated as opaque text.
    pub trace: String,
}

/// Implemented by host failure types the interceptor can record.
pub trait FailureReport {
    fn failure_info(&self) -> FailureInfo;
}

impl FailureReport for FailureInfo {
    fn failure_info(&self) -> FailureInfo {
        self.clone()
    }
}

/// A ready-made failure value that remembers where it was raised.
#[derive(Debug, Clone)]
pub struct Failure {
    kind: String,
    message: String,
    location: &'static Location<'static>,
    trace: String,
}

impl Failure {
    #[track_caller]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            location: Location::caller(),
            trace: Backtrace::force_capture().to_string(),
        }
    }

    /// Replace the captured backtrace, e.g. with a host-formatted trace.
    #[must_use]
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

impl FailureReport for Failure {
    fn failure_info(&self) -> FailureInfo {
        FailureInfo {
            kind: self.kind.clone(),
            message: self.message.clone(),
            file: self.location.file().to_string(),
            line: self.location.line(),
            trace: self.trace.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Panic hook
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_PANIC: RefCell<Option<FailureInfo>> = const { RefCell::new(None) };
}

static HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Chain a panic hook that remembers the last panic per thread.
///
/// Idempotent. The previously installed hook still runs afterwards, so the
/// host's panic output is unchanged.
pub fn install_panic_hook() {
    HOOK_INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let (file, line) = info
                .location()
                .map_or_else(|| ("<unknown>".to_string(), 0), |loc| {
                    (loc.file().to_string(), loc.line())
                });
            let captured = FailureInfo {
                kind: PANIC_KIND.to_string(),
                message: payload_message(info.payload()),
                file,
                line,
                trace,
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(captured));
            previous(info);
        }));
    });
}

/// Take (and clear) the panic stashed for the current thread.
pub fn take_last_panic() -> Option<FailureInfo> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Describe a caught panic payload, preferring what the hook stashed.
pub(crate) fn panic_failure(payload: &(dyn Any + Send)) -> FailureInfo {
    take_last_panic().unwrap_or_else(|| FailureInfo {
        kind: PANIC_KIND.to_string(),
        message: payload_message(payload),
        file: "<unknown>".to_string(),
        line: 0,
        trace: String::new(),
    })
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
