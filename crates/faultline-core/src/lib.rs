//! faultline-core: in-process failure capture and deduplication
//!
//! Records unhandled failures raised while a long-running server handles
//! inbound client messages, folds repeated occurrences into one record per
//! fingerprint, attributes each failure to the loaded components named in its
//! trace, and persists the record set as JSON units.
//!
//! # Architecture
//!
//! ```text
//! host dispatch → CaptureInterceptor → Engine::record_failure
//!                                          ↓
//!                  fingerprint + attribution → ErrorStore → JSON units
//!                                                  ↑
//!                                              Operator
//! ```
//!
//! # Modules
//!
//! - `registry`: Component label snapshot rebuilt from the host
//! - `fingerprint`: Reporter sanitization and SHA-256 failure identity
//! - `attribution`: Trace-to-component resolution
//! - `capture`: `FailureReport`, `Failure` and the panic hook
//! - `record`: Persisted record types
//! - `store`: Deduplicating record table with disk persistence
//! - `interceptor`: Decorator around the host message handler
//! - `operator`: list/show/save/remove/cause command surface
//! - `engine`: Owner of store and registry; startup and shutdown
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod attribution;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod interceptor;
pub mod logging;
pub mod operator;
pub mod record;
pub mod registry;
pub mod store;

pub use capture::{Failure, FailureInfo, FailureReport};
pub use config::Config;
pub use engine::Engine;
pub use error::{ConfigError, Error, Result, StoreError};
pub use fingerprint::FingerprintId;
pub use interceptor::{
    Actor, CaptureInterceptor, Dispatched, HookDecision, InboundMessage, MessageHandler,
    ReceiveHook, Redispatch,
};
pub use operator::{CommandSender, Operator};
pub use record::{ErrorDetail, ErrorRecord, RecordSummary};
pub use registry::{ComponentLabel, ComponentSource, RegistrySnapshot};
pub use store::{CaptureOutcome, ErrorStore, LoadReport, SaveReport, StoreStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
