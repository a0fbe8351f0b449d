//! Operator command surface.
//!
//! `faultline <list|show|save|remove|cause>`, executed on behalf of a
//! [`CommandSender`]. Problems (missing permission, bad usage, unknown
//! index) are reported to the sender as messages. The only `Err` this module
//! produces is the deliberate test failure from `cause`, which the host
//! returns from its handler so the interceptor records it like any other.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat};
use tracing::{info, warn};

use crate::capture::Failure;
use crate::config::COMMAND_PERMISSION;
use crate::engine::Engine;
use crate::error::StoreError;

pub const USAGE: &str = "Usage: /faultline <list|show|save|remove|cause>";
pub const SHOW_USAGE: &str = "Usage: /faultline show <index>";
pub const REMOVE_USAGE: &str = "Usage: /faultline remove <index>";
pub const NO_PERMISSION: &str = "You do not have permission to use this command.";
pub const NO_ERRORS: &str = "Congrats! There are no errors logged.";
pub const NOT_INTERACTIVE: &str = "This failure must be caused by an interactive actor.";

/// Failure kind raised by `cause`.
pub const TEST_FAILURE_KIND: &str = "OperatorTestFailure";

const LIST_MESSAGE_CHARS: usize = 50;

/// Whoever issued the command: a console, a player, a test.
pub trait CommandSender {
    fn send_message(&self, message: &str);

    /// Whether this sender is an actor that can be the subject of a failure.
    fn is_interactive(&self) -> bool;

    fn has_permission(&self, permission: &str) -> bool;
}

/// Command executor bound to one engine.
#[derive(Debug, Clone)]
pub struct Operator {
    engine: Arc<Engine>,
}

impl Operator {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Run one command line (already tokenized).
    pub fn execute(&self, sender: &dyn CommandSender, args: &[&str]) -> Result<(), Failure> {
        if !sender.has_permission(COMMAND_PERMISSION) {
            sender.send_message(NO_PERMISSION);
            return Ok(());
        }

        match args.first().copied() {
            Some("list") => self.list(sender),
            Some("show") => match parse_index(args) {
                Some(index) => self.show(sender, index),
                None => sender.send_message(SHOW_USAGE),
            },
            Some("save") => self.save(sender),
            Some("remove") => match parse_index(args) {
                Some(index) => self.remove(sender, index),
                None => sender.send_message(REMOVE_USAGE),
            },
            Some("cause") => return cause(sender),
            _ => sender.send_message(USAGE),
        }
        Ok(())
    }

    fn list(&self, sender: &dyn CommandSender) {
        let summaries = self.engine.store().list();
        if summaries.is_empty() {
            sender.send_message(NO_ERRORS);
            return;
        }
        let stats = self.engine.store().stats();
        sender.send_message(&format!(
            "{} error(s), {} total occurrences:",
            stats.records, stats.total_occurrences
        ));
        for summary in summaries {
            sender.send_message(&format!(
                "{}: {} - {} occurrences",
                summary.index,
                truncate_chars(&summary.message, LIST_MESSAGE_CHARS),
                summary.occurrences
            ));
        }
    }

    fn show(&self, sender: &dyn CommandSender, index: usize) {
        let record = match self.engine.store().show(index) {
            Ok(record) => record,
            Err(err) => {
                sender.send_message(&err.to_string());
                return;
            }
        };
        let involved = if record.involved_components.is_empty() {
            "none".to_string()
        } else {
            record.involved_components.join("; ")
        };
        let lines = [
            format!("Fingerprint: {}", record.fingerprint),
            format!("Reporter: {}", record.reporter),
            format!("Type: {}", record.error.kind),
            format!("Message: {}", record.error.message),
            format!("File: {}", record.error.file),
            format!("Line: {}", record.error.line),
            format!("Involved components: {involved}"),
            format!("Loaded components: {}", record.loaded_components),
            format!("Duplicates: {}", record.duplicates),
            format!("First seen: {}", format_epoch_ms(record.first_seen_ms)),
            format!("Last seen: {}", format_epoch_ms(record.last_seen_ms)),
            format!("Trace:\n{}", record.error.trace),
        ];
        for line in &lines {
            sender.send_message(line);
        }
    }

    fn save(&self, sender: &dyn CommandSender) {
        let report = self.engine.store().save_all();
        if report.failed == 0 {
            sender.send_message(&format!("Saved {} error(s).", report.written));
        } else {
            sender.send_message(&format!(
                "Saved {} error(s); {} failed, see the log.",
                report.written, report.failed
            ));
        }
    }

    fn remove(&self, sender: &dyn CommandSender, index: usize) {
        match self.engine.store().archive(index) {
            Ok(record) => {
                info!(index, fingerprint = record.fingerprint.short(), "Record removed by operator");
                sender.send_message(&format!("Error {index} archived."));
            }
            Err(err @ StoreError::NotFound { .. }) => sender.send_message(&err.to_string()),
            Err(err) => {
                warn!(index, error = %err, "Archive failed");
                sender.send_message(&format!(
                    "Could not archive error {index}: {err}. {}",
                    err.remediation().summary
                ));
            }
        }
    }
}

fn cause(sender: &dyn CommandSender) -> Result<(), Failure> {
    if !sender.is_interactive() {
        sender.send_message(NOT_INTERACTIVE);
        return Ok(());
    }
    Err(Failure::new(TEST_FAILURE_KIND, "Test failure caused by faultline"))
}

fn parse_index(args: &[&str]) -> Option<usize> {
    args.get(1).and_then(|raw| raw.trim().parse().ok())
}

fn format_epoch_ms(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map_or_else(|| ms.to_string(), |at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn truncate_chars(text: &str, max: usize) -> &str {
    text.char_indices().nth(max).map_or(text, |(end, _)| &text[..end])
}
