//! Persisted error record types.

use serde::{Deserialize, Serialize};

use crate::fingerprint::FingerprintId;

/// Sanitized description of the failure itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    /// Message with the reporter identity replaced by the placeholder.
    pub message: String,
    pub file: String,
    pub line: u32,
    /// Trace with the reporter identity replaced by the placeholder.
    pub trace: String,
}

/// One distinct failure, keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub fingerprint: FingerprintId,
    /// Actor of the first capture; not updated by duplicates.
    pub reporter: String,
    /// Captures after the first.
    pub duplicates: u64,
    /// Display labels of the implicated components, registry order.
    pub involved_components: Vec<String>,
    /// `"; "`-joined labels of every component loaded at capture time.
    pub loaded_components: String,
    pub error: ErrorDetail,
    #[serde(default)]
    pub first_seen_ms: u64,
    #[serde(default)]
    pub last_seen_ms: u64,
}

impl ErrorRecord {
    /// Total captures folded into this record.
    #[must_use]
    pub fn occurrences(&self) -> u64 {
        self.duplicates.saturating_add(1)
    }

    /// Unit file name for this record.
    #[must_use]
    pub fn unit_name(&self) -> String {
        format!("{}.json", self.fingerprint)
    }

    pub(crate) fn summary(&self, index: usize) -> RecordSummary {
        RecordSummary {
            index,
            fingerprint: self.fingerprint.clone(),
            message: self.error.message.clone(),
            occurrences: self.occurrences(),
        }
    }
}

/// One line of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub index: usize,
    pub fingerprint: FingerprintId,
    pub message: String,
    pub occurrences: u64,
}
