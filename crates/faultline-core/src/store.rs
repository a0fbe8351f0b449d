//! Error store: the authoritative table of deduplicated failure records.
//!
//! Records live in memory in first-capture order and are written out as one
//! pretty-printed JSON unit per fingerprint (`<fingerprint>.json`) on
//! [`ErrorStore::save_all`]. Archived records move into a subdirectory of
//! the data directory.
//!
//! ```text
//! record_capture ──► sanitize ──► fingerprint ──┬─► duplicate: count += 1
//!                                               └─► new: attribute + insert
//! ```
//!
//! A single mutex guards the table; every mutation, including the disk I/O
//! of `archive` and `save_all`, runs under it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::attribution;
use crate::capture::FailureInfo;
use crate::config::{CaptureConfig, StorageConfig};
use crate::error::StoreError;
use crate::fingerprint::{FingerprintId, fingerprint_sanitized, sanitize};
use crate::record::{ErrorDetail, ErrorRecord, RecordSummary};
use crate::registry::{self, ComponentSource, RegistrySnapshot};

/// Result of feeding one capture into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// First capture of this fingerprint.
    Inserted { fingerprint: FingerprintId },
    /// Already known; `duplicates` is the new count.
    Duplicate {
        fingerprint: FingerprintId,
        duplicates: u64,
    },
}

impl CaptureOutcome {
    #[must_use]
    pub fn fingerprint(&self) -> &FingerprintId {
        match self {
            Self::Inserted { fingerprint } | Self::Duplicate { fingerprint, .. } => fingerprint,
        }
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Outcome of [`ErrorStore::save_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    pub written: usize,
    pub failed: usize,
}

/// Outcome of [`ErrorStore::load_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub loaded: usize,
    /// Units that could not be read or parsed, or repeated a known fingerprint.
    pub skipped: usize,
}

/// Aggregate counters over the active set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub records: usize,
    /// Sum of occurrences (`duplicates + 1`) across records.
    pub total_occurrences: u64,
}

#[derive(Debug, Default)]
struct Table {
    records: Vec<ErrorRecord>,
    by_fingerprint: HashMap<FingerprintId, usize>,
}

impl Table {
    fn push(&mut self, record: ErrorRecord) {
        self.by_fingerprint
            .insert(record.fingerprint.clone(), self.records.len());
        self.records.push(record);
    }

    fn remove(&mut self, index: usize) -> ErrorRecord {
        let record = self.records.remove(index);
        self.reindex();
        record
    }

    fn reindex(&mut self) {
        self.by_fingerprint = self
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.fingerprint.clone(), idx))
            .collect();
    }
}

/// In-memory record table backed by a directory of JSON units.
#[derive(Debug)]
pub struct ErrorStore {
    data_dir: PathBuf,
    archive_dir: PathBuf,
    placeholder: String,
    self_component: String,
    table: Mutex<Table>,
}

impl ErrorStore {
    #[must_use]
    pub fn new(storage: &StorageConfig, capture: &CaptureConfig) -> Self {
        Self {
            data_dir: storage.data_dir.clone(),
            archive_dir: storage.archive_path(),
            placeholder: capture.placeholder.clone(),
            self_component: capture.self_component.clone(),
            table: Mutex::new(Table::default()),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Create the data and archive directories if missing.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [&self.data_dir, &self.archive_dir] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unit_path(&self, fingerprint: &FingerprintId) -> PathBuf {
        self.data_dir.join(format!("{fingerprint}.json"))
    }

    /// Fold one failure into the table.
    ///
    /// The reporter identity is replaced by the placeholder in the stored
    /// message and trace. Attribution runs on the raw trace against
    /// `snapshot`, once, when the record is first created. `loaded` is asked
    /// for the live component list at that moment, so a record captured
    /// before the first registry refresh still names what was running.
    pub fn record_capture(
        &self,
        reporter: &str,
        failure: &FailureInfo,
        snapshot: &RegistrySnapshot,
        loaded: &dyn ComponentSource,
    ) -> CaptureOutcome {
        let message = sanitize(&failure.message, reporter, &self.placeholder);
        let fingerprint = fingerprint_sanitized(&failure.kind, &message, &failure.file, failure.line);
        let now = epoch_ms();

        let mut table = self.lock();
        if let Some(&idx) = table.by_fingerprint.get(&fingerprint) {
            let record = &mut table.records[idx];
            record.duplicates = record.duplicates.saturating_add(1);
            record.last_seen_ms = now;
            let duplicates = record.duplicates;
            debug!(
                fingerprint = fingerprint.short(),
                reporter = %reporter,
                duplicates,
                "Duplicate failure captured"
            );
            return CaptureOutcome::Duplicate {
                fingerprint,
                duplicates,
            };
        }

        let involved = attribution::resolve(&failure.trace, snapshot, &self.self_component)
            .iter()
            .map(ToString::to_string)
            .collect();
        let record = ErrorRecord {
            fingerprint: fingerprint.clone(),
            reporter: reporter.to_string(),
            duplicates: 0,
            involved_components: involved,
            loaded_components: registry::describe(&loaded.loaded_components()),
            error: ErrorDetail {
                kind: failure.kind.clone(),
                message,
                file: failure.file.clone(),
                line: failure.line,
                trace: sanitize(&failure.trace, reporter, &self.placeholder),
            },
            first_seen_ms: now,
            last_seen_ms: now,
        };
        info!(
            fingerprint = fingerprint.short(),
            reporter = %reporter,
            kind = %record.error.kind,
            file = %record.error.file,
            line = record.error.line,
            involved = record.involved_components.len(),
            "New failure captured"
        );
        table.push(record);
        CaptureOutcome::Inserted { fingerprint }
    }

    /// Summaries in first-capture order. Indices are valid until the next
    /// archive.
    #[must_use]
    pub fn list(&self) -> Vec<RecordSummary> {
        self.lock()
            .records
            .iter()
            .enumerate()
            .map(|(idx, record)| record.summary(idx))
            .collect()
    }

    pub fn show(&self, index: usize) -> Result<ErrorRecord, StoreError> {
        self.lock()
            .records
            .get(index)
            .cloned()
            .ok_or(StoreError::NotFound { index })
    }

    #[must_use]
    pub fn get(&self, fingerprint: &FingerprintId) -> Option<ErrorRecord> {
        let table = self.lock();
        table
            .by_fingerprint
            .get(fingerprint)
            .map(|&idx| table.records[idx].clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let table = self.lock();
        StoreStats {
            records: table.records.len(),
            total_occurrences: table.records.iter().map(ErrorRecord::occurrences).sum(),
        }
    }

    /// Move the record at `index` out of the active set.
    ///
    /// The in-memory record is first written to its unit, so counts taken
    /// since the last save are kept; the unit is then copied into the
    /// archive directory and deleted. On I/O failure the record stays
    /// active.
    pub fn archive(&self, index: usize) -> Result<ErrorRecord, StoreError> {
        let mut table = self.lock();
        let record = table
            .records
            .get(index)
            .ok_or(StoreError::NotFound { index })?;

        for dir in [&self.data_dir, &self.archive_dir] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        let unit = self.unit_path(&record.fingerprint);
        let archived = self.archive_dir.join(record.unit_name());
        write_unit(&unit, record)?;
        fs::copy(&unit, &archived).map_err(|e| StoreError::io(&archived, e))?;
        fs::remove_file(&unit).map_err(|e| StoreError::io(&unit, e))?;

        let record = table.remove(index);
        info!(
            fingerprint = record.fingerprint.short(),
            index,
            path = %archived.display(),
            "Record archived"
        );
        Ok(record)
    }

    /// Write every active record to its unit, overwriting earlier saves.
    ///
    /// Individual write failures are logged and counted, never returned.
    pub fn save_all(&self) -> SaveReport {
        let table = self.lock();
        let mut report = SaveReport::default();

        if let Err(err) = fs::create_dir_all(&self.data_dir) {
            warn!(path = %self.data_dir.display(), error = %err, "Cannot create data directory");
            report.failed = table.records.len();
            return report;
        }

        for record in &table.records {
            let path = self.unit_path(&record.fingerprint);
            match write_unit(&path, record) {
                Ok(()) => report.written += 1,
                Err(err) => {
                    warn!(fingerprint = record.fingerprint.short(), error = %err, "Failed to save record");
                    report.failed += 1;
                }
            }
        }

        info!(written = report.written, failed = report.failed, "Records saved");
        report
    }

    /// Populate the table from every unit in the data directory.
    ///
    /// A missing directory loads nothing. Units that cannot be parsed, or
    /// whose file name is not `<fingerprint>.json`, are skipped with a
    /// warning. Loaded records are ordered by first capture.
    pub fn load_all(&self) -> Result<LoadReport, StoreError> {
        let mut report = LoadReport::default();
        if !self.data_dir.is_dir() {
            debug!(path = %self.data_dir.display(), "No data directory yet");
            return Ok(report);
        }

        let entries = fs::read_dir(&self.data_dir).map_err(|e| StoreError::io(&self.data_dir, e))?;
        let mut loaded = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    warn!(path = %self.data_dir.display(), error = %err, "Unreadable directory entry");
                    report.skipped += 1;
                    continue;
                }
            };
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_unit(&path) {
                Ok(record) if named_after(&path, &record.fingerprint) => loaded.push(record),
                Ok(record) => {
                    warn!(
                        path = %path.display(),
                        fingerprint = record.fingerprint.short(),
                        "Unit name does not match its fingerprint, skipping"
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(error = %err, "Skipping record unit");
                    report.skipped += 1;
                }
            }
        }

        loaded.sort_by(|a, b| {
            a.first_seen_ms
                .cmp(&b.first_seen_ms)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });

        let mut table = self.lock();
        for record in loaded {
            if table.by_fingerprint.contains_key(&record.fingerprint) {
                debug!(fingerprint = record.fingerprint.short(), "Already loaded");
                report.skipped += 1;
                continue;
            }
            table.push(record);
            report.loaded += 1;
        }

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            path = %self.data_dir.display(),
            "Records loaded"
        );
        Ok(report)
    }
}

fn write_unit(path: &Path, record: &ErrorRecord) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(record).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| StoreError::io(path, e))
}

/// Whether `path` is `<fingerprint>.json`.
fn named_after(path: &Path, fingerprint: &FingerprintId) -> bool {
    path.file_stem().is_some_and(|stem| stem == fingerprint.as_str())
}

fn read_unit(path: &Path) -> Result<ErrorRecord, StoreError> {
    let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}
