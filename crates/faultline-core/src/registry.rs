//! Component registry snapshot.
//!
//! A point-in-time copy of the host's loaded components, rebuilt wholesale
//! (never patched) from a [`ComponentSource`]. Readers grab an
//! `Arc<RegistrySnapshot>` and keep using it even if a refresh swaps in a
//! newer one; a component reloaded after the last refresh simply stays
//! stale.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Immutable description of one loaded component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLabel {
    /// Textual identifier searched for in traces (e.g. a module path prefix).
    pub identifier: String,
    pub name: String,
    pub version: String,
    pub authors: Vec<String>,
}

impl ComponentLabel {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        authors: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            version: version.into(),
            authors: authors.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ComponentLabel {
    /// `name_vversion by author, author`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_v{} by {}",
            self.name,
            self.version,
            self.authors.join(", ")
        )
    }
}

/// Host-side list of currently loaded components.
pub trait ComponentSource: Send + Sync {
    fn loaded_components(&self) -> Vec<ComponentLabel>;
}

impl ComponentSource for Vec<ComponentLabel> {
    fn loaded_components(&self) -> Vec<ComponentLabel> {
        self.clone()
    }
}

/// `"; "`-joined display form of every label.
#[must_use]
pub fn describe(labels: &[ComponentLabel]) -> String {
    labels
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Labels plus a multi-pattern matcher over their identifiers.
pub struct RegistrySnapshot {
    labels: Vec<ComponentLabel>,
    /// Pattern id → index into `labels`. Empty identifiers are not patterns.
    pattern_owner: Vec<usize>,
    matcher: Option<AhoCorasick>,
}

impl RegistrySnapshot {
    #[must_use]
    pub fn new(labels: Vec<ComponentLabel>) -> Self {
        let mut patterns = Vec::with_capacity(labels.len());
        let mut pattern_owner = Vec::with_capacity(labels.len());
        for (idx, label) in labels.iter().enumerate() {
            if !label.identifier.is_empty() {
                patterns.push(label.identifier.as_str());
                pattern_owner.push(idx);
            }
        }

        let matcher = if patterns.is_empty() {
            None
        } else {
            match AhoCorasick::new(&patterns) {
                Ok(ac) => Some(ac),
                Err(err) => {
                    warn!(error = %err, "Failed to build component matcher; falling back to substring scan");
                    None
                }
            }
        };

        Self {
            labels,
            pattern_owner,
            matcher,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn labels(&self) -> &[ComponentLabel] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// One flag per label: does its identifier occur in `text`?
    pub(crate) fn occurrences(&self, text: &str) -> Vec<bool> {
        let mut hits = vec![false; self.labels.len()];
        match &self.matcher {
            Some(ac) => {
                for m in ac.find_overlapping_iter(text) {
                    hits[self.pattern_owner[m.pattern().as_usize()]] = true;
                }
            }
            None => {
                for &idx in &self.pattern_owner {
                    hits[idx] = text.contains(self.labels[idx].identifier.as_str());
                }
            }
        }
        hits
    }
}

impl ComponentSource for RegistrySnapshot {
    fn loaded_components(&self) -> Vec<ComponentLabel> {
        self.labels.clone()
    }
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

/// Holder of the current snapshot.
#[derive(Debug)]
pub struct ComponentRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    /// Current snapshot; cheap `Arc` clone.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Rebuild the snapshot from `source`, replacing the previous one.
    pub fn refresh(&self, source: &dyn ComponentSource) -> usize {
        let snapshot = Arc::new(RegistrySnapshot::new(source.loaded_components()));
        let count = snapshot.len();
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
        debug!(components = count, "Component registry rebuilt");
        count
    }

    /// Rebuild once after `delay` on the current tokio runtime.
    ///
    /// The host may still be loading components at startup, so the rebuild
    /// is deferred rather than done inline.
    pub fn schedule_refresh(
        self: &Arc<Self>,
        source: Arc<dyn ComponentSource>,
        delay: Duration,
    ) -> Result<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("registry refresh needs a tokio runtime: {e}")))?;
        let registry = Arc::clone(self);
        Ok(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let count = registry.refresh(source.as_ref());
            info!(components = count, "Component registry snapshot taken");
        }))
    }
}
