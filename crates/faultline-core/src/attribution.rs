//! Attribution of a failure to loaded components.
//!
//! A component is implicated when its identifier occurs anywhere in the raw
//! trace text. The capture system's own component is never implicated, since
//! its interception frames show up in every captured trace.

use crate::registry::{ComponentLabel, RegistrySnapshot};

/// Components whose identifiers occur in `trace`, in registry order.
///
/// `trace` must be the unsanitized text: substituting the reporter identity
/// first could erase or fabricate identifier matches. An empty result is a
/// normal outcome.
#[must_use]
pub fn resolve(
    trace: &str,
    snapshot: &RegistrySnapshot,
    self_component: &str,
) -> Vec<ComponentLabel> {
    snapshot
        .occurrences(trace)
        .into_iter()
        .zip(snapshot.labels())
        .filter(|(hit, label)| *hit && !is_self(label, self_component))
        .map(|(_, label)| label.clone())
        .collect()
}

fn is_self(label: &ComponentLabel, self_component: &str) -> bool {
    label.name == self_component
}
