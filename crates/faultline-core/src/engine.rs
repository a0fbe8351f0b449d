//! Engine: the explicitly constructed owner of the store and registry.
//!
//! One `Arc<Engine>` is created at host startup and handed to every
//! [`CaptureInterceptor`](crate::interceptor::CaptureInterceptor) and
//! [`Operator`](crate::operator::Operator). Persisted records are loaded
//! inside [`Engine::start`], so no capture can be accepted before loading
//! finishes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{self, FailureReport};
use crate::config::Config;
use crate::registry::{ComponentRegistry, ComponentSource, RegistrySnapshot};
use crate::store::{CaptureOutcome, ErrorStore, SaveReport};
use crate::Result;

pub struct Engine {
    config: Config,
    store: ErrorStore,
    registry: Arc<ComponentRegistry>,
    source: Arc<dyn ComponentSource>,
}

impl Engine {
    /// Validate `config`, create the storage layout and load every unit.
    pub fn start(config: Config, source: Arc<dyn ComponentSource>) -> Result<Arc<Self>> {
        config.validate()?;
        let store = ErrorStore::new(&config.storage, &config.capture);
        store.ensure_layout()?;
        let report = store.load_all()?;
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "Some record units could not be loaded");
        }
        capture::install_panic_hook();

        info!(
            data_dir = %store.data_dir().display(),
            records = report.loaded,
            "Engine started"
        );
        Ok(Arc::new(Self {
            config,
            store,
            registry: Arc::new(ComponentRegistry::new()),
            source,
        }))
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &ErrorStore {
        &self.store
    }

    /// Current component snapshot.
    #[must_use]
    pub fn registry(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    /// Spawn the one-shot deferred registry rebuild.
    pub fn schedule_registry_refresh(&self) -> Result<JoinHandle<()>> {
        self.registry.schedule_refresh(
            Arc::clone(&self.source),
            self.config.capture.registry_refresh_delay(),
        )
    }

    /// Rebuild the registry snapshot now.
    pub fn refresh_registry(&self) -> usize {
        self.registry.refresh(self.source.as_ref())
    }

    /// Capture entry point; never fails.
    pub fn record_failure(&self, reporter: &str, failure: &dyn FailureReport) -> CaptureOutcome {
        let info = failure.failure_info();
        self.store.record_capture(
            reporter,
            &info,
            &self.registry.snapshot(),
            self.source.as_ref(),
        )
    }

    /// Persist the active set.
    pub fn shutdown(&self) -> SaveReport {
        let report = self.store.save_all();
        info!(written = report.written, failed = report.failed, "Engine shut down");
        report
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Failure;
    use crate::registry::ComponentLabel;
    use std::time::Duration;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.to_path_buf();
        config
    }

    fn source() -> Arc<dyn ComponentSource> {
        Arc::new(vec![ComponentLabel::new("econ", "Economy", "1.0", ["ann"])])
    }

    #[test]
    fn start_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let engine = Engine::start(config_in(&data), source()).unwrap();
        assert!(data.is_dir());
        assert!(engine.store().archive_dir().is_dir());
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.capture.placeholder.clear();
        assert!(matches!(
            Engine::start(config, source()),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn shutdown_then_restart_restores_records() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::start(config_in(dir.path()), source()).unwrap();
        engine.record_failure("Alice", &Failure::new("NullRef", "npe"));
        engine.record_failure("Alice", &Failure::new("NullRef", "other"));
        assert_eq!(engine.shutdown().written, 2);

        let restarted = Engine::start(config_in(dir.path()), source()).unwrap();
        let fingerprints = |engine: &Engine| {
            let mut fps: Vec<_> = engine
                .store()
                .list()
                .into_iter()
                .map(|s| s.fingerprint)
                .collect();
            fps.sort();
            fps
        };
        assert_eq!(fingerprints(&restarted), fingerprints(&engine));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_refresh_populates_registry() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::start(config_in(dir.path()), source()).unwrap();

        let handle = engine.schedule_registry_refresh().unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;
        handle.await.unwrap();

        assert_eq!(engine.registry().len(), 1);
    }

    #[test]
    fn capture_before_refresh_still_names_loaded_components() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::start(config_in(dir.path()), source()).unwrap();
        let failure = Failure::new("NullRef", "npe").with_trace("0: econ::wallet::debit");
        engine.record_failure("Alice", &failure);

        let record = engine.store().show(0).unwrap();
        assert_eq!(record.loaded_components, "Economy_v1.0 by ann");
        // Attribution waits for the registry snapshot.
        assert!(record.involved_components.is_empty());
    }
}
