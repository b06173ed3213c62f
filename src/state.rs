//! Shared, read-only application state.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::Config,
    filesystem::FilesystemProbe,
    probe::{EnvironmentProbe, Snapshot, SystemProbe},
    session::SessionManager,
};

/// Injected into every handler via [`axum::extract::State`].
///
/// Nothing in here is mutated after startup; per-request facts are gathered
/// fresh by each handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub probe: Arc<dyn EnvironmentProbe>,
    pub filesystem: FilesystemProbe,
    pub sessions: SessionManager,
}

impl AppState {
    /// State backed by the real process environment.
    pub fn new(config: Arc<Config>) -> Self {
        let probe = Arc::new(SystemProbe::new(config.runtime.clone()));
        Self::with_probe(config, probe)
    }

    pub fn with_probe(config: Arc<Config>, probe: Arc<dyn EnvironmentProbe>) -> Self {
        let filesystem = FilesystemProbe::new(
            config.filesystem.temp_dir.clone(),
            config.filesystem.test_file_prefix.clone(),
        );
        let sessions = SessionManager::new(&config.session);
        Self {
            config,
            probe,
            filesystem,
            sessions,
        }
    }

    /// Capture the environment for one request.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::take(self.probe.as_ref(), &self.config.runtime.rootless_env, Utc::now())
    }
}
