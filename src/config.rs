//! Configuration types for rootless-probe.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens its port. Every field has a default, so an empty file (or no
//! file at all) yields a working configuration.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [runtime]
//! version           = "8.3.0"
//! interface         = "fpm-fcgi"
//! memory_limit      = "256M"
//! cache_accelerator = true
//! extensions        = ["opcache", "redis", "pdo_pgsql", "intl"]
//!
//! [filesystem]
//! temp_dir = "/tmp"
//!
//! [session]
//! cookie_name = "PHPSESSID"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::memory::MemoryLimit;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// What the probed runtime looks like: version, extensions, limits.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub filesystem: FilesystemConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults.
    ///
    /// Used for the implicit default location only; an explicitly configured
    /// path must exist.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.server.port != 0, "[server] port must be non-zero");

        anyhow::ensure!(
            MemoryLimit::is_well_formed(&self.runtime.memory_limit),
            "[runtime] memory_limit `{}` has no leading digits (use -1 for unlimited)",
            self.runtime.memory_limit
        );

        anyhow::ensure!(
            !self.runtime.rootless_env.is_empty(),
            "[runtime] rootless_env must name an environment variable"
        );

        anyhow::ensure!(
            !self.filesystem.test_file_prefix.is_empty(),
            "[filesystem] test_file_prefix must not be empty"
        );
        // The prefix becomes part of a file name inside temp_dir.
        anyhow::ensure!(
            !self.filesystem.test_file_prefix.contains(['/', '\\']),
            "[filesystem] test_file_prefix `{}` must not contain path separators",
            self.filesystem.test_file_prefix
        );

        anyhow::ensure!(
            !self.session.cookie_name.is_empty()
                && self
                    .session
                    .cookie_name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "[session] cookie_name `{}` must be a non-empty token of [A-Za-z0-9_-]",
            self.session.cookie_name
        );

        anyhow::ensure!(
            self.session.gc_maxlifetime > 0,
            "[session] gc_maxlifetime must be at least one second"
        );

        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on (default: 8080). Reported as `server.port`.
    #[serde(default = "defaults::port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: defaults::port() }
    }
}

/// Description of the runtime this container is expected to provide.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Reported as `php_version` (default: this crate's version).
    #[serde(default = "defaults::runtime_version")]
    pub version: String,

    /// Server API name, reported as `sapi` (default: `axum`).
    #[serde(default = "defaults::runtime_interface")]
    pub interface: String,

    /// Memory ceiling, e.g. `128M`, `1G`, or `-1` for unlimited (default: `128M`).
    #[serde(default = "defaults::memory_limit")]
    pub memory_limit: String,

    /// Whether the cache accelerator is switched on. Only counts when
    /// `opcache` is also listed in `extensions`.
    #[serde(default = "defaults::cache_accelerator")]
    pub cache_accelerator: bool,

    /// Loaded extensions. Names are matched case-insensitively.
    #[serde(default = "defaults::extensions")]
    pub extensions: Vec<String>,

    /// Environment variable whose value `"true"` marks rootless mode.
    #[serde(default = "defaults::rootless_env")]
    pub rootless_env: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: defaults::runtime_version(),
            interface: defaults::runtime_interface(),
            memory_limit: defaults::memory_limit(),
            cache_accelerator: defaults::cache_accelerator(),
            extensions: defaults::extensions(),
            rootless_env: defaults::rootless_env(),
        }
    }
}

/// Where the write probe puts its scratch file.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesystemConfig {
    /// Directory under test (default: the system temp dir).
    #[serde(default = "std::env::temp_dir")]
    pub temp_dir: PathBuf,

    /// File name prefix for the write probe (default: `rootless-probe-test-`).
    #[serde(default = "defaults::test_file_prefix")]
    pub test_file_prefix: String,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            test_file_prefix: defaults::test_file_prefix(),
        }
    }
}

/// File-backed session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Set to `false` to report sessions as disabled (status `0`).
    #[serde(default = "defaults::session_enabled")]
    pub enabled: bool,

    /// Cookie carrying the session id (default: `PHPSESSID`).
    #[serde(default = "defaults::cookie_name")]
    pub cookie_name: String,

    /// Directory holding `sess_<id>` files (default: the system temp dir).
    #[serde(default = "std::env::temp_dir")]
    pub save_path: PathBuf,

    /// Seconds after which an untouched session file is swept (default: 1440).
    #[serde(default = "defaults::gc_maxlifetime")]
    pub gc_maxlifetime: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::session_enabled(),
            cookie_name: defaults::cookie_name(),
            save_path: std::env::temp_dir(),
            gc_maxlifetime: defaults::gc_maxlifetime(),
        }
    }
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn runtime_version() -> String { env!("CARGO_PKG_VERSION").into() }
    pub fn runtime_interface() -> String { "axum".into() }
    pub fn memory_limit() -> String { "128M".into() }
    pub fn cache_accelerator() -> bool { true }
    pub fn extensions() -> Vec<String> { vec!["opcache".into()] }
    pub fn rootless_env() -> String { "PHPEEK_ROOTLESS".into() }
    pub fn test_file_prefix() -> String { "rootless-probe-test-".into() }
    pub fn session_enabled() -> bool { true }
    pub fn cookie_name() -> String { "PHPSESSID".into() }
    pub fn gc_maxlifetime() -> u64 { 1440 }
}
