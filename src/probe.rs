//! Ambient environment inspection.
//!
//! Everything the endpoints want to know about the process they run in goes
//! through [`EnvironmentProbe`]. Handlers call [`Snapshot::take`] once per
//! request and hand the resulting plain value to the report builders, which
//! never touch the environment themselves.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Serialize, Serializer};
use sysinfo::{Pid, ProcessRefreshKind, System, Users};
use tracing::debug;

use crate::{config::RuntimeConfig, memory::MemoryLimit};

/// Capability name of the cache accelerator.
pub const CACHE_ACCELERATOR: &str = "opcache";

/// Extensions reported by the diagnostics endpoint, in report order.
pub const TRACKED_EXTENSIONS: [&str; 9] = [
    CACHE_ACCELERATOR,
    "redis",
    "pdo_mysql",
    "pdo_pgsql",
    "gd",
    "intl",
    "zip",
    "bcmath",
    "pcntl",
];

/// User name reported when the uid has no passwd entry.
pub const UNKNOWN_USER: &str = "unknown";

/// Who the process runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: u32,
    pub user_name: String,
    pub group_id: u32,
}

impl Identity {
    pub fn is_root(&self) -> bool {
        self.user_id == 0
    }
}

/// Read-only view of the process environment.
///
/// Implementations must be cheap enough to call on every request and must
/// not fail: anything that cannot be determined degrades to a conservative
/// value (`false`, `0`, `None`).
pub trait EnvironmentProbe: Send + Sync {
    /// Whether the named extension/capability is available.
    fn has_capability(&self, name: &str) -> bool;

    /// Whether the cache accelerator is present and switched on.
    fn cache_accelerator_enabled(&self) -> bool;

    /// Runtime version string (`php_version` in the report).
    fn runtime_version(&self) -> String;

    /// Server API name (`sapi` in the report).
    fn runtime_interface(&self) -> String;

    /// Raw memory-limit setting, e.g. `128M`.
    fn memory_limit(&self) -> String;

    /// Current resident memory of this process, in bytes.
    fn memory_usage(&self) -> u64;

    fn identity(&self) -> Identity;

    fn env_var(&self, name: &str) -> Option<String>;
}

/// Production probe: capabilities from `[runtime]` config, process facts
/// from `sysinfo`, environment from `std::env`.
pub struct SystemProbe {
    runtime: RuntimeConfig,
    extensions: HashSet<String>,
}

impl SystemProbe {
    pub fn new(runtime: RuntimeConfig) -> Self {
        let extensions = runtime
            .extensions
            .iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .collect();
        Self { runtime, extensions }
    }

    /// Refresh and return this process's sysinfo entry.
    fn with_current_process<T>(&self, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let pid: Pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                debug!(error = %e, "current pid unavailable");
                return None;
            }
        };
        let mut sys = System::new();
        if !sys.refresh_process_specifics(pid, ProcessRefreshKind::everything()) {
            debug!(%pid, "process refresh failed");
            return None;
        }
        sys.process(pid).map(f)
    }
}

impl EnvironmentProbe for SystemProbe {
    fn has_capability(&self, name: &str) -> bool {
        self.extensions.contains(&name.to_ascii_lowercase())
    }

    fn cache_accelerator_enabled(&self) -> bool {
        self.runtime.cache_accelerator && self.has_capability(CACHE_ACCELERATOR)
    }

    fn runtime_version(&self) -> String {
        self.runtime.version.clone()
    }

    fn runtime_interface(&self) -> String {
        self.runtime.interface.clone()
    }

    fn memory_limit(&self) -> String {
        self.runtime.memory_limit.clone()
    }

    fn memory_usage(&self) -> u64 {
        self.with_current_process(|p| p.memory()).unwrap_or(0)
    }

    fn identity(&self) -> Identity {
        let ids = self.with_current_process(|p| (p.user_id().cloned(), p.group_id()));
        let (uid, gid) = ids.unwrap_or((None, None));

        let user_name = uid
            .as_ref()
            .and_then(|uid| {
                let users = Users::new_with_refreshed_list();
                users.get_user_by_id(uid).map(|u| u.name().to_string())
            })
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        // Without a readable uid, report root: the non-root check then fails
        // closed rather than passing on missing data.
        Identity {
            user_id: uid.and_then(raw_uid).unwrap_or(0),
            user_name,
            group_id: gid.and_then(raw_gid).unwrap_or(0),
        }
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

#[cfg(unix)]
fn raw_uid(uid: sysinfo::Uid) -> Option<u32> {
    Some(*uid)
}

#[cfg(unix)]
fn raw_gid(gid: sysinfo::Gid) -> Option<u32> {
    Some(*gid)
}

// Windows SIDs have no numeric form.
#[cfg(not(unix))]
fn raw_uid(_: sysinfo::Uid) -> Option<u32> {
    None
}

#[cfg(not(unix))]
fn raw_gid(_: sysinfo::Gid) -> Option<u32> {
    None
}

/// Availability of each of [`TRACKED_EXTENSIONS`], kept in that order.
///
/// Serializes as a JSON object whose keys follow the tracked order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFlags(Vec<(&'static str, bool)>);

impl ExtensionFlags {
    fn collect(probe: &dyn EnvironmentProbe) -> Self {
        Self(
            TRACKED_EXTENSIONS
                .iter()
                .map(|&name| (name, probe.has_capability(name)))
                .collect(),
        )
    }
}

#[cfg(test)]
impl ExtensionFlags {
    pub fn get(&self, name: &str) -> Option<bool> {
        self.0.iter().find(|(n, _)| *n == name).map(|&(_, on)| on)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for ExtensionFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, on) in &self.0 {
            map.serialize_entry(name, on)?;
        }
        map.end()
    }
}

/// Everything one request needs from the environment, captured once.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub runtime_version: String,
    pub runtime_interface: String,
    pub identity: Identity,
    pub extensions: ExtensionFlags,
    pub cache_accelerator_enabled: bool,
    pub memory_usage: u64,
    pub memory_limit: MemoryLimit,
    /// Raw value of the rootless environment variable.
    pub rootless_env: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Query `probe` for everything the reports use.
    pub fn take(probe: &dyn EnvironmentProbe, rootless_env: &str, now: DateTime<Utc>) -> Self {
        Self {
            runtime_version: probe.runtime_version(),
            runtime_interface: probe.runtime_interface(),
            identity: probe.identity(),
            extensions: ExtensionFlags::collect(probe),
            cache_accelerator_enabled: probe.cache_accelerator_enabled(),
            memory_usage: probe.memory_usage(),
            memory_limit: MemoryLimit::parse(&probe.memory_limit()),
            rootless_env: probe.env_var(rootless_env),
            taken_at: now,
        }
    }

    /// Rootless mode is on only for the exact value `"true"`.
    pub fn rootless_enabled(&self) -> bool {
        self.rootless_env.as_deref() == Some("true")
    }

    /// ISO-8601 timestamp with a numeric offset, e.g. `2026-10-19T12:00:00+00:00`.
    pub fn timestamp(&self) -> String {
        iso8601(self.taken_at)
    }
}

pub fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

/// In-memory probe for tests.
#[cfg(test)]
pub mod fake {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct FakeProbe {
        pub capabilities: HashSet<String>,
        pub accelerator_on: bool,
        pub version: String,
        pub interface: String,
        pub memory_limit: String,
        pub memory_usage: u64,
        pub identity: Identity,
        pub env: HashMap<String, String>,
    }

    impl FakeProbe {
        /// A probe for which every health check passes.
        pub fn healthy() -> Self {
            Self {
                capabilities: ["opcache", "redis", "intl"].iter().map(|s| s.to_string()).collect(),
                accelerator_on: true,
                version: "8.3.0".into(),
                interface: "fpm-fcgi".into(),
                memory_limit: "128M".into(),
                memory_usage: 2 * 1024 * 1024,
                identity: Identity {
                    user_id: 1000,
                    user_name: "app".into(),
                    group_id: 1000,
                },
                env: HashMap::from([("PHPEEK_ROOTLESS".to_string(), "true".to_string())]),
            }
        }
    }

    impl EnvironmentProbe for FakeProbe {
        fn has_capability(&self, name: &str) -> bool {
            self.capabilities.contains(name)
        }

        fn cache_accelerator_enabled(&self) -> bool {
            self.accelerator_on && self.has_capability(CACHE_ACCELERATOR)
        }

        fn runtime_version(&self) -> String {
            self.version.clone()
        }

        fn runtime_interface(&self) -> String {
            self.interface.clone()
        }

        fn memory_limit(&self) -> String {
            self.memory_limit.clone()
        }

        fn memory_usage(&self) -> u64 {
            self.memory_usage
        }

        fn identity(&self) -> Identity {
            self.identity.clone()
        }

        fn env_var(&self, name: &str) -> Option<String> {
            self.env.get(name).cloned()
        }
    }
}
