//! Container health verdict.
//!
//! A fixed set of boolean checks is evaluated against a [`Snapshot`] and
//! AND-ed together. The verdict only ever depends on the checks.

use serde::Serialize;

use crate::probe::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Named check results, serialized in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthChecks {
    /// The runtime is up. Always true while this process is serving.
    #[serde(rename = "php")]
    pub runtime: bool,
    /// Cache accelerator present and enabled.
    #[serde(rename = "opcache")]
    pub cache_accelerator: bool,
    /// Usage below 90% of the memory limit.
    pub memory: bool,
    pub rootless: bool,
    pub non_root_user: bool,
}

impl HealthChecks {
    pub fn evaluate(snapshot: &Snapshot) -> Self {
        Self {
            runtime: true,
            cache_accelerator: snapshot.cache_accelerator_enabled,
            memory: snapshot.memory_limit.has_headroom(snapshot.memory_usage),
            rootless: snapshot.rootless_enabled(),
            non_root_user: !snapshot.identity.is_root(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.runtime
            && self.cache_accelerator
            && self.memory
            && self.rootless
            && self.non_root_user
    }

    pub fn status(&self) -> HealthStatus {
        if self.all_passed() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Names of the checks that did not pass, for logging.
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("php", self.runtime),
            ("opcache", self.cache_accelerator),
            ("memory", self.memory),
            ("rootless", self.rootless),
            ("non_root_user", self.non_root_user),
        ]
        .into_iter()
        .filter_map(|(name, ok)| (!ok).then_some(name))
        .collect()
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
    pub user_id: u32,
    pub timestamp: String,
}

impl HealthReport {
    pub fn build(snapshot: &Snapshot) -> Self {
        let checks = HealthChecks::evaluate(snapshot);
        Self {
            status: checks.status(),
            checks,
            user_id: snapshot.identity.user_id,
            timestamp: snapshot.timestamp(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
