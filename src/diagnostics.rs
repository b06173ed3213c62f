//! Runtime diagnostics document.
//!
//! Assembled from a [`Snapshot`] plus the per-request facts (server info,
//! filesystem probe, session) that the handler gathers. Building the report
//! cannot fail.

use serde::Serialize;

use crate::{
    filesystem::FilesystemReport,
    probe::{ExtensionFlags, Identity, Snapshot},
    session::SessionReport,
};

/// Fallback for any server field that cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// Reported as `rootless.env_var` when the variable is missing or empty.
pub const UNSET: &str = "unset";

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub status: &'static str,
    #[serde(rename = "php_version")]
    pub runtime_version: String,
    #[serde(rename = "sapi")]
    pub runtime_interface: String,
    pub timestamp: String,
    #[serde(rename = "rootless")]
    pub identity: RootlessInfo,
    pub extensions: ExtensionFlags,
    pub server: ServerInfo,
    pub filesystem: FilesystemReport,
    pub session: SessionReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootlessInfo {
    pub env_var: String,
    #[serde(flatten)]
    pub identity: Identity,
}

/// What the serving side looks like from inside the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub software: String,
    pub protocol: String,
    pub port: String,
}

impl ServerInfo {
    /// Any missing or empty field becomes `"unknown"`.
    pub fn new(software: Option<String>, protocol: Option<String>, port: Option<String>) -> Self {
        let or_unknown =
            |v: Option<String>| v.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string());
        Self {
            software: or_unknown(software),
            protocol: or_unknown(protocol),
            port: or_unknown(port),
        }
    }
}

impl DiagnosticsReport {
    pub fn build(
        snapshot: &Snapshot,
        server: ServerInfo,
        filesystem: FilesystemReport,
        session: SessionReport,
    ) -> Self {
        let env_var = snapshot
            .rootless_env
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNSET.to_string());

        Self {
            status: "ok",
            runtime_version: snapshot.runtime_version.clone(),
            runtime_interface: snapshot.runtime_interface.clone(),
            timestamp: snapshot.timestamp(),
            identity: RootlessInfo {
                env_var,
                identity: snapshot.identity.clone(),
            },
            extensions: snapshot.extensions.clone(),
            server,
            filesystem,
            session,
        }
    }
}
