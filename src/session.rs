//! File-backed sessions.
//!
//! A session is a `sess_<id>` file in the save path; the id travels in a
//! cookie. Starting a session either resumes the cookie's session (when its
//! file exists) or claims a fresh id with an exclusive create. Failures never
//! propagate past [`SessionManager::ensure_started`]: they degrade to
//! [`SessionStatus::None`] with no id.
//!
//! Resuming a session refreshes its file's mtime. Every new session sweeps
//! `sess_*` files whose mtime is older than `gc_maxlifetime`.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use serde::{Serialize, Serializer};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;

const FILE_PREFIX: &str = "sess_";
const MAX_ID_LEN: usize = 128;

/// Session subsystem state, serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Disabled = 0,
    None = 1,
    Active = 2,
}

impl Serialize for SessionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("sessions are disabled")]
    Disabled,
    #[error("session id `{0}` is malformed")]
    InvalidId(String),
    #[error("session `{0}` does not exist")]
    Unknown(String),
    #[error("session storage: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of [`SessionManager::ensure_started`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub id: Option<String>,
    /// Set when a new id was issued and must be sent back as a cookie.
    #[serde(skip)]
    pub issued: bool,
}

impl SessionReport {
    fn inactive(status: SessionStatus) -> Self {
        Self { status, id: None, issued: false }
    }

    fn active(id: String, issued: bool) -> Self {
        Self { status: SessionStatus::Active, id: Some(id), issued }
    }
}

pub struct SessionManager {
    enabled: bool,
    cookie_name: String,
    save_path: PathBuf,
    max_lifetime: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            enabled: config.enabled,
            cookie_name: config.cookie_name.clone(),
            save_path: config.save_path.clone(),
            max_lifetime: Duration::from_secs(config.gc_maxlifetime),
        }
    }

    /// Resume the session named by `cookie_id`, or start a new one.
    pub fn ensure_started(&self, cookie_id: Option<&str>) -> SessionReport {
        if !self.enabled {
            return SessionReport::inactive(SessionStatus::Disabled);
        }

        if let Some(id) = cookie_id {
            match self.resume(id) {
                Ok(()) => return SessionReport::active(id.to_string(), false),
                Err(e) => debug!(error = %e, "not resuming session"),
            }
        }

        match self.start() {
            Ok(id) => SessionReport::active(id, true),
            Err(e) => {
                debug!(error = %e, save_path = %self.save_path.display(), "session start failed");
                SessionReport::inactive(SessionStatus::None)
            }
        }
    }

    /// `Set-Cookie` value for a freshly issued session.
    pub fn set_cookie_header(&self, id: &str) -> String {
        format!("{}={}; path=/", self.cookie_name, id)
    }

    /// Pull this manager's session id out of a `Cookie` header value.
    pub fn id_from_cookie_header<'a>(&self, header: &'a str) -> Option<&'a str> {
        header
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn resume(&self, id: &str) -> Result<(), SessionError> {
        if !self.enabled {
            return Err(SessionError::Disabled);
        }
        if !is_valid_id(id) {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        let path = self.file_for(id);
        if !path.is_file() {
            return Err(SessionError::Unknown(id.to_string()));
        }
        // Keep the session out of reach of the sweep.
        if let Err(e) = touch(&path) {
            debug!(path = %path.display(), error = %e, "could not refresh session mtime");
        }
        Ok(())
    }

    fn start(&self) -> Result<String, SessionError> {
        self.sweep();
        let id = Uuid::new_v4().simple().to_string();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.file_for(&id))?;
        Ok(id)
    }

    /// Remove session files not touched within `max_lifetime`. Best effort:
    /// unreadable entries and failed removals are skipped. Returns the number
    /// of files removed.
    fn sweep(&self) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(self.max_lifetime) else {
            return 0;
        };
        let entries = match fs::read_dir(&self.save_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(save_path = %self.save_path.display(), error = %e, "session sweep skipped");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(FILE_PREFIX) {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .is_ok_and(|modified| modified < cutoff);
            if !stale {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => debug!(path = %entry.path().display(), error = %e, "stale session not removed"),
            }
        }

        if removed > 0 {
            debug!(removed, "swept stale sessions");
        }
        removed
    }

    fn file_for(&self, id: &str) -> PathBuf {
        self.save_path.join(format!("{FILE_PREFIX}{id}"))
    }
}

fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .append(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// 1..=128 characters of `[A-Za-z0-9,-]`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == ',' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path) -> SessionManager {
        SessionManager::new(&SessionConfig {
            enabled: true,
            cookie_name: "PHPSESSID".into(),
            save_path: dir.to_path_buf(),
            gc_maxlifetime: 1440,
        })
    }

    /// Push `path`'s mtime `age` into the past.
    fn backdate(path: &Path, age: Duration) {
        OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
    }

    // -----------------------------------------------------------------------
    // Start / resume
    // -----------------------------------------------------------------------

    #[test]
    fn starts_new_session_without_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        let report = sessions.ensure_started(None);
        assert_eq!(report.status, SessionStatus::Active);
        assert!(report.issued);

        let id = report.id.expect("active session has an id");
        assert_eq!(id.len(), 32);
        assert!(dir.path().join(format!("sess_{id}")).is_file());
    }

    #[test]
    fn resumes_existing_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());
        let first = sessions.ensure_started(None).id.unwrap();

        let second = sessions.ensure_started(Some(&first));
        assert_eq!(second.status, SessionStatus::Active);
        assert_eq!(second.id.as_deref(), Some(first.as_str()));
        assert!(!second.issued);
    }

    #[test]
    fn unknown_cookie_gets_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        let report = sessions.ensure_started(Some("deadbeef"));
        assert_eq!(report.status, SessionStatus::Active);
        assert!(report.issued);
        assert_ne!(report.id.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn malformed_cookie_gets_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        // Would escape the save path if used as-is.
        let report = sessions.ensure_started(Some("../../etc/passwd"));
        assert!(report.issued);
        assert!(report.id.unwrap().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn disabled_sessions_report_status_zero() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(&SessionConfig {
            enabled: false,
            cookie_name: "PHPSESSID".into(),
            save_path: dir.path().to_path_buf(),
            gc_maxlifetime: 1440,
        });

        let report = sessions.ensure_started(None);
        assert_eq!(report.status, SessionStatus::Disabled);
        assert_eq!(report.id, None);
        assert!(matches!(sessions.resume("abc"), Err(SessionError::Disabled)));
    }

    #[test]
    fn unwritable_save_path_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir.path().join("missing"));

        let report = sessions.ensure_started(None);
        assert_eq!(report.status, SessionStatus::None);
        assert_eq!(report.id, None);
        assert!(matches!(sessions.start(), Err(SessionError::Io(_))));
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    #[test]
    fn new_session_sweeps_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        let old = sessions.ensure_started(None).id.unwrap();
        let old_path = dir.path().join(format!("sess_{old}"));
        backdate(&old_path, Duration::from_secs(2 * 1440));
        let unrelated = dir.path().join("keep-me.txt");
        fs::write(&unrelated, b"x").unwrap();
        backdate(&unrelated, Duration::from_secs(2 * 1440));

        let fresh = sessions.ensure_started(None).id.unwrap();

        assert!(!old_path.exists(), "expired session survived the sweep");
        assert!(dir.path().join(format!("sess_{fresh}")).is_file());
        assert!(unrelated.exists(), "sweep touched a non-session file");
    }

    #[test]
    fn sweep_keeps_recent_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        let ids: Vec<String> = (0..3).map(|_| sessions.ensure_started(None).id.unwrap()).collect();
        assert_eq!(sessions.sweep(), 0);
        for id in ids {
            assert!(dir.path().join(format!("sess_{id}")).is_file());
        }
    }

    #[test]
    fn resume_refreshes_mtime_so_active_session_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        let id = sessions.ensure_started(None).id.unwrap();
        let path = dir.path().join(format!("sess_{id}"));
        backdate(&path, Duration::from_secs(2 * 1440));

        let resumed = sessions.ensure_started(Some(&id));
        assert!(!resumed.issued);
        assert_eq!(sessions.sweep(), 0);
        assert!(path.is_file());
    }

    #[test]
    fn many_cookieless_requests_do_not_accumulate_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        for _ in 0..50 {
            let id = sessions.ensure_started(None).id.unwrap();
            backdate(&dir.path().join(format!("sess_{id}")), Duration::from_secs(2 * 1440));
        }

        // Only the most recent (backdated) file can remain before the next start.
        let remaining = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 1);
    }

    // -----------------------------------------------------------------------
    // Cookie handling
    // -----------------------------------------------------------------------

    #[test]
    fn extracts_id_from_cookie_header() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path());

        assert_eq!(
            sessions.id_from_cookie_header("theme=dark; PHPSESSID=abc123; lang=en"),
            Some("abc123")
        );
        assert_eq!(sessions.id_from_cookie_header("PHPSESSID="), None);
        assert_eq!(sessions.id_from_cookie_header("OTHER=abc"), None);
    }

    #[test]
    fn set_cookie_header_format() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(manager(dir.path()).set_cookie_header("abc"), "PHPSESSID=abc; path=/");
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    #[test]
    fn report_serializes_status_as_integer_and_hides_issued() {
        let json = serde_json::to_value(SessionReport::active("abc".into(), true)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": 2, "id": "abc" }));

        let json = serde_json::to_value(SessionReport::inactive(SessionStatus::None)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": 1, "id": null }));
    }

    #[test]
    fn id_validation() {
        assert!(is_valid_id("abc-123,XYZ"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a b"));
        assert!(!is_valid_id(&"a".repeat(129)));
    }
}
