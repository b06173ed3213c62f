//! Best-effort writability probe for the temp directory.
//!
//! Two independent answers are produced: whether a named scratch file could
//! be written, and whether the directory accepts new files at all. Neither
//! probe ever returns an error to the caller.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Bytes written into the scratch file.
const PAYLOAD: &[u8] = b"test";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilesystemReport {
    pub write_test: bool,
    pub temp_dir_writable: bool,
}

/// Probe bound to one directory and file-name prefix.
#[derive(Debug, Clone)]
pub struct FilesystemProbe {
    dir: PathBuf,
    prefix: String,
}

impl FilesystemProbe {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// A fresh scratch path, unique per call.
    pub fn scratch_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}.txt", self.prefix, Uuid::new_v4().simple()))
    }

    pub fn run(&self) -> FilesystemReport {
        FilesystemReport {
            write_test: self.write_test(&self.scratch_path()),
            temp_dir_writable: dir_accepts_files(&self.dir),
        }
    }

    /// Write the payload to `path` and remove it again. Removal errors are ignored.
    fn write_test(&self, path: &Path) -> bool {
        match fs::write(path, PAYLOAD) {
            Ok(()) => {
                if let Err(e) = fs::remove_file(path) {
                    debug!(path = %path.display(), error = %e, "scratch file left behind");
                }
                true
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "write test failed");
                false
            }
        }
    }
}

/// Whether an anonymous file can be created in `dir`.
fn dir_accepts_files(dir: &Path) -> bool {
    match tempfile::tempfile_in(dir) {
        Ok(_) => true,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "directory not writable");
            false
        }
    }
}
