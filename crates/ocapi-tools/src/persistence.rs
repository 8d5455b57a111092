//! On-disk snapshot of session state.
//!
//! The snapshot is a single pretty-printed JSON file, `{dir}/sessions.json`:
//!
//! ```json
//! {
//!   "sessionCredentials": { "<session>": { "clientId": "...", "clientSecret": "...", "apiBase": "..." } },
//!   "userCredentials": { "<session>": { "clientId": "...", "clientSecret": "...", "apiBase": "...", "sessionId": "<session>" } },
//!   "authCodes": { "<code>": "<session>" },
//!   "timestamp": 1718000000000
//! }
//! ```
//!
//! Snapshots older than [`MAX_SNAPSHOT_AGE`] are ignored on load.

use crate::config::Credentials;
use crate::error::{OcapiToolsError, Result};
use crate::session::UserCredentials;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SESSION_FILE_NAME: &str = "sessions.json";

pub const DEFAULT_SESSION_DIR: &str = "/tmp/sfcc-sessions";

pub const MAX_SNAPSHOT_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(default)]
    pub session_credentials: HashMap<String, Credentials>,
    #[serde(default)]
    pub user_credentials: HashMap<String, UserCredentials>,
    /// Auth code -> session id.
    #[serde(default)]
    pub auth_codes: HashMap<String, String>,
    /// Unix milliseconds when the snapshot was taken.
    pub timestamp: i64,
}

impl SessionData {
    /// Age of the snapshot relative to `now_ms`; zero for timestamps in the future.
    #[must_use]
    pub fn age(&self, now_ms: i64) -> Duration {
        u64::try_from(now_ms.saturating_sub(self.timestamp))
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }
}

/// Reads and writes the snapshot file.
#[derive(Debug)]
pub struct SessionPersistence {
    dir: PathBuf,
    file: PathBuf,
    write_lock: Mutex<()>,
}

impl SessionPersistence {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let file = dir.join(SESSION_FILE_NAME);
        Self {
            dir,
            file,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Write `data` atomically (temp file + rename), creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Persistence`] if the directory or file can't be written.
    pub fn save(&self, data: &SessionData) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_file(data)
    }

    /// Like [`save`](Self::save), but `snapshot` is called after the write lock is taken.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Persistence`] if the directory or file can't be written.
    pub fn save_with(&self, snapshot: impl FnOnce() -> SessionData) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_file(&snapshot())
    }

    fn write_file(&self, data: &SessionData) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            OcapiToolsError::Persistence(format!(
                "failed to create session directory '{}': {e}",
                self.dir.display()
            ))
        })?;

        let json = serde_json::to_string_pretty(data)?;
        let tmp = self.file.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| {
            OcapiToolsError::Persistence(format!("failed to write '{}': {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.file).map_err(|e| {
            OcapiToolsError::Persistence(format!(
                "failed to replace '{}': {e}",
                self.file.display()
            ))
        })?;
        tracing::debug!(path = %self.file.display(), "session data saved");
        Ok(())
    }

    /// Load the snapshot. Missing or stale files yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Persistence`] if the file exists but can't be read or parsed.
    pub fn load(&self) -> Result<Option<SessionData>> {
        let text = match std::fs::read_to_string(&self.file) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.file.display(), "no existing session file found");
                return Ok(None);
            }
            Err(e) => {
                return Err(OcapiToolsError::Persistence(format!(
                    "failed to read '{}': {e}",
                    self.file.display()
                )));
            }
        };

        let data: SessionData = serde_json::from_str(&text).map_err(|e| {
            OcapiToolsError::Persistence(format!("failed to parse '{}': {e}", self.file.display()))
        })?;

        if data.age(chrono::Utc::now().timestamp_millis()) > MAX_SNAPSHOT_AGE {
            tracing::info!(path = %self.file.display(), "session data is too old, ignoring");
            return Ok(None);
        }
        Ok(Some(data))
    }

    /// Overwrite an existing snapshot with an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Persistence`] if the file can't be written.
    pub fn clear(&self) -> Result<()> {
        if !self.file.exists() {
            return Ok(());
        }
        self.save(&SessionData {
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..SessionData::default()
        })
    }
}
