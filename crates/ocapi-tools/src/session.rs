//! Multi-tenant session state.
//!
//! One [`SessionStore`] holds every credential map the process serves from:
//!
//! - *user credentials*: sessions minted by the authorization handshake; these authenticate
//!   bearer tokens.
//! - *session credentials*: per-session dispatch credentials, installed when an authenticated MCP
//!   request arrives and cleared when the MCP session closes.
//! - *auth codes*: single-use handshake codes mapping to a session id.
//! - *transport bindings*: MCP transport session id -> auth session id (in memory only).
//!
//! All maps live behind one lock. Every mutation that changes persisted state schedules a
//! snapshot write; inside a tokio runtime the write runs on the blocking pool and bursts of
//! mutations coalesce into one write. Persistence failures are logged and never surface to
//! callers.

use crate::config::Credentials;
use crate::persistence::{SessionData, SessionPersistence};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Lifetime of an authorization code.
pub const AUTH_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Credentials registered through the authorization handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCredentials {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub session_id: String,
}

#[derive(Debug, Clone)]
struct AuthCodeEntry {
    session_id: String,
    issued_at_ms: i64,
}

#[derive(Debug, Default)]
struct SessionState {
    session_credentials: HashMap<String, Credentials>,
    user_credentials: HashMap<String, UserCredentials>,
    auth_codes: HashMap<String, AuthCodeEntry>,
    transport_sessions: HashMap<String, String>,
}

impl SessionState {
    fn snapshot(&self) -> SessionData {
        SessionData {
            session_credentials: self.session_credentials.clone(),
            user_credentials: self.user_credentials.clone(),
            auth_codes: self
                .auth_codes
                .iter()
                .map(|(code, entry)| (code.clone(), entry.session_id.clone()))
                .collect(),
            timestamp: now_ms(),
        }
    }
}

/// Snapshot writer shared with background write tasks.
#[derive(Debug)]
struct Persister {
    state: Arc<RwLock<SessionState>>,
    persistence: SessionPersistence,
    write_pending: AtomicBool,
}

impl Persister {
    fn write(&self) {
        self.write_pending.store(false, Ordering::Release);
        // The snapshot is taken under the file lock, so the last write always carries the
        // newest state.
        if let Err(e) = self
            .persistence
            .save_with(|| self.state.read().snapshot())
        {
            tracing::warn!(error = %e, "failed to persist session data");
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    state: Arc<RwLock<SessionState>>,
    persister: Option<Arc<Persister>>,
    auth_code_ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(persistence: Option<SessionPersistence>) -> Self {
        let state = Arc::new(RwLock::new(SessionState::default()));
        let persister = persistence.map(|persistence| {
            Arc::new(Persister {
                state: Arc::clone(&state),
                persistence,
                write_pending: AtomicBool::new(false),
            })
        });
        Self {
            state,
            persister,
            auth_code_ttl: AUTH_CODE_TTL,
        }
    }

    /// Store without a backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn with_auth_code_ttl(mut self, ttl: Duration) -> Self {
        self.auth_code_ttl = ttl;
        self
    }

    #[must_use]
    pub fn auth_code_ttl(&self) -> Duration {
        self.auth_code_ttl
    }

    // --- dispatch credentials -------------------------------------------------------------

    /// Install dispatch credentials for `session_id`. Re-installing identical credentials is a
    /// no-op and writes nothing.
    pub fn set_session_credentials(&self, session_id: &str, credentials: Credentials) {
        {
            let mut state = self.state.write();
            if state.session_credentials.get(session_id) == Some(&credentials) {
                return;
            }
            state
                .session_credentials
                .insert(session_id.to_string(), credentials);
        }
        self.schedule_persist();
    }

    #[must_use]
    pub fn get_session_credentials(&self, session_id: &str) -> Option<Credentials> {
        self.state
            .read()
            .session_credentials
            .get(session_id)
            .cloned()
    }

    /// Returns whether anything was removed.
    pub fn clear_session_credentials(&self, session_id: &str) -> bool {
        let removed = self
            .state
            .write()
            .session_credentials
            .remove(session_id)
            .is_some();
        if removed {
            self.schedule_persist();
        }
        removed
    }

    // --- handshake sessions ---------------------------------------------------------------

    pub fn insert_user_credentials(&self, user: UserCredentials) {
        self.state
            .write()
            .user_credentials
            .insert(user.session_id.clone(), user);
        self.schedule_persist();
    }

    #[must_use]
    pub fn user_credentials(&self, session_id: &str) -> Option<UserCredentials> {
        self.state.read().user_credentials.get(session_id).cloned()
    }

    // --- auth codes -----------------------------------------------------------------------

    pub fn insert_auth_code(&self, code: &str, session_id: &str) {
        self.state.write().auth_codes.insert(
            code.to_string(),
            AuthCodeEntry {
                session_id: session_id.to_string(),
                issued_at_ms: now_ms(),
            },
        );
        self.schedule_persist();
    }

    /// Redeem `code`: removes it and returns its session id if it was still within its TTL.
    pub fn take_auth_code(&self, code: &str) -> Option<String> {
        let entry = self.state.write().auth_codes.remove(code)?;
        self.schedule_persist();
        if self.is_expired(&entry, now_ms()) {
            tracing::debug!("auth code expired before redemption");
            return None;
        }
        Some(entry.session_id)
    }

    /// Returns whether the code was still present.
    pub fn remove_auth_code(&self, code: &str) -> bool {
        let removed = self.state.write().auth_codes.remove(code).is_some();
        if removed {
            self.schedule_persist();
        }
        removed
    }

    /// Drop every expired auth code; returns how many were removed.
    pub fn purge_expired_auth_codes(&self) -> usize {
        let now = now_ms();
        let removed = {
            let mut state = self.state.write();
            let before = state.auth_codes.len();
            state
                .auth_codes
                .retain(|_, entry| !is_expired(self.auth_code_ttl, entry, now));
            before - state.auth_codes.len()
        };
        if removed > 0 {
            self.schedule_persist();
        }
        removed
    }

    #[must_use]
    pub fn has_auth_code(&self, code: &str) -> bool {
        self.state.read().auth_codes.contains_key(code)
    }

    // --- MCP transport bindings -----------------------------------------------------------

    /// Record that MCP transport session `transport_id` belongs to auth session `session_id`.
    pub fn bind_transport_session(&self, transport_id: &str, session_id: &str) {
        self.state
            .write()
            .transport_sessions
            .insert(transport_id.to_string(), session_id.to_string());
    }

    #[must_use]
    pub fn transport_session(&self, transport_id: &str) -> Option<String> {
        self.state
            .read()
            .transport_sessions
            .get(transport_id)
            .cloned()
    }

    pub fn unbind_transport_session(&self, transport_id: &str) -> Option<String> {
        self.state.write().transport_sessions.remove(transport_id)
    }

    // --- persistence ----------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.state.read().snapshot()
    }

    /// Write the current state to disk on the calling thread. Failures are logged and swallowed.
    pub fn persist(&self) {
        if let Some(persister) = &self.persister {
            persister.write();
        }
    }

    /// Queue a snapshot write. Inside a tokio runtime the write happens on the blocking pool and
    /// at most one write is queued at a time; outside one it happens inline.
    fn schedule_persist(&self) {
        let Some(persister) = &self.persister else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            persister.write();
            return;
        };
        if persister.write_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let persister = Arc::clone(persister);
        handle.spawn_blocking(move || persister.write());
    }

    /// Replace in-memory state with the snapshot on disk, if there is a usable one.
    ///
    /// Returns whether a snapshot was applied. Restored auth codes count their TTL from the
    /// snapshot timestamp.
    pub fn restore(&self) -> bool {
        let Some(persister) = &self.persister else {
            return false;
        };
        let data = match persister.persistence.load() {
            Ok(Some(data)) => data,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session data");
                return false;
            }
        };
        self.apply_snapshot(data);
        self.purge_expired_auth_codes();
        true
    }

    fn apply_snapshot(&self, data: SessionData) {
        let mut state = self.state.write();
        let timestamp = data.timestamp;
        state.session_credentials = data.session_credentials;
        state.user_credentials = data.user_credentials;
        state.auth_codes = data
            .auth_codes
            .into_iter()
            .map(|(code, session_id)| {
                (
                    code,
                    AuthCodeEntry {
                        session_id,
                        issued_at_ms: timestamp,
                    },
                )
            })
            .collect();
        tracing::info!(
            sessions = state.session_credentials.len(),
            users = state.user_credentials.len(),
            auth_codes = state.auth_codes.len(),
            "restored session data"
        );
    }

    /// Counts of `(session credentials, user credentials, auth codes)`.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.read();
        (
            state.session_credentials.len(),
            state.user_credentials.len(),
            state.auth_codes.len(),
        )
    }

    fn is_expired(&self, entry: &AuthCodeEntry, now: i64) -> bool {
        is_expired(self.auth_code_ttl, entry, now)
    }
}

fn is_expired(ttl: Duration, entry: &AuthCodeEntry, now: i64) -> bool {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(entry.issued_at_ms) >= ttl_ms
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
