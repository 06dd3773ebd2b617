//! Session issuance, validation and expiry.
//!
//! The authoritative list holds every live session with its last-seen time.
//! A fast index (token → time the entry was indexed) short-circuits the scan
//! for recently seen tokens. Both live behind a single lock so a reader never
//! sees a session in one without the other.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SessionConfig;
use crate::observability::metrics;

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// An issued session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    /// Creation time, or the last refresh after a slow-path validation.
    pub last_seen: SystemTime,
}

impl Session {
    fn is_live(&self, now: SystemTime, max_age: Duration) -> bool {
        age(self.last_seen, now) <= max_age
    }
}

/// Summary returned by a recycle pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecycleStats {
    pub expired_sessions: usize,
    pub stale_index_entries: usize,
    pub live_sessions: usize,
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: Vec<Session>,
    index: HashMap<String, SystemTime>,
}

/// Thread-safe session store.
#[derive(Debug)]
pub struct SessionStore {
    table: RwLock<SessionTable>,
    token_length: usize,
    max_age: Duration,
    index_ttl: Duration,
    refresh_interval: Duration,
    persistence_path: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            table: RwLock::new(SessionTable::default()),
            token_length: config.token_length,
            max_age: config.max_age(),
            index_ttl: config.index_ttl(),
            refresh_interval: config.refresh_interval(),
            persistence_path: config.persistence_path.clone(),
        }
    }

    /// Build a store and restore previously persisted sessions, if any.
    pub fn load(config: &SessionConfig) -> Result<Self, SessionError> {
        let store = Self::new(config);
        if let Some(path) = &store.persistence_path {
            if path.exists() {
                let restored = read_sessions(path)?;
                let now = SystemTime::now();
                let mut table = store.table.write().expect("session table lock poisoned");
                table.sessions = restored
                    .into_iter()
                    .filter(|s| s.is_live(now, store.max_age))
                    .collect();
                tracing::info!(
                    path = %path.display(),
                    sessions = table.sessions.len(),
                    "Restored sessions"
                );
            }
        }
        Ok(store)
    }

    /// Issue a new session token.
    pub fn create_session(&self) -> String {
        self.create_session_at(SystemTime::now())
    }

    pub(crate) fn create_session_at(&self, now: SystemTime) -> String {
        let token = generate_token(self.token_length);
        let mut table = self.table.write().expect("session table lock poisoned");
        table.sessions.push(Session {
            token: token.clone(),
            last_seen: now,
        });
        table.index.insert(token.clone(), now);
        metrics::record_live_sessions(table.sessions.len());
        tracing::debug!(live_sessions = table.sessions.len(), "Session created");
        token
    }

    /// Whether `token` names a live session.
    pub fn is_valid(&self, token: &str) -> bool {
        self.is_valid_at(token, SystemTime::now())
    }

    pub(crate) fn is_valid_at(&self, token: &str, now: SystemTime) -> bool {
        if token.is_empty() {
            return false;
        }

        {
            let table = self.table.read().expect("session table lock poisoned");
            if let Some(indexed_at) = table.index.get(token) {
                if age(*indexed_at, now) <= self.index_ttl {
                    return true;
                }
            }
            match table.sessions.iter().find(|s| s.token == token) {
                None => return false,
                Some(session) if !session.is_live(now, self.max_age) => return false,
                Some(session) => {
                    if age(session.last_seen, now) < self.refresh_interval
                        && table.index.contains_key(token)
                    {
                        return true;
                    }
                }
            }
        }

        // Slow-path hit: backfill the index and refresh last-seen, at most
        // once per refresh interval.
        let mut table = self.table.write().expect("session table lock poisoned");
        let refresh_interval = self.refresh_interval;
        let max_age = self.max_age;
        let Some(session) = table.sessions.iter_mut().find(|s| s.token == token) else {
            return false;
        };
        if !session.is_live(now, max_age) {
            return false;
        }
        if age(session.last_seen, now) >= refresh_interval {
            session.last_seen = now;
        }
        table.index.insert(token.to_string(), now);
        true
    }

    /// Drop expired sessions and stale fast-index entries.
    pub fn recycle(&self) -> RecycleStats {
        self.recycle_at(SystemTime::now())
    }

    pub(crate) fn recycle_at(&self, now: SystemTime) -> RecycleStats {
        let mut table = self.table.write().expect("session table lock poisoned");
        let before = table.sessions.len();
        let max_age = self.max_age;
        table.sessions.retain(|s| s.is_live(now, max_age));
        let expired_sessions = before - table.sessions.len();

        let index_before = table.index.len();
        let index_ttl = self.index_ttl;
        let SessionTable { sessions, index } = &mut *table;
        index.retain(|token, indexed_at| {
            age(*indexed_at, now) <= index_ttl && sessions.iter().any(|s| &s.token == token)
        });
        let stale_index_entries = index_before - index.len();

        metrics::record_live_sessions(sessions.len());
        RecycleStats {
            expired_sessions,
            stale_index_entries,
            live_sessions: sessions.len(),
        }
    }

    /// Number of sessions in the authoritative list.
    pub fn count(&self) -> usize {
        self.table
            .read()
            .expect("session table lock poisoned")
            .sessions
            .len()
    }

    /// Write the authoritative list to the persistence file, if configured.
    pub fn save(&self) -> Result<(), SessionError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let sessions = self
            .table
            .read()
            .expect("session table lock poisoned")
            .sessions
            .clone();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &sessions)?;
        tracing::debug!(path = %path.display(), sessions = sessions.len(), "Saved sessions");
        Ok(())
    }
}

fn read_sessions(path: &Path) -> Result<Vec<Session>, SessionError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn generate_token(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Elapsed time from `then` to `now`; zero when the clock went backwards.
fn age(then: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(then).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);
    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn store() -> SessionStore {
        SessionStore::new(&SessionConfig::default())
    }

    #[test]
    fn token_is_64_alphanumeric_chars() {
        let store = store();
        let token = store.create_session();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, store.create_session());
    }

    #[test]
    fn fresh_session_is_valid() {
        let store = store();
        let token = store.create_session();
        assert!(store.is_valid(&token));
    }

    #[test]
    fn unknown_and_empty_tokens_are_invalid() {
        let store = store();
        store.create_session();
        assert!(!store.is_valid(""));
        assert!(!store.is_valid("never-issued"));
    }

    #[test]
    fn valid_until_max_age() {
        let store = store();
        let t0 = SystemTime::now();
        let token = store.create_session_at(t0);

        assert!(store.is_valid_at(&token, t0 + 7 * DAY));
        // Validation above refreshed last-seen, so check from a fresh store.
        let store = self::store();
        let token = store.create_session_at(t0);
        assert!(!store.is_valid_at(&token, t0 + 7 * DAY + MINUTE));
    }

    #[test]
    fn slow_path_refreshes_last_seen_at_most_every_interval() {
        let store = store();
        let t0 = SystemTime::now();
        let token = store.create_session_at(t0);

        // Index entry expired, slow path refreshes.
        assert!(store.is_valid_at(&token, t0 + 10 * MINUTE));
        let seen = store.table.read().unwrap().sessions[0].last_seen;
        assert_eq!(seen, t0 + 10 * MINUTE);

        // Within the refresh interval, last-seen stays put even after the
        // index entry is dropped by a recycle.
        store.recycle_at(t0 + 16 * MINUTE);
        assert!(store.is_valid_at(&token, t0 + 13 * MINUTE));
        let seen = store.table.read().unwrap().sessions[0].last_seen;
        assert_eq!(seen, t0 + 10 * MINUTE);
    }

    #[test]
    fn recycle_removes_expired_sessions_and_index_entries() {
        let store = store();
        let t0 = SystemTime::now();
        let old = store.create_session_at(t0);
        let fresh = store.create_session_at(t0 + 6 * DAY);

        let stats = store.recycle_at(t0 + 7 * DAY + MINUTE);
        assert_eq!(stats.expired_sessions, 1);
        assert_eq!(stats.live_sessions, 1);
        // Both index entries are older than the index TTL.
        assert_eq!(stats.stale_index_entries, 2);

        assert!(!store.is_valid_at(&old, t0 + 7 * DAY + MINUTE));
        assert!(store.is_valid_at(&fresh, t0 + 7 * DAY + MINUTE));
    }

    #[test]
    fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            persistence_path: Some(dir.path().join("sessions.json")),
            ..SessionConfig::default()
        };

        let store = SessionStore::new(&config);
        let token = store.create_session();
        store.save().unwrap();

        let restored = SessionStore::load(&config).unwrap();
        assert_eq!(restored.count(), 1);
        assert!(restored.is_valid(&token));
    }

    #[test]
    fn concurrent_creation_keeps_every_session() {
        let store = std::sync::Arc::new(store());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..50).map(|_| store.create_session()).collect::<Vec<_>>()
                })
            })
            .collect();
        let tokens: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(store.count(), 400);
        assert!(tokens.iter().all(|t| store.is_valid(t)));
    }
}
