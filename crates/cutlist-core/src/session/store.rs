//! Keyed session storage.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::types::ParseSession;

/// Storage for parse sessions, addressed by opaque id.
///
/// Implementations must lock per key so concurrent sessions never contend
/// on each other's updates.
pub trait SessionStore: Send + Sync {
    /// Snapshot of a session.
    fn get(&self, id: &str) -> Option<ParseSession>;

    /// Insert or replace a session.
    fn set(&self, session: ParseSession);

    /// Remove a session. Returns whether it existed.
    fn delete(&self, id: &str) -> bool;

    /// Mutate a session in place under its key lock.
    ///
    /// Returns `false` if the session does not exist.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ParseSession)) -> bool;

    /// Remove sessions not updated within `ttl` of `now`. Returns the ids removed.
    fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String>;

    /// Number of live sessions.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process session store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, ParseSession>,
}

impl InMemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_expired(session: &ParseSession, now: DateTime<Utc>, ttl: Duration) -> bool {
    // A negative age (clock skew) never expires.
    (now - session.updated_at)
        .to_std()
        .map(|age| age >= ttl)
        .unwrap_or(false)
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Option<ParseSession> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    fn set(&self, session: ParseSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    fn delete(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ParseSession)) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn sweep(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let mut removed = Vec::new();
        self.sessions.retain(|id, session| {
            if is_expired(session, now, ttl) {
                removed.push(id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
