//! One-time CSRF state tokens for the provider login handshake.
//!
//! When a login starts, [`OAuthStateStore::issue`] binds a fresh random token
//! to the role the user asked for (plus the PKCE verifier and nonce of that
//! attempt). The provider echoes the token back on the callback, where
//! [`OAuthStateStore::consume`] removes it and hands the binding back exactly
//! once. Abandoned attempts are dropped by a periodic sweep.
//!
//! The store is process-local: a restart invalidates every login in flight.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use crate::role::Role;

/// Random bytes per token (256 bits of entropy).
const TOKEN_BYTES: usize = 32;

/// Per-attempt secrets that must survive the provider round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateBindings {
    pub pkce_verifier: String,
    pub nonce: String,
}

/// What a state token is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub role: Role,
    pub bindings: StateBindings,
    pub expires_at: DateTime<Utc>,
}

/// Why a state token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// Never issued, already consumed, or swept.
    UnknownOrMissing,
    /// Issued but past its expiry.
    Expired,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOrMissing => write!(f, "state token is unknown or missing"),
            Self::Expired => write!(f, "state token has expired"),
        }
    }
}

impl std::error::Error for StateError {}

/// Concurrency-safe map of outstanding state tokens.
#[derive(Debug)]
pub struct OAuthStateStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, StateRecord>>,
}

impl OAuthStateStore {
    /// Creates an empty store whose tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Issues a token bound to `role` with no extra bindings.
    pub fn issue(&self, role: Role) -> String {
        self.issue_with(role, StateBindings::default())
    }

    /// Issues a token bound to `role` and the attempt's PKCE/nonce secrets.
    pub fn issue_with(&self, role: Role, bindings: StateBindings) -> String {
        let token = hex::encode(rand::random::<[u8; TOKEN_BYTES]>());
        let record = StateRecord {
            role,
            bindings,
            expires_at: Utc::now() + self.ttl,
        };
        self.lock().insert(token.clone(), record);
        tracing::debug!(%role, "issued login state");
        token
    }

    /// Consumes a token, returning its binding exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownOrMissing`] for unknown or reused tokens
    /// and [`StateError::Expired`] for tokens past their expiry.
    pub fn consume(&self, token: &str) -> Result<StateRecord, StateError> {
        self.consume_at(token, Utc::now())
    }

    /// Consumes a token as of `now`.
    ///
    /// The entry is removed whether or not it has expired.
    pub fn consume_at(&self, token: &str, now: DateTime<Utc>) -> Result<StateRecord, StateError> {
        let record = self
            .lock()
            .remove(token)
            .ok_or(StateError::UnknownOrMissing)?;
        if now > record.expires_at {
            return Err(StateError::Expired);
        }
        Ok(record)
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Drops entries expired as of `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, record| record.expires_at >= now);
        before - entries.len()
    }

    /// Number of outstanding tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no tokens are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a task that sweeps the store every `every`, independent of traffic.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired login states");
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StateRecord>> {
        // Every mutation is a single insert/remove/retain, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OAuthStateStore {
        OAuthStateStore::new(Duration::minutes(10))
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let store = store();
        let a = store.issue(Role::Student);
        let b = store.issue(Role::Student);
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn consume_returns_bound_role() {
        let store = store();
        let token = store.issue(Role::Faculty);
        let record = store.consume(&token).expect("valid token");
        assert_eq!(record.role, Role::Faculty);
    }

    #[test]
    fn second_consume_is_unknown() {
        let store = store();
        let token = store.issue(Role::Admin);
        store.consume(&token).expect("first use");
        assert_eq!(store.consume(&token), Err(StateError::UnknownOrMissing));
    }

    #[test]
    fn never_issued_token_is_unknown() {
        let store = store();
        assert_eq!(store.consume("deadbeef"), Err(StateError::UnknownOrMissing));
        assert_eq!(store.consume(""), Err(StateError::UnknownOrMissing));
    }

    #[test]
    fn expired_token_is_reported_as_expired_before_sweep() {
        let store = store();
        let token = store.issue(Role::Faculty);
        let later = Utc::now() + Duration::minutes(11);

        assert_eq!(store.len(), 1);
        assert_eq!(store.consume_at(&token, later), Err(StateError::Expired));
        // Rejected tokens are removed too.
        assert_eq!(store.consume(&token), Err(StateError::UnknownOrMissing));
    }

    #[test]
    fn bindings_survive_the_round_trip() {
        let store = store();
        let bindings = StateBindings {
            pkce_verifier: "verifier".to_string(),
            nonce: "nonce".to_string(),
        };
        let token = store.issue_with(Role::Student, bindings.clone());
        assert_eq!(store.consume(&token).expect("valid").bindings, bindings);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = store();
        let old = store.issue(Role::Student);
        let fresh = store.issue(Role::Faculty);

        // Push the first entry into the past.
        store
            .lock()
            .get_mut(&old)
            .expect("present")
            .expires_at = Utc::now() - Duration::seconds(1);

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.consume(&old), Err(StateError::UnknownOrMissing));
        assert_eq!(store.consume(&fresh).expect("fresh").role, Role::Faculty);
    }

    #[test]
    fn concurrent_consumers_get_the_record_once() {
        let store = Arc::new(store());
        let token = store.issue(Role::Admin);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let token = token.clone();
                std::thread::spawn(move || store.consume(&token).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn sweeper_task_runs_on_its_interval() {
        let store = Arc::new(store());
        let token = store.issue(Role::Student);
        store.lock().get_mut(&token).expect("present").expires_at =
            Utc::now() - Duration::seconds(1);

        let handle = store.spawn_sweeper(std::time::Duration::from_millis(10));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.is_empty());
    }
}
