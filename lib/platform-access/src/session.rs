//! Server-side login sessions.
//!
//! A session row is written for every issued bearer credential. Its id is the
//! credential's `jti` claim, so deleting the row on logout revokes the
//! credential even though its signature stays valid.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use studyshala_core::{SessionId, UserId};

/// A server-side record of an issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for the given user, valid for `duration`.
    #[must_use]
    pub fn new(user_id: UserId, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            created_at: now,
            expires_at: now + duration,
        }
    }

    /// Reconstitutes a session read back from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        user_id: UserId,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true if the session has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_has_correct_fields() {
        let user_id = UserId::new();
        let before = Utc::now();
        let session = Session::new(user_id, Duration::days(7));
        let after = Utc::now();

        assert_eq!(session.user_id(), user_id);
        assert!(session.created_at() >= before);
        assert!(session.created_at() <= after);
        assert_eq!(session.expires_at() - session.created_at(), Duration::days(7));
        assert!(session.id().to_string().starts_with("sess_"));
    }

    #[test]
    fn session_expiration() {
        let session = Session::new(UserId::new(), Duration::seconds(-1));
        assert!(session.is_expired());
    }

    #[test]
    fn session_not_expired() {
        let session = Session::new(UserId::new(), Duration::hours(1));
        assert!(!session.is_expired());
    }
}
