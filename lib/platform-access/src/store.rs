//! Storage traits for accounts and sessions.
//!
//! The server implements these against Postgres. Tests use the small
//! implementations in [`memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use studyshala_core::{SessionId, UserId};

use crate::error::StoreError;
use crate::role::Role;
use crate::session::Session;
use crate::user::User;

/// Filters for listing accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub active: Option<bool>,
    /// Case-insensitive substring matched against name and email.
    pub search: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` items.
    #[must_use]
    pub fn pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Report<StoreError>>;

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, Report<StoreError>>;

    async fn insert(&self, user: &User) -> Result<(), Report<StoreError>>;

    /// Writes every mutable field of `user`.
    async fn update(&self, user: &User) -> Result<(), Report<StoreError>>;

    /// Hard-deletes the account. Returns false if it did not exist.
    async fn delete(&self, id: UserId) -> Result<bool, Report<StoreError>>;

    /// Lists accounts newest first. `page` is 1-based.
    async fn list(
        &self,
        filter: &UserFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<User>, Report<StoreError>>;

    /// Number of accounts holding each role, and the active count.
    async fn role_counts(&self) -> Result<RoleCounts, Report<StoreError>>;

    /// Number of distinct accounts whose last login is at or after `since`.
    async fn count_logged_in_since(&self, since: DateTime<Utc>) -> Result<u64, Report<StoreError>>;
}

/// Account counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub students: u64,
    pub faculty: u64,
    pub admins: u64,
    pub active: u64,
    pub inactive: u64,
}

impl RoleCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.students + self.faculty + self.admins
    }
}

/// Persistence for server-side sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), Report<StoreError>>;

    async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>>;

    async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>>;

    async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>>;

    /// Deletes expired sessions and returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, Report<StoreError>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod memory {
    //! In-memory stores for unit tests, also exported behind `test-util`.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryUsers {
        pub users: Mutex<HashMap<UserId, User>>,
    }

    impl MemoryUsers {
        pub fn snapshot(&self) -> Vec<User> {
            self.users.lock().expect("lock").values().cloned().collect()
        }

        pub fn put(&self, user: User) {
            self.users.lock().expect("lock").insert(user.id(), user);
        }
    }

    #[async_trait]
    impl UserStore for MemoryUsers {
        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Report<StoreError>> {
            Ok(self.users.lock().expect("lock").get(&id).cloned())
        }

        async fn find_by_external_id(
            &self,
            external_id: &str,
        ) -> Result<Option<User>, Report<StoreError>> {
            Ok(self
                .users
                .lock()
                .expect("lock")
                .values()
                .find(|u| u.external_id() == external_id)
                .cloned())
        }

        async fn insert(&self, user: &User) -> Result<(), Report<StoreError>> {
            self.put(user.clone());
            Ok(())
        }

        async fn update(&self, user: &User) -> Result<(), Report<StoreError>> {
            self.put(user.clone());
            Ok(())
        }

        async fn delete(&self, id: UserId) -> Result<bool, Report<StoreError>> {
            Ok(self.users.lock().expect("lock").remove(&id).is_some())
        }

        async fn list(
            &self,
            filter: &UserFilter,
            page: u32,
            limit: u32,
        ) -> Result<Page<User>, Report<StoreError>> {
            let mut items: Vec<User> = self
                .snapshot()
                .into_iter()
                .filter(|u| filter.role.is_none_or(|r| u.role() == r))
                .filter(|u| filter.active.is_none_or(|a| u.is_active() == a))
                .collect();
            items.sort_by_key(|u| std::cmp::Reverse(u.created_at()));
            let total = items.len() as u64;
            let items = items
                .into_iter()
                .skip(((page - 1) * limit) as usize)
                .take(limit as usize)
                .collect();
            Ok(Page {
                items,
                total,
                page,
                limit,
            })
        }

        async fn role_counts(&self) -> Result<RoleCounts, Report<StoreError>> {
            let mut counts = RoleCounts::default();
            for user in self.snapshot() {
                match user.role() {
                    Role::Student => counts.students += 1,
                    Role::Faculty => counts.faculty += 1,
                    Role::Admin => counts.admins += 1,
                }
                if user.is_active() {
                    counts.active += 1;
                } else {
                    counts.inactive += 1;
                }
            }
            Ok(counts)
        }

        async fn count_logged_in_since(
            &self,
            since: DateTime<Utc>,
        ) -> Result<u64, Report<StoreError>> {
            Ok(self
                .snapshot()
                .iter()
                .filter(|u| u.last_login().is_some_and(|t| t >= since))
                .count() as u64)
        }
    }

    #[derive(Default)]
    pub struct MemorySessions {
        pub sessions: Mutex<HashMap<SessionId, Session>>,
    }

    #[async_trait]
    impl SessionStore for MemorySessions {
        async fn insert(&self, session: &Session) -> Result<(), Report<StoreError>> {
            self.sessions
                .lock()
                .expect("lock")
                .insert(session.id(), session.clone());
            Ok(())
        }

        async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>> {
            Ok(self.sessions.lock().expect("lock").get(&id).cloned())
        }

        async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>> {
            self.sessions.lock().expect("lock").remove(&id);
            Ok(())
        }

        async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>> {
            self.sessions
                .lock()
                .expect("lock")
                .retain(|_, s| s.user_id() != user_id);
            Ok(())
        }

        async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
            let mut sessions = self.sessions.lock().expect("lock");
            let before = sessions.len();
            sessions.retain(|_, s| !s.is_expired());
            Ok((before - sessions.len()) as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_rounds_up() {
        let page: Page<()> = Page {
            items: Vec::new(),
            total: 41,
            page: 1,
            limit: 20,
        };
        assert_eq!(page.pages(), 3);
    }

    #[test]
    fn role_counts_total_sums_roles() {
        let counts = RoleCounts {
            students: 10,
            faculty: 3,
            admins: 1,
            active: 13,
            inactive: 1,
        };
        assert_eq!(counts.total(), 14);
    }
}
