//! User domain type.
//!
//! A user is created on the first successful provider login and identified
//! internally by a [`UserId`]. The provider's stable subject is kept as the
//! external id and is unique across accounts, as is the email address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studyshala_core::UserId;

use crate::role::{Role, RoleTransition, TransitionSource};

/// An account on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Internal platform user ID.
    id: UserId,
    /// Stable subject from the identity provider.
    external_id: String,
    /// Display name from the provider profile.
    name: String,
    /// Email address, unique across accounts.
    email: String,
    /// Profile picture URL, if the provider supplied one.
    avatar: Option<String>,
    /// The single role this account holds.
    role: Role,
    /// Deactivated accounts are rejected on every request.
    active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new, active user holding `role`.
    #[must_use]
    pub fn new(external_id: String, email: String, name: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            external_id,
            name,
            email,
            avatar: None,
            role,
            active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: UserId,
        external_id: String,
        name: String,
        email: String,
        avatar: Option<String>,
        role: Role,
        active: bool,
        last_login: Option<DateTime<Utc>>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            external_id,
            name,
            email,
            avatar,
            role,
            active,
            last_login,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Refreshes profile fields from the provider.
    pub fn set_profile(&mut self, email: String, name: String, avatar: Option<String>) {
        self.email = email;
        self.name = name;
        self.avatar = avatar;
        self.updated_at = Utc::now();
    }

    /// Stamps a successful login.
    pub fn record_login(&mut self) {
        let now = Utc::now();
        self.last_login = Some(now);
        self.updated_at = now;
    }

    /// Moves the account to `to`.
    ///
    /// Returns the applied transition, or `None` when the account already
    /// holds that role.
    pub fn transition_role(&mut self, to: Role, source: TransitionSource) -> Option<RoleTransition> {
        if self.role == to {
            return None;
        }
        let transition = RoleTransition {
            from: self.role,
            to,
            source,
        };
        self.role = to;
        self.updated_at = Utc::now();
        Some(transition)
    }

    /// Activates or deactivates the account.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.updated_at = Utc::now();
    }
}
