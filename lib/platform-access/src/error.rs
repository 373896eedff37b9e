//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: the bearer credential or the account behind it is not usable
//! - `AuthorizationError`: an authenticated caller fails a role guard
//! - `LoginError`: the provider callback could not be turned into a login
//! - `StoreError`: the credential store failed
//!
//! Each variant exposes a stable `reason_code` that is safe to show to clients.

use studyshala_core::UserId;
use std::fmt;

use crate::oauth_state::StateError;
use crate::role::RoleGuard;

/// Errors from authenticating a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The credential is missing, malformed, badly signed, expired, or revoked.
    InvalidOrExpired { reason: String },
    /// The credential names a user that no longer exists.
    UserNotFound { user_id: String },
    /// The account has been deactivated.
    AccountDeactivated { user_id: UserId },
    /// The credential store could not be read.
    StoreFailed { details: String },
}

impl AuthenticationError {
    /// Stable code returned to clients.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidOrExpired { .. } => "invalid_or_expired",
            Self::UserNotFound { .. } => "user_not_found",
            Self::AccountDeactivated { .. } => "account_deactivated",
            Self::StoreFailed { .. } => "internal_error",
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOrExpired { reason } => {
                write!(f, "invalid or expired credential: {reason}")
            }
            Self::UserNotFound { user_id } => write!(f, "user not found: {user_id}"),
            Self::AccountDeactivated { user_id } => {
                write!(f, "account {user_id} is deactivated")
            }
            Self::StoreFailed { details } => write!(f, "credential store failed: {details}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from role checks on an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The caller's role does not satisfy the guard.
    Forbidden { user_id: UserId, guard: RoleGuard },
    /// Self-promotion was attempted by an email not on the allow-list.
    NotOnAllowList { user_id: UserId },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forbidden { user_id, guard } => {
                write!(f, "user {user_id} requires role {guard}")
            }
            Self::NotOnAllowList { user_id } => {
                write!(f, "user {user_id} is not on the admin allow-list")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}

/// Errors from completing a provider login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The CSRF state token was unknown, already used, or expired.
    InvalidState(StateError),
    /// Admin was requested by an email that is not allow-listed.
    NotAdmin { email: String },
    /// The account exists but has been deactivated.
    AccountDeactivated { user_id: UserId },
    /// The provider did not return an email address.
    MissingEmail,
    /// The credential store failed.
    StoreFailed { details: String },
    /// The bearer credential could not be signed.
    TokenSigning { details: String },
}

impl LoginError {
    /// Stable code carried on the error redirect.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidState(StateError::UnknownOrMissing) => "invalid_state",
            Self::InvalidState(StateError::Expired) => "expired_state",
            Self::NotAdmin { .. } => "not_admin",
            Self::AccountDeactivated { .. } => "account_deactivated",
            Self::MissingEmail => "auth_failed",
            Self::StoreFailed { .. } | Self::TokenSigning { .. } => "auth_failed",
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState(inner) => write!(f, "invalid login state: {inner}"),
            Self::NotAdmin { email } => write!(f, "{email} is not allowed to sign in as admin"),
            Self::AccountDeactivated { user_id } => {
                write!(f, "account {user_id} is deactivated")
            }
            Self::MissingEmail => write!(f, "identity provider returned no email"),
            Self::StoreFailed { details } => write!(f, "credential store failed: {details}"),
            Self::TokenSigning { details } => write!(f, "failed to sign credential: {details}"),
        }
    }
}

impl std::error::Error for LoginError {}

/// Errors from the credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database failed.
    Unavailable { details: String },
    /// A uniqueness constraint was violated.
    Conflict { details: String },
    /// A stored row could not be decoded.
    Corrupt { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::Conflict { details } => write!(f, "store conflict: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt row: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}
