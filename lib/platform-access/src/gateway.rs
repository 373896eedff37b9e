//! Per-request authentication and role checks.
//!
//! Every protected request presents a bearer credential. The gateway checks,
//! in order: signature and expiry, that the user still exists, that the
//! account is active, and that the session has not been revoked. Role guards
//! run against the stored role, never the role embedded in the credential.

use std::sync::Arc;

use rootcause::prelude::Report;
use studyshala_core::{SessionId, UserId};

use crate::auth::AuthenticatedUser;
use crate::error::{AuthenticationError, AuthorizationError, StoreError};
use crate::role::RoleGuard;
use crate::store::{SessionStore, UserStore};
use crate::token::TokenIssuer;
use crate::user::User;

/// Resolves bearer credentials to live accounts.
pub struct Gateway {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: TokenIssuer,
}

impl Gateway {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: TokenIssuer,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
        }
    }

    /// Authenticates a raw bearer credential.
    pub async fn authenticate(
        &self,
        token: &str,
    ) -> Result<AuthenticatedUser, Report<AuthenticationError>> {
        let claims = self.tokens.verify(token)?;

        let user_id: UserId = claims.sub.parse().map_err(|_| {
            AuthenticationError::InvalidOrExpired {
                reason: "malformed subject".to_string(),
            }
        })?;
        let session_id: SessionId = claims.jti.parse().map_err(|_| {
            AuthenticationError::InvalidOrExpired {
                reason: "malformed session id".to_string(),
            }
        })?;

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(auth_store_error)?
            .ok_or_else(|| AuthenticationError::UserNotFound {
                user_id: claims.sub.clone(),
            })?;

        if !user.is_active() {
            return Err(AuthenticationError::AccountDeactivated { user_id }.into());
        }

        let session = self
            .sessions
            .find(session_id)
            .await
            .map_err(auth_store_error)?;
        match session {
            Some(session) if session.user_id() == user_id && !session.is_expired() => {}
            _ => {
                return Err(AuthenticationError::InvalidOrExpired {
                    reason: "session revoked".to_string(),
                }
                .into());
            }
        }

        Ok(AuthenticatedUser::new(user, session_id))
    }

    /// Checks `guard` against the caller's stored role.
    pub fn authorize(user: &User, guard: RoleGuard) -> Result<(), Report<AuthorizationError>> {
        if guard.permits(user.role()) {
            Ok(())
        } else {
            tracing::debug!(user_id = %user.id(), role = %user.role(), %guard, "role guard failed");
            Err(AuthorizationError::Forbidden {
                user_id: user.id(),
                guard,
            }
            .into())
        }
    }
}

fn auth_store_error(report: Report<StoreError>) -> Report<AuthenticationError> {
    AuthenticationError::StoreFailed {
        details: report.current_context().to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;
    use crate::session::Session;
    use crate::store::memory::{MemorySessions, MemoryUsers};

    struct Harness {
        users: Arc<MemoryUsers>,
        sessions: Arc<MemorySessions>,
        tokens: TokenIssuer,
        gateway: Gateway,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryUsers::default());
        let sessions = Arc::new(MemorySessions::default());
        let tokens = TokenIssuer::new("secret", chrono::Duration::days(7));
        let gateway = Gateway::new(users.clone(), sessions.clone(), tokens.clone());
        Harness {
            users,
            sessions,
            tokens,
            gateway,
        }
    }

    async fn signed_in(h: &Harness, role: Role) -> (User, Session, String) {
        let user = User::new(
            "sub".to_string(),
            "p@example.edu".to_string(),
            "P".to_string(),
            role,
        );
        h.users.put(user.clone());
        let session = h.tokens.new_session(&user);
        h.sessions.insert(&session).await.expect("insert");
        let token = h.tokens.issue(&user, &session).expect("sign");
        (user, session, token)
    }

    #[tokio::test]
    async fn valid_credential_resolves_user() {
        let h = harness();
        let (user, session, token) = signed_in(&h, Role::Student).await;
        let auth = h.gateway.authenticate(&token).await.expect("authenticated");
        assert_eq!(auth.user().id(), user.id());
        assert_eq!(auth.session_id(), session.id());
    }

    #[tokio::test]
    async fn deleted_user_is_user_not_found() {
        let h = harness();
        let (user, _, token) = signed_in(&h, Role::Student).await;
        h.users.delete(user.id()).await.expect("delete");
        let err = h.gateway.authenticate(&token).await.unwrap_err();
        assert_eq!(err.current_context().reason_code(), "user_not_found");
    }

    #[tokio::test]
    async fn deactivation_applies_to_the_next_request() {
        let h = harness();
        let (mut user, _, token) = signed_in(&h, Role::Faculty).await;
        h.gateway.authenticate(&token).await.expect("still active");

        user.set_active(false);
        h.users.put(user);

        let err = h.gateway.authenticate(&token).await.unwrap_err();
        assert_eq!(err.current_context().reason_code(), "account_deactivated");
    }

    #[tokio::test]
    async fn revoked_session_is_rejected() {
        let h = harness();
        let (_, session, token) = signed_in(&h, Role::Student).await;
        h.sessions.delete(session.id()).await.expect("delete");
        let err = h.gateway.authenticate(&token).await.unwrap_err();
        assert_eq!(err.current_context().reason_code(), "invalid_or_expired");
    }

    #[tokio::test]
    async fn guards_use_the_stored_role() {
        let h = harness();
        let (mut user, _, token) = signed_in(&h, Role::Faculty).await;
        user.transition_role(Role::Student, crate::role::TransitionSource::Admin);
        h.users.put(user);

        let auth = h.gateway.authenticate(&token).await.expect("authenticated");
        assert!(Gateway::authorize(auth.user(), RoleGuard::Exact(Role::Faculty)).is_err());
        assert!(Gateway::authorize(auth.user(), RoleGuard::Exact(Role::Student)).is_ok());
    }
}
