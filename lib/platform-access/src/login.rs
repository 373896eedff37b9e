//! Turning a verified provider identity into a platform login.
//!
//! [`LoginService::complete`] runs after the state token has been consumed and
//! the provider has vouched for the caller. It enforces the admin allow-list,
//! reconciles the requested role with the stored account, opens a session, and
//! signs the bearer credential.

use std::collections::HashSet;
use std::sync::Arc;

use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use studyshala_audit::{AuditAction, AuditEntry, AuditSink, RequestOrigin, ResourceType};
use studyshala_core::SessionId;

use crate::error::{AuthorizationError, LoginError, StoreError};
use crate::role::{Role, RoleTransition, TransitionSource};
use crate::session::Session;
use crate::store::{SessionStore, UserStore};
use crate::token::TokenIssuer;
use crate::user::User;

/// Emails permitted to hold the admin role.
///
/// Entries are compared after trimming and lowercasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminAllowList {
    emails: HashSet<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// Parses a comma-separated list such as `"a@x.edu, B@x.edu"`.
    #[must_use]
    pub fn from_csv(value: &str) -> Self {
        Self::new(value.split(','))
    }

    #[must_use]
    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&normalize_email(email))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.emails.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Knobs that shape how logins are reconciled.
#[derive(Debug, Clone)]
pub struct LoginPolicy {
    pub allow_list: AdminAllowList,
    /// When false, an existing account keeps its stored role when it asks for
    /// a different non-admin role. Allow-listed admin requests still switch.
    pub allow_role_switch: bool,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            allow_list: AdminAllowList::default(),
            allow_role_switch: true,
        }
    }
}

/// Identity claims returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// A completed login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
    pub token: String,
    /// True when this login created the account.
    pub created: bool,
    /// The role change applied by this login, if any.
    pub transition: Option<RoleTransition>,
}

/// Completes logins, logouts, and self-promotion.
pub struct LoginService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    tokens: TokenIssuer,
    policy: LoginPolicy,
}

impl LoginService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        tokens: TokenIssuer,
        policy: LoginPolicy,
    ) -> Self {
        Self {
            users,
            sessions,
            audit,
            tokens,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &LoginPolicy {
        &self.policy
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Reconciles `profile` with the stored account and signs a credential.
    ///
    /// # Errors
    ///
    /// - [`LoginError::MissingEmail`] if the provider returned no email.
    /// - [`LoginError::NotAdmin`] if admin was requested by an email that is
    ///   not allow-listed. Nothing is written except a `login-blocked` entry.
    /// - [`LoginError::AccountDeactivated`] for deactivated accounts.
    pub async fn complete(
        &self,
        profile: ExternalProfile,
        requested: Role,
        origin: RequestOrigin,
    ) -> Result<LoginOutcome, Report<LoginError>> {
        if profile.email.trim().is_empty() {
            return Err(LoginError::MissingEmail.into());
        }

        if requested.is_admin() && !self.policy.allow_list.contains(&profile.email) {
            tracing::warn!(email = %profile.email, "admin login refused: not on allow-list");
            self.audit
                .append_or_warn(
                    AuditEntry::new(AuditAction::LoginBlocked)
                        .details(serde_json::json!({
                            "email": profile.email,
                            "requestedRole": requested,
                            "reason": "not_admin",
                        }))
                        .origin(origin),
                )
                .await;
            return Err(LoginError::NotAdmin {
                email: profile.email,
            }
            .into());
        }

        let existing = self
            .users
            .find_by_external_id(&profile.external_id)
            .await
            .map_err(login_store_error)?;

        let (mut user, created, transition, ignored_request) = match existing {
            Some(mut user) => {
                if !user.is_active() {
                    tracing::info!(user_id = %user.id(), "login refused: account deactivated");
                    return Err(LoginError::AccountDeactivated { user_id: user.id() }.into());
                }
                user.set_profile(profile.email.clone(), profile.name.clone(), profile.avatar);
                // Admin requests reaching this point are allow-listed and bypass the freeze.
                if self.policy.allow_role_switch || requested.is_admin() {
                    let transition = user.transition_role(requested, TransitionSource::Login);
                    (user, false, transition, None)
                } else {
                    let ignored = (user.role() != requested).then_some(requested);
                    (user, false, None, ignored)
                }
            }
            None => {
                let mut user = User::new(
                    profile.external_id.clone(),
                    profile.email.clone(),
                    profile.name.clone(),
                    requested,
                );
                user.set_profile(profile.email, profile.name, profile.avatar);
                (user, true, None, None)
            }
        };

        user.record_login();
        if created {
            self.users.insert(&user).await.map_err(login_store_error)?;
        } else {
            self.users.update(&user).await.map_err(login_store_error)?;
        }

        if let Some(transition) = transition {
            tracing::info!(
                user_id = %user.id(),
                from = %transition.from,
                to = %transition.to,
                "role changed at login"
            );
            self.audit
                .append_or_warn(
                    AuditEntry::new(AuditAction::RoleChanged)
                        .actor(user.id())
                        .resource(ResourceType::User, user.id().to_string())
                        .details(transition.to_details())
                        .origin(origin.clone()),
                )
                .await;
        }

        let session = self.tokens.new_session(&user);
        self.sessions
            .insert(&session)
            .await
            .map_err(login_store_error)?;
        let token = self.tokens.issue(&user, &session)?;

        let mut details = serde_json::json!({
            "role": user.role(),
            "created": created,
        });
        if let Some(ignored) = ignored_request {
            details["ignoredRoleRequest"] = serde_json::json!(ignored);
        }
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::Login)
                    .actor(user.id())
                    .resource(ResourceType::User, user.id().to_string())
                    .details(details)
                    .origin(origin),
            )
            .await;

        tracing::info!(user_id = %user.id(), role = %user.role(), created, "login completed");

        Ok(LoginOutcome {
            user,
            session,
            token,
            created,
            transition,
        })
    }

    /// Revokes the session behind a credential.
    pub async fn logout(
        &self,
        user: &User,
        session_id: SessionId,
        origin: RequestOrigin,
    ) -> Result<(), Report<StoreError>> {
        self.sessions.delete(session_id).await?;
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::Logout)
                    .actor(user.id())
                    .resource(ResourceType::User, user.id().to_string())
                    .origin(origin),
            )
            .await;
        tracing::info!(user_id = %user.id(), "logged out");
        Ok(())
    }

    /// Promotes an allow-listed caller to admin.
    ///
    /// Returns the updated account. Callers already holding admin are
    /// returned unchanged.
    pub async fn promote_self(
        &self,
        mut user: User,
        origin: RequestOrigin,
    ) -> Result<User, Report<SelfPromotionError>> {
        if !self.policy.allow_list.contains(user.email()) {
            return Err(SelfPromotionError::Denied(AuthorizationError::NotOnAllowList {
                user_id: user.id(),
            })
            .into());
        }

        let Some(transition) = user.transition_role(Role::Admin, TransitionSource::SelfPromotion)
        else {
            return Ok(user);
        };

        self.users
            .update(&user)
            .await
            .map_err(|e| SelfPromotionError::Store(e.current_context().clone()))?;
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::SelfPromoted)
                    .actor(user.id())
                    .resource(ResourceType::User, user.id().to_string())
                    .details(transition.to_details())
                    .origin(origin),
            )
            .await;
        tracing::info!(user_id = %user.id(), from = %transition.from, "self-promoted to admin");
        Ok(user)
    }
}

/// Errors from [`LoginService::promote_self`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfPromotionError {
    Denied(AuthorizationError),
    Store(StoreError),
}

impl std::fmt::Display for SelfPromotionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Denied(inner) => write!(f, "{inner}"),
            Self::Store(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for SelfPromotionError {}

fn login_store_error(report: Report<StoreError>) -> Report<LoginError> {
    LoginError::StoreFailed {
        details: report.current_context().to_string(),
    }
    .into()
}
