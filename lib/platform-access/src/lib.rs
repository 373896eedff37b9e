//! Platform access, authentication, and authorization for StudyShala.
//!
//! This crate provides:
//! - User accounts with a single [`Role`] each (`student`, `faculty`, `admin`)
//! - One-time CSRF state tokens for the provider login ([`OAuthStateStore`])
//! - Login reconciliation and the admin allow-list ([`LoginService`])
//! - Signed bearer credentials backed by revocable sessions ([`TokenIssuer`])
//! - Per-request authentication and role guards ([`Gateway`])
//!
//! # Access Control Model
//!
//! The role is chosen by the user at the login redirect and stored on the
//! account. Admin may only be chosen by emails on the allow-list. Every
//! request re-reads the account, so deactivation and role changes take effect
//! on the caller's next request.
//!
//! # Example
//!
//! ```
//! use studyshala_platform_access::{AdminAllowList, Role, RoleGuard};
//!
//! let allow_list = AdminAllowList::from_csv("Dean@Example.edu, registrar@example.edu");
//! assert!(allow_list.contains("dean@example.edu"));
//!
//! let requested = Role::parse_or_default(Some("superuser"));
//! assert_eq!(requested, Role::Student);
//!
//! let guard = RoleGuard::AnyOf(&[Role::Faculty, Role::Admin]);
//! assert!(!guard.permits(requested));
//! ```

pub mod auth;
pub mod error;
pub mod gateway;
pub mod login;
pub mod oauth_state;
pub mod oidc;
pub mod role;
pub mod session;
pub mod store;
pub mod token;
pub mod user;

// Re-export main types at crate root
pub use auth::{AuthenticatedUser, LoginInitiation};
pub use error::{AuthenticationError, AuthorizationError, LoginError, StoreError};
pub use gateway::Gateway;
pub use login::{
    AdminAllowList, ExternalProfile, LoginOutcome, LoginPolicy, LoginService, SelfPromotionError,
};
pub use oauth_state::{OAuthStateStore, StateBindings, StateError, StateRecord};
pub use oidc::OidcConfig;
pub use role::{Role, RoleGuard, RoleTransition, TransitionSource, UnknownRole};
pub use session::Session;
pub use store::{Page, RoleCounts, SessionStore, UserFilter, UserStore};
pub use token::{Claims, TokenIssuer};
pub use user::User;
