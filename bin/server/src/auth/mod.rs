//! Authentication for the StudyShala server.
//!
//! This module provides:
//! - Sign-in through the external identity provider
//! - Bearer credential extractors for Axum routes
//! - Role extractors for the student, faculty, and admin areas
//!
//! # Authorization Model
//!
//! Every authenticated request re-reads the stored account, so role changes
//! and deactivation take effect immediately rather than at the next login.
//! Material-level access (ownership and redeemed access codes) is decided
//! by [`MaterialService`](studyshala_materials::MaterialService), not here.

pub mod middleware;
pub mod oidc;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub use middleware::{AuthRejection, RequireAdmin, RequireAuth, RequireFaculty, RequireStudent};
pub use oidc::{OidcClient, OidcError};

use crate::state::AppState;

/// Routes mounted under `/auth`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/google", get(routes::google_login))
        .route("/google/callback", get(routes::google_callback))
        .route("/logout", post(routes::logout))
        .route("/user", get(routes::current_user))
}
