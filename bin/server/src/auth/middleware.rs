//! Authentication extractors for Axum.
//!
//! Every extractor resolves the bearer credential through the
//! [`Gateway`](studyshala_platform_access::Gateway), so the stored account is
//! re-read on each request. Role extractors reject with 403 after a
//! successful authentication; authentication failures are 401.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use studyshala_platform_access::{AuthenticatedUser, Gateway, Role, RoleGuard};

use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for requiring an authenticated user of any role.
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AuthRejection::MissingToken)?;

        let user = app_state
            .gateway
            .authenticate(bearer.token())
            .await
            .map_err(|report| {
                tracing::debug!(error = %report, "rejected bearer credential");
                AuthRejection::Unauthenticated(ApiError::from(report))
            })?;

        Ok(RequireAuth(user))
    }
}

async fn require_role<S>(
    parts: &mut Parts,
    state: &S,
    guard: RoleGuard,
) -> Result<AuthenticatedUser, AuthRejection>
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
    Gateway::authorize(user.user(), guard).map_err(|report| {
        tracing::debug!(error = %report, "role guard failed");
        AuthRejection::Forbidden
    })?;
    Ok(user)
}

/// Extractor for requiring an authenticated student.
pub struct RequireStudent(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireStudent
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, state, RoleGuard::Exact(Role::Student))
            .await
            .map(RequireStudent)
    }
}

/// Extractor for requiring an authenticated faculty member.
pub struct RequireFaculty(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireFaculty
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, state, RoleGuard::Exact(Role::Faculty))
            .await
            .map(RequireFaculty)
    }
}

/// Extractor for requiring an authenticated admin user.
pub struct RequireAdmin(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        require_role(parts, state, RoleGuard::Exact(Role::Admin))
            .await
            .map(RequireAdmin)
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    MissingToken,
    Unauthenticated(ApiError),
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::MissingToken => ApiError::Unauthenticated("Access token required"),
            Self::Unauthenticated(error) => error,
            Self::Forbidden => ApiError::Forbidden("Insufficient permissions"),
        }
        .into_response()
    }
}
