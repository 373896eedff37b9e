//! Authentication routes for login, callback, and logout.
//!
//! The callback never answers with an error body: every outcome is a 302 to
//! the web client, carrying either the credential or a reason code.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use studyshala_platform_access::{LoginError, Role};

use super::middleware::RequireAuth;
use crate::api::UserView;
use crate::error::ApiError;
use crate::origin::Origin;
use crate::state::AppState;

/// Reason code used when the identity provider is unreachable or unconfigured.
const PROVIDER_ERROR: &str = "provider_error";
const AUTH_FAILED: &str = "auth_failed";

/// Query parameters for starting a login.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    role: Option<String>,
}

/// Query parameters for the provider callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Responds with `302 Found`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn error_location(frontend_url: &str, reason: &str) -> String {
    format!("{frontend_url}/login?error={reason}")
}

fn success_location(
    frontend_url: &str,
    token: &str,
    user: &UserView,
) -> Result<String, &'static str> {
    let user_json = serde_json::to_string(user).map_err(|e| {
        tracing::error!(error = %e, "failed to encode user for redirect");
        AUTH_FAILED
    })?;
    let url = reqwest::Url::parse_with_params(
        &format!("{frontend_url}/auth/callback"),
        &[("token", token), ("user", user_json.as_str())],
    )
    .map_err(|e| {
        tracing::error!(error = %e, "invalid frontend URL");
        AUTH_FAILED
    })?;
    Ok(url.into())
}

/// Redirects to the identity provider with a fresh state token.
pub async fn google_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Response {
    let Some(oidc) = state.oidc.as_ref() else {
        tracing::warn!("login attempted but no identity provider is configured");
        return found(&error_location(&state.frontend_url, PROVIDER_ERROR));
    };

    let role = Role::parse_or_default(query.role.as_deref());
    let initiation = oidc.authorization_url(&state.states, role);
    tracing::info!(%role, "starting provider login");
    found(&initiation.authorization_url)
}

/// Handles the provider callback and redirects to the web client.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    Origin(origin): Origin,
    Query(query): Query<CallbackQuery>,
) -> Response {
    match complete_login(&state, query, origin).await {
        Ok(location) => found(&location),
        Err(reason) => found(&error_location(&state.frontend_url, reason)),
    }
}

async fn complete_login(
    state: &AppState,
    query: CallbackQuery,
    origin: studyshala_audit::RequestOrigin,
) -> Result<String, &'static str> {
    let record = state
        .states
        .consume(query.state.as_deref().unwrap_or_default())
        .map_err(|e| {
            tracing::warn!(error = %e, "rejected login state");
            LoginError::InvalidState(e).reason_code()
        })?;

    if let Some(error) = query.error {
        tracing::warn!(%error, "identity provider returned an error");
        return Err(AUTH_FAILED);
    }
    let code = query.code.ok_or(AUTH_FAILED)?;
    let oidc = state.oidc.as_ref().ok_or(PROVIDER_ERROR)?;

    let profile = oidc
        .exchange_code(&code, &record.bindings)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "provider code exchange failed");
            PROVIDER_ERROR
        })?;

    let outcome = state
        .login
        .complete(profile, record.role, origin)
        .await
        .map_err(|report| {
            tracing::warn!(error = %report, "login refused");
            report.current_context().reason_code()
        })?;

    success_location(
        &state.frontend_url,
        &outcome.token,
        &UserView::from(&outcome.user),
    )
}

/// Revokes the caller's session.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    RequireAuth(caller): RequireAuth,
    Origin(origin): Origin,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .login
        .logout(caller.user(), caller.session_id(), origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Logged out successfully",
    })))
}

/// Returns the caller's account.
pub async fn current_user(RequireAuth(caller): RequireAuth) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "user": UserView::from(caller.user()),
    }))
}
