//! StudyShala REST backend.
//!
//! This crate wires the platform-access, materials, and audit libraries to
//! Postgres, Google sign-in, and Google Drive, and serves them as a JSON API
//! for the web client.

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod origin;
pub mod rate_limit;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("Route not found")
}

fn cors(frontend_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(frontend_url) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(e) => {
            tracing::warn!(error = %e, frontend_url, "frontend URL is not a valid origin; allowing any origin");
            AllowOrigin::any()
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Builds the application router.
///
/// Every route, including `/health`, passes through the per-IP rate limiter.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.materials.upload_policy().max_request_bytes();

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::routes())
        .nest("/api/faculty", api::faculty::routes())
        .nest("/api/student", api::student::routes())
        .nest("/api/admin", api::admin::routes())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors(&state.frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
