//! Admin dashboard and account management.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use studyshala_core::UserId;
use studyshala_platform_access::{Role, UserFilter};

use super::{UserView, parse_id};
use crate::admin::PageRequest;
use crate::auth::{RequireAdmin, RequireAuth};
use crate::error::ApiError;
use crate::origin::Origin;
use crate::state::AppState;

/// Routes mounted under `/api/admin`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(stats))
        .route("/analytics", get(analytics))
        .route("/users", get(list_users))
        .route("/users/{id}", delete(remove_user))
        .route("/users/{id}/status", patch(set_status))
        .route("/users/{id}/role", patch(change_role))
        .route("/promote-self", post(promote_self))
}

fn user_id(raw: &str) -> Result<UserId, ApiError> {
    parse_id(raw, "User not found")
}

async fn stats(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_caller): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let stats = state.admin.stats().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn analytics(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_caller): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    let analytics = state.admin.analytics().await?;
    Ok(Json(json!({ "success": true, "analytics": analytics })))
}

#[derive(Debug, Default, Deserialize)]
struct UsersQuery {
    page: Option<u32>,
    limit: Option<u32>,
    role: Option<Role>,
    active: Option<bool>,
    search: Option<String>,
}

impl UsersQuery {
    fn filter(&self) -> UserFilter {
        UserFilter {
            role: self.role,
            active: self.active,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_caller): RequireAdmin,
    query: Result<Query<UsersQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let request = PageRequest::new(query.page, query.limit)?;
    let page = state.admin.list_users(&query.filter(), request).await?;

    let users: Vec<UserView> = page.items.iter().map(UserView::from).collect();
    Ok(Json(json!({
        "success": true,
        "users": users,
        "pagination": {
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
            "pages": page.pages(),
        },
    })))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    active: bool,
}

async fn set_status(
    State(state): State<Arc<AppState>>,
    RequireAdmin(caller): RequireAdmin,
    Origin(origin): Origin,
    Path(id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let user = state
        .admin
        .set_status(caller.user_id(), user_id(&id)?, request.active, origin)
        .await?;
    let message = if request.active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "user": UserView::from(&user),
    })))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    role: Role,
}

async fn change_role(
    State(state): State<Arc<AppState>>,
    RequireAdmin(caller): RequireAdmin,
    Origin(origin): Origin,
    Path(id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let user = state
        .admin
        .change_role(caller.user_id(), user_id(&id)?, request.role, origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "User role updated successfully",
        "user": UserView::from(&user),
    })))
}

async fn remove_user(
    State(state): State<Arc<AppState>>,
    RequireAdmin(caller): RequireAdmin,
    Origin(origin): Origin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .admin
        .remove(caller.user_id(), user_id(&id)?, origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "User deleted successfully",
    })))
}

/// Open to every role: the allow-list decides.
async fn promote_self(
    State(state): State<Arc<AppState>>,
    RequireAuth(caller): RequireAuth,
    Origin(origin): Origin,
) -> Result<Json<Value>, ApiError> {
    let user = state.login.promote_self(caller.into_user(), origin).await?;
    Ok(Json(json!({
        "success": true,
        "message": "You are now an admin",
        "user": UserView::from(&user),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_ignored() {
        let query = UsersQuery {
            search: Some("   ".to_string()),
            role: Some(Role::Faculty),
            ..UsersQuery::default()
        };
        let filter = query.filter();
        assert_eq!(filter.search, None);
        assert_eq!(filter.role, Some(Role::Faculty));
    }

    #[test]
    fn search_is_trimmed() {
        let query = UsersQuery {
            search: Some("  rao ".to_string()),
            ..UsersQuery::default()
        };
        assert_eq!(query.filter().search.as_deref(), Some("rao"));
    }
}
