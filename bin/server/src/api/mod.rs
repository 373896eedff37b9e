//! JSON API for the three role areas.
//!
//! Handlers are thin: they extract the caller, parse ids and bodies, call a
//! service, and wrap the result in the `{"success": true, ...}` envelope.

pub mod admin;
pub mod faculty;
pub mod student;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use studyshala_core::UserId;
use studyshala_platform_access::{Role, User};

use crate::error::ApiError;

/// Public snapshot of an account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            name: user.name().to_string(),
            email: user.email().to_string(),
            role: user.role(),
            avatar: user.avatar().map(str::to_string),
            active: user.is_active(),
            last_login: user.last_login(),
            created_at: user.created_at(),
        }
    }
}

/// Parses an id from a path segment. Malformed ids name nothing, so they
/// are reported as not found.
pub(crate) fn parse_id<T: FromStr>(raw: &str, not_found: &'static str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound(not_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyshala_core::MaterialId;

    #[test]
    fn user_view_hides_provider_subject() {
        let user = User::new(
            "google-123".to_string(),
            "prof@example.edu".to_string(),
            "Prof. Iyer".to_string(),
            Role::Faculty,
        );
        let json = serde_json::to_value(UserView::from(&user)).expect("serialize");

        assert_eq!(json["role"], "faculty");
        assert_eq!(json["active"], true);
        assert!(json.get("externalId").is_none());
        assert!(json.get("lastLogin").is_some());
    }

    #[test]
    fn malformed_ids_are_not_found() {
        let result = parse_id::<MaterialId>("not-an-id", "Material not found");
        assert_eq!(result, Err(ApiError::NotFound("Material not found")));

        let id = MaterialId::new();
        let parsed: MaterialId = parse_id(&id.to_string(), "Material not found").expect("parse");
        assert_eq!(parsed, id);
    }
}
