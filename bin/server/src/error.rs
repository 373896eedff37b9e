//! HTTP error responses.
//!
//! Every failure leaves the server as `{"success": false, "message": ...}`
//! with a status chosen from the domain error. Internal details are logged and
//! never returned.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rootcause::prelude::Report;
use serde_json::json;
use studyshala_audit::AuditError;
use studyshala_materials::{MaterialError, UploadViolation};
use studyshala_platform_access::{
    AuthenticationError, AuthorizationError, SelfPromotionError, StoreError,
};

use crate::admin::AdminError;

/// An error returned by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 400 with a message safe to show to the caller.
    BadRequest(String),
    /// 401.
    Unauthenticated(&'static str),
    /// 403.
    Forbidden(&'static str),
    /// 404.
    NotFound(&'static str),
    /// 413.
    PayloadTooLarge,
    /// 429.
    RateLimited,
    /// 502.
    BadGateway(&'static str),
    /// 500.
    Internal,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(message) => message,
            Self::Unauthenticated(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::BadGateway(message) => message,
            Self::PayloadTooLarge => "Upload exceeds the size limit",
            Self::RateLimited => "Too many requests, please try again later",
            Self::Internal => "Internal server error",
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "message": self.message() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<Report<MaterialError>> for ApiError {
    fn from(report: Report<MaterialError>) -> Self {
        match report.current_context() {
            MaterialError::InvalidInput { reason } => Self::BadRequest(reason.clone()),
            MaterialError::Upload(violation) => Self::BadRequest(upload_message(violation)),
            MaterialError::NotFound => Self::NotFound("Material not found"),
            MaterialError::FileNotFound => Self::NotFound("File not found"),
            MaterialError::UnknownAccessCode => Self::NotFound("Invalid access code"),
            MaterialError::NotAccessible => {
                Self::Forbidden("Redeem this material's access code first")
            }
            MaterialError::ContentUnavailable => Self::NotFound("content not available"),
            MaterialError::Provider { .. } => {
                tracing::error!(error = %report, "file provider failed");
                Self::BadGateway("File provider is unavailable")
            }
            MaterialError::CodeSpaceExhausted { .. } | MaterialError::Store { .. } => {
                tracing::error!(error = %report, "material operation failed");
                Self::Internal
            }
        }
    }
}

fn upload_message(violation: &UploadViolation) -> String {
    let mut message = violation.to_string();
    if let Some(first) = message.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    message
}

impl From<Report<AuthenticationError>> for ApiError {
    fn from(report: Report<AuthenticationError>) -> Self {
        match report.current_context() {
            AuthenticationError::InvalidOrExpired { .. } => {
                Self::Unauthenticated("Invalid or expired token")
            }
            AuthenticationError::UserNotFound { .. } => Self::Unauthenticated("User not found"),
            AuthenticationError::AccountDeactivated { .. } => {
                Self::Unauthenticated("Account is deactivated")
            }
            AuthenticationError::StoreFailed { .. } => {
                tracing::error!(error = %report, "authentication failed");
                Self::Internal
            }
        }
    }
}

impl From<Report<AuthorizationError>> for ApiError {
    fn from(report: Report<AuthorizationError>) -> Self {
        match report.current_context() {
            AuthorizationError::Forbidden { .. } => Self::Forbidden("Insufficient permissions"),
            AuthorizationError::NotOnAllowList { .. } => {
                Self::Forbidden("Your email is not authorized for admin access")
            }
        }
    }
}

impl From<Report<SelfPromotionError>> for ApiError {
    fn from(report: Report<SelfPromotionError>) -> Self {
        match report.current_context() {
            SelfPromotionError::Denied(_) => {
                Self::Forbidden("Your email is not authorized for admin access")
            }
            SelfPromotionError::Store(_) => {
                tracing::error!(error = %report, "self-promotion failed");
                Self::Internal
            }
        }
    }
}

impl From<Report<StoreError>> for ApiError {
    fn from(report: Report<StoreError>) -> Self {
        tracing::error!(error = %report, "credential store failed");
        Self::Internal
    }
}

impl From<Report<AuditError>> for ApiError {
    fn from(report: Report<AuditError>) -> Self {
        tracing::error!(error = %report, "audit log failed");
        Self::Internal
    }
}

impl From<AdminError> for ApiError {
    fn from(error: AdminError) -> Self {
        match error {
            AdminError::InvalidPage { reason } => Self::BadRequest(reason),
            AdminError::UserNotFound => Self::NotFound("User not found"),
            AdminError::AdminExempt => Self::Forbidden("Admin accounts cannot be modified"),
            AdminError::OwnRole => Self::bad_request("You cannot change your own role"),
            AdminError::Store { .. } => Self::Internal,
        }
    }
}

impl From<Report<AdminError>> for ApiError {
    fn from(report: Report<AdminError>) -> Self {
        if let AdminError::Store { .. } = report.current_context() {
            tracing::error!(error = %report, "admin operation failed");
        }
        Self::from(report.current_context().clone())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        tracing::debug!(error = %error, "rejected multipart body");
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::bad_request("Invalid multipart body")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected request body");
        Self::BadRequest("Invalid request body".to_string())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection, "rejected query string");
        Self::BadRequest("Invalid query parameters".to_string())
    }
}
