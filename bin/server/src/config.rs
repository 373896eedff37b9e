//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! a double underscore, e.g. `AUTH__JWT_SECRET` or `GOOGLE__CLIENT_ID`.
//!
//! See [`OidcConfig`](studyshala_platform_access::OidcConfig) for the
//! identity provider settings and
//! [`UploadPolicy`](studyshala_materials::UploadPolicy) for upload limits.

use serde::Deserialize;
use studyshala_materials::UploadPolicy;
use studyshala_platform_access::{AdminAllowList, LoginPolicy, OidcConfig};

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address to listen on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the web client. Login redirects land here.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    pub auth: AuthConfig,

    /// Identity provider. Logins are refused when absent.
    #[serde(default)]
    pub google: Option<OidcConfig>,

    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub upload: UploadPolicy,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

/// Credential and login settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer credentials.
    pub jwt_secret: String,

    /// Lifetime of bearer credentials and their sessions, in days.
    #[serde(default = "default_token_days")]
    pub token_days: i64,

    /// Lifetime of login state tokens, in seconds.
    #[serde(default = "default_state_ttl_seconds")]
    pub state_ttl_seconds: i64,

    /// Interval between state-token and session sweeps, in seconds.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    /// Comma-separated emails allowed to hold the admin role.
    #[serde(default)]
    pub admin_emails: String,

    /// Whether an existing account may switch between student and faculty
    /// by picking a different role at login.
    #[serde(default = "default_allow_role_switch")]
    pub allow_role_switch_on_login: bool,
}

fn default_token_days() -> i64 {
    7
}

fn default_state_ttl_seconds() -> i64 {
    600
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

fn default_allow_role_switch() -> bool {
    true
}

impl AuthConfig {
    #[must_use]
    pub fn login_policy(&self) -> LoginPolicy {
        LoginPolicy {
            allow_list: AdminAllowList::from_csv(&self.admin_emails),
            allow_role_switch: self.allow_role_switch_on_login,
        }
    }
}

/// Remote file storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriveConfig {
    /// When false, uploads are recorded as metadata only.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Parent folder for per-material folders.
    #[serde(default)]
    pub root_folder_id: Option<String>,
}

/// Per-IP request limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

fn default_max_requests() -> u32 {
    300
}

fn default_window_seconds() -> u64 {
    15 * 60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
