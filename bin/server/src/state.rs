//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use studyshala_audit::AuditSink;
use studyshala_materials::{
    AccessCodeGenerator, DriveProvider, LibraryStore, MaterialService, MaterialStore,
};
use studyshala_platform_access::{
    Gateway, LoginService, OAuthStateStore, SessionStore, TokenIssuer, UserStore,
};

use crate::admin::AdminService;
use crate::auth::OidcClient;
use crate::config::ServerConfig;
use crate::db::{PgAuditLog, PgLibraryStore, PgMaterialStore, PgSessionStore, PgUserStore};
use crate::rate_limit::RateLimiter;

/// Storage backends the services are built on.
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub materials: Arc<dyn MaterialStore>,
    pub library: Arc<dyn LibraryStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    /// Postgres-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            materials: Arc::new(PgMaterialStore::new(pool.clone())),
            library: Arc::new(PgLibraryStore::new(pool.clone())),
            audit: Arc::new(PgAuditLog::new(pool)),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Base URL of the web client.
    pub frontend_url: String,
    /// Identity provider client. `None` when sign-in is not configured.
    pub oidc: Option<OidcClient>,
    /// One-time login state tokens.
    pub states: Arc<OAuthStateStore>,
    pub login: LoginService,
    pub gateway: Gateway,
    pub materials: Arc<MaterialService>,
    pub admin: AdminService,
    pub sessions: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wires the services together from configuration and backends.
    pub fn new(
        config: &ServerConfig,
        stores: Stores,
        drive: Arc<dyn DriveProvider>,
        oidc: Option<OidcClient>,
    ) -> Self {
        let tokens = TokenIssuer::new(
            &config.auth.jwt_secret,
            chrono::Duration::days(config.auth.token_days),
        );
        let states = Arc::new(OAuthStateStore::new(chrono::Duration::seconds(
            config.auth.state_ttl_seconds,
        )));

        let login = LoginService::new(
            stores.users.clone(),
            stores.sessions.clone(),
            stores.audit.clone(),
            tokens.clone(),
            config.auth.login_policy(),
        );
        let gateway = Gateway::new(stores.users.clone(), stores.sessions.clone(), tokens);
        let materials = Arc::new(MaterialService::new(
            stores.materials.clone(),
            stores.library,
            drive,
            stores.audit.clone(),
            AccessCodeGenerator::default(),
            config.upload.clone(),
        ));
        let admin = AdminService::new(
            stores.users,
            stores.sessions.clone(),
            stores.materials,
            materials.clone(),
            stores.audit,
        );
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_seconds),
        ));

        Self {
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            oidc,
            states,
            login,
            gateway,
            materials,
            admin,
            sessions: stores.sessions,
            rate_limiter,
        }
    }
}
