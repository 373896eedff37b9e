use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use studyshala_materials::{DisabledDrive, DriveProvider};
use studyshala_platform_access::SessionStore;
use studyshala_server::auth::OidcClient;
use studyshala_server::config::ServerConfig;
use studyshala_server::drive::GoogleDrive;
use studyshala_server::rate_limit::RateLimiter;
use studyshala_server::state::{AppState, Stores};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    reqwest::Url::parse(&config.frontend_url).expect("FRONTEND_URL must be an absolute URL");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let stores = Stores::postgres(db_pool);
    let sessions = stores.sessions.clone();

    let drive: Arc<dyn DriveProvider> = if config.drive.enabled {
        match GoogleDrive::new(&config.drive) {
            Ok(drive) => {
                tracing::info!("Google Drive uploads enabled");
                Arc::new(drive)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Google Drive misconfigured; storing file metadata only");
                Arc::new(DisabledDrive)
            }
        }
    } else {
        tracing::info!("Google Drive disabled; storing file metadata only");
        Arc::new(DisabledDrive)
    };

    // Initialize OIDC client
    let oidc = match config.google.clone() {
        Some(google) => {
            tracing::info!("Discovering OIDC provider...");
            match OidcClient::discover(google).await {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!(error = %e, "OIDC discovery failed; logins are disabled");
                    None
                }
            }
        }
        None => {
            tracing::warn!("No identity provider configured; logins are disabled");
            None
        }
    };

    let app_state = Arc::new(AppState::new(&config, stores, drive, oidc));

    // Cleanup expired sessions on startup
    delete_expired_sessions(sessions.as_ref()).await;

    let sweep_interval = Duration::from_secs(config.auth.sweep_interval_seconds);
    app_state.states.spawn_sweeper(sweep_interval);
    spawn_maintenance(sessions, app_state.rate_limiter.clone(), sweep_interval);

    let app = studyshala_server::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
}

async fn delete_expired_sessions(sessions: &dyn SessionStore) {
    match sessions.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_sessions = count, "Cleaned up expired sessions");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions");
        }
    }
}

/// Periodically removes expired sessions and ended rate-limit windows.
fn spawn_maintenance(
    sessions: Arc<dyn SessionStore>,
    rate_limiter: Arc<RateLimiter>,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            delete_expired_sessions(sessions.as_ref()).await;
            let swept = rate_limiter.sweep();
            if swept > 0 {
                tracing::debug!(swept, "Swept rate limit windows");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
