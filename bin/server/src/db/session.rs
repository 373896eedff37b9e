//! Session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use studyshala_core::{SessionId, UserId};
use studyshala_platform_access::{Session, SessionStore, StoreError};
use tracing::instrument;

use super::{decode, platform_error};

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, sqlx::Error> {
        Ok(Session::with_all_fields(
            decode("session id", &self.id)?,
            decode("user id", &self.user_id)?,
            self.created_at,
            self.expires_at,
        ))
    }
}

/// Postgres-backed [`SessionStore`].
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    async fn insert(&self, session: &Session) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.user_id().to_string())
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, id: SessionId) -> Result<Option<Session>, Report<StoreError>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(row
            .map(SessionRow::try_into_session)
            .transpose()
            .map_err(platform_error)?)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: SessionId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_all_for_user(&self, user_id: UserId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_expired(&self) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(result.rows_affected())
    }
}
