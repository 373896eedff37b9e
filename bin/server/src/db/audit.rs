//! Append-only audit log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use studyshala_audit::{AuditEntry, AuditError, AuditSink, RequestOrigin};
use tracing::instrument;

use super::decode;

/// Row type for audit queries.
#[derive(FromRow)]
struct AuditRow {
    id: String,
    actor_id: Option<String>,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: serde_json::Value,
    ip: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditEntry, sqlx::Error> {
        let actor = self
            .actor_id
            .as_deref()
            .map(|id| decode("actor id", id))
            .transpose()?;
        let resource_type = self
            .resource_type
            .as_deref()
            .map(|tag| decode("resource type", tag))
            .transpose()?;

        Ok(AuditEntry::with_all_fields(
            decode("audit id", &self.id)?,
            actor,
            decode("action", &self.action)?,
            resource_type,
            self.resource_id,
            self.details,
            RequestOrigin::new(self.ip, self.user_agent),
            self.created_at,
        ))
    }
}

/// Postgres-backed [`AuditSink`].
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLog {
    #[instrument(skip(self, entry), fields(action = %entry.action()))]
    async fn append(&self, entry: AuditEntry) -> Result<(), Report<AuditError>> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, actor_id, action, resource_type, resource_id, details, ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id().to_string())
        .bind(entry.actor_id().map(|id| id.to_string()))
        .bind(entry.action().as_str())
        .bind(entry.resource_type().map(|kind| kind.as_str()))
        .bind(entry.resource_id())
        .bind(entry.detail_payload())
        .bind(entry.request_origin().ip.as_deref())
        .bind(entry.request_origin().user_agent.as_deref())
        .bind(entry.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::StoreFailed {
            details: e.to_string(),
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, Report<AuditError>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, actor_id, action, resource_type, resource_id, details, ip, user_agent, created_at
            FROM audit_log
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::StoreFailed {
            details: e.to_string(),
        })?;

        rows.into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                AuditError::Corrupt {
                    details: e.to_string(),
                }
                .into()
            })
    }
}
