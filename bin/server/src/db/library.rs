//! Student saved lists and access history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use studyshala_core::{MaterialId, UserId};
use studyshala_materials::{LibraryEntry, LibraryStore, StoreError};
use tracing::instrument;

use super::{decode, materials_error};

#[derive(FromRow)]
struct EntryRow {
    material_id: String,
    at: DateTime<Utc>,
}

impl EntryRow {
    fn try_into_entry(self) -> Result<LibraryEntry, sqlx::Error> {
        Ok(LibraryEntry {
            material_id: decode("material id", &self.material_id)?,
            at: self.at,
        })
    }
}

fn entries(rows: Vec<EntryRow>) -> Result<Vec<LibraryEntry>, Report<StoreError>> {
    rows.into_iter()
        .map(EntryRow::try_into_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| materials_error(e).into())
}

/// Postgres-backed [`LibraryStore`].
pub struct PgLibraryStore {
    pool: PgPool,
}

impl PgLibraryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LibraryStore for PgLibraryStore {
    #[instrument(skip(self))]
    async fn add_history(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            INSERT INTO material_history (user_id, material_id, accessed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, material_id) DO NOTHING
            "#,
        )
        .bind(student.to_string())
        .bind(material.to_string())
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn history(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT material_id, accessed_at AS at
            FROM material_history
            WHERE user_id = $1
            ORDER BY accessed_at DESC
            "#,
        )
        .bind(student.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(materials_error)?;

        entries(rows)
    }

    #[instrument(skip(self))]
    async fn save(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            INSERT INTO saved_materials (user_id, material_id, saved_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, material_id) DO NOTHING
            "#,
        )
        .bind(student.to_string())
        .bind(material.to_string())
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn unsave(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM saved_materials
            WHERE user_id = $1 AND material_id = $2
            "#,
        )
        .bind(student.to_string())
        .bind(material.to_string())
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn saved(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT material_id, saved_at AS at
            FROM saved_materials
            WHERE user_id = $1
            ORDER BY saved_at DESC
            "#,
        )
        .bind(student.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(materials_error)?;

        entries(rows)
    }

    #[instrument(skip(self))]
    async fn has_redeemed(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>> {
        let redeemed: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM material_history WHERE user_id = $1 AND material_id = $2)",
        )
        .bind(student.to_string())
        .bind(material.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(redeemed)
    }
}
