//! Material repository.
//!
//! Materials live in `materials`; their file records live in
//! `material_files`, ordered by insertion.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use studyshala_core::{FileId, MaterialId, UserId};
use studyshala_materials::{
    FacultyRank, FileRecord, Material, MaterialStore, MaterialTotals, StoreError,
};
use tracing::instrument;

use super::{count, decode, materials_error};

const MATERIAL_COLUMNS: &str = "id, owner_id, subject, department, semester, faculty_name, \
     description, permission, access_code, legacy_code, remote_folder_id, active, \
     access_count, created_at, updated_at";

/// Row type for material queries.
#[derive(FromRow)]
struct MaterialRow {
    id: String,
    owner_id: String,
    subject: String,
    department: String,
    semester: String,
    faculty_name: String,
    description: Option<String>,
    permission: String,
    access_code: String,
    legacy_code: Option<String>,
    remote_folder_id: Option<String>,
    active: bool,
    access_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MaterialRow {
    fn try_into_material(self, files: Vec<FileRecord>) -> Result<Material, sqlx::Error> {
        Ok(Material::with_all_fields(
            decode("material id", &self.id)?,
            decode("owner id", &self.owner_id)?,
            self.subject,
            self.department,
            self.semester,
            self.faculty_name,
            self.description,
            decode("permission", &self.permission)?,
            self.access_code,
            self.legacy_code,
            self.remote_folder_id,
            self.active,
            count(self.access_count),
            files,
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Row type for file queries.
#[derive(FromRow)]
struct FileRow {
    id: String,
    material_id: String,
    name: String,
    media_type: String,
    size: i64,
    remote_id: Option<String>,
    web_view_link: Option<String>,
    uploaded_by: String,
    uploaded_at: DateTime<Utc>,
}

impl FileRow {
    fn try_into_file(self) -> Result<FileRecord, sqlx::Error> {
        Ok(FileRecord::with_all_fields(
            decode("file id", &self.id)?,
            self.name,
            self.media_type,
            count(self.size),
            self.remote_id,
            self.web_view_link,
            decode("uploader id", &self.uploaded_by)?,
            self.uploaded_at,
        ))
    }
}

#[derive(FromRow)]
struct TotalsRow {
    total: i64,
    active: i64,
    files: i64,
    accesses: i64,
}

#[derive(FromRow)]
struct FacultyRankRow {
    owner_id: String,
    faculty_name: String,
    materials: i64,
}

/// Postgres-backed [`MaterialStore`].
pub struct PgMaterialStore {
    pool: PgPool,
}

impl PgMaterialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the files of `rows` and assembles materials in row order.
    async fn assemble(&self, rows: Vec<MaterialRow>) -> Result<Vec<Material>, sqlx::Error> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();
        let file_rows: Vec<FileRow> = sqlx::query_as(
            r#"
            SELECT id, material_id, name, media_type, size, remote_id, web_view_link, uploaded_by, uploaded_at
            FROM material_files
            WHERE material_id = ANY($1)
            ORDER BY position
            "#,
        )
        .bind(ids.as_slice())
        .fetch_all(&self.pool)
        .await?;

        let mut files: HashMap<String, Vec<FileRecord>> = HashMap::new();
        for row in file_rows {
            let material_id = row.material_id.clone();
            files.entry(material_id).or_default().push(row.try_into_file()?);
        }

        rows.into_iter()
            .map(|row| {
                let attached = files.remove(&row.id).unwrap_or_default();
                row.try_into_material(attached)
            })
            .collect()
    }

    async fn fetch(&self, sql: &str, bind: Option<String>) -> Result<Vec<Material>, sqlx::Error> {
        let mut query = sqlx::query_as::<sqlx::Postgres, MaterialRow>(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        self.assemble(rows).await
    }
}

#[async_trait]
impl MaterialStore for PgMaterialStore {
    #[instrument(skip(self, material), fields(material_id = %material.id()))]
    async fn insert(&self, material: &Material) -> Result<(), Report<StoreError>> {
        let mut tx = self.pool.begin().await.map_err(materials_error)?;

        sqlx::query(
            r#"
            INSERT INTO materials (id, owner_id, subject, department, semester, faculty_name,
                description, permission, access_code, legacy_code, remote_folder_id, active,
                access_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(material.id().to_string())
        .bind(material.owner_id().to_string())
        .bind(material.subject())
        .bind(material.department())
        .bind(material.semester())
        .bind(material.faculty_name())
        .bind(material.description())
        .bind(material.permission().as_str())
        .bind(material.access_code())
        .bind(material.legacy_code())
        .bind(material.remote_folder_id())
        .bind(material.is_active())
        .bind(i64::try_from(material.access_count()).unwrap_or(i64::MAX))
        .bind(material.created_at())
        .bind(material.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(materials_error)?;

        for file in material.files() {
            insert_file(&mut *tx, material.id(), file)
                .await
                .map_err(materials_error)?;
        }

        tx.commit().await.map_err(materials_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find(&self, id: MaterialId) -> Result<Option<Material>, Report<StoreError>> {
        let sql = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1");
        let mut found = self
            .fetch(&sql, Some(id.to_string()))
            .await
            .map_err(materials_error)?;
        Ok(found.pop())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_many(&self, ids: &[MaterialId]) -> Result<Vec<Material>, Report<StoreError>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let sql = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = ANY($1)");
        let rows: Vec<MaterialRow> = sqlx::query_as(&sql)
            .bind(ids.as_slice())
            .fetch_all(&self.pool)
            .await
            .map_err(materials_error)?;
        Ok(self.assemble(rows).await.map_err(materials_error)?)
    }

    #[instrument(skip(self))]
    async fn find_active_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Material>, Report<StoreError>> {
        let sql = format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials \
             WHERE active AND (access_code = $1 OR legacy_code = $1) \
             ORDER BY (access_code = $1) DESC, created_at DESC LIMIT 1"
        );
        let mut found = self
            .fetch(&sql, Some(code.to_string()))
            .await
            .map_err(materials_error)?;
        Ok(found.pop())
    }

    #[instrument(skip(self))]
    async fn code_in_use(&self, code: &str) -> Result<bool, Report<StoreError>> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM materials
                WHERE active AND (access_code = $1 OR legacy_code = $1)
            )
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(in_use)
    }

    #[instrument(skip(self))]
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Material>, Report<StoreError>> {
        let sql = format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials \
             WHERE owner_id = $1 AND active ORDER BY created_at DESC"
        );
        Ok(self
            .fetch(&sql, Some(owner.to_string()))
            .await
            .map_err(materials_error)?)
    }

    #[instrument(skip(self))]
    async fn set_remote_folder(
        &self,
        id: MaterialId,
        folder_id: &str,
    ) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            UPDATE materials
            SET remote_folder_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(folder_id)
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(())
    }

    #[instrument(skip(self, file), fields(file_id = %file.id()))]
    async fn append_file(
        &self,
        id: MaterialId,
        file: &FileRecord,
    ) -> Result<(), Report<StoreError>> {
        let mut tx = self.pool.begin().await.map_err(materials_error)?;
        insert_file(&mut *tx, id, file)
            .await
            .map_err(materials_error)?;
        touch(&mut *tx, id).await.map_err(materials_error)?;
        tx.commit().await.map_err(materials_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_file(
        &self,
        id: MaterialId,
        file_id: FileId,
    ) -> Result<Option<FileRecord>, Report<StoreError>> {
        let mut tx = self.pool.begin().await.map_err(materials_error)?;
        let row: Option<FileRow> = sqlx::query_as(
            r#"
            DELETE FROM material_files
            WHERE id = $1 AND material_id = $2
            RETURNING id, material_id, name, media_type, size, remote_id, web_view_link, uploaded_by, uploaded_at
            "#,
        )
        .bind(file_id.to_string())
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(materials_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        touch(&mut *tx, id).await.map_err(materials_error)?;
        tx.commit().await.map_err(materials_error)?;

        Ok(Some(row.try_into_file().map_err(materials_error)?))
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, id: MaterialId) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            UPDATE materials
            SET active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_access(&self, id: MaterialId) -> Result<u64, Report<StoreError>> {
        let accesses: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE materials
            SET access_count = access_count + 1
            WHERE id = $1
            RETURNING access_count
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(accesses.map(count).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn delete_by_owner(&self, owner: UserId) -> Result<u64, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM materials
            WHERE owner_id = $1
            "#,
        )
        .bind(owner.to_string())
        .execute(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn totals(&self) -> Result<MaterialTotals, Report<StoreError>> {
        let row: TotalsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE active) AS active,
                (SELECT COUNT(*) FROM material_files) AS files,
                COALESCE(SUM(access_count), 0)::BIGINT AS accesses
            FROM materials
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(materials_error)?;

        Ok(MaterialTotals {
            total: count(row.total),
            active: count(row.active),
            files: count(row.files),
            accesses: count(row.accesses),
        })
    }

    #[instrument(skip(self))]
    async fn top_by_access(&self, limit: u32) -> Result<Vec<Material>, Report<StoreError>> {
        let sql = format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials \
             ORDER BY access_count DESC, created_at DESC LIMIT $1"
        );
        let rows: Vec<MaterialRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(materials_error)?;
        Ok(self.assemble(rows).await.map_err(materials_error)?)
    }

    #[instrument(skip(self))]
    async fn top_faculty(&self, limit: u32) -> Result<Vec<FacultyRank>, Report<StoreError>> {
        let rows: Vec<FacultyRankRow> = sqlx::query_as(
            r#"
            SELECT
                owner_id,
                (ARRAY_AGG(faculty_name ORDER BY created_at DESC))[1] AS faculty_name,
                COUNT(*) AS materials
            FROM materials
            GROUP BY owner_id
            ORDER BY materials DESC, owner_id
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(materials_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(FacultyRank {
                    owner_id: decode("owner id", &row.owner_id)?,
                    faculty_name: row.faculty_name,
                    materials: count(row.materials),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| materials_error(e).into())
    }
}

async fn insert_file(
    conn: &mut sqlx::PgConnection,
    material_id: MaterialId,
    file: &FileRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO material_files (id, material_id, name, media_type, size, remote_id,
            web_view_link, uploaded_by, uploaded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(file.id().to_string())
    .bind(material_id.to_string())
    .bind(file.name())
    .bind(file.media_type())
    .bind(i64::try_from(file.size()).unwrap_or(i64::MAX))
    .bind(file.remote_id())
    .bind(file.web_view_link())
    .bind(file.uploaded_by().to_string())
    .bind(file.uploaded_at())
    .execute(conn)
    .await?;

    Ok(())
}

async fn touch(conn: &mut sqlx::PgConnection, id: MaterialId) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE materials
        SET updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id.to_string())
    .execute(conn)
    .await?;

    Ok(())
}
