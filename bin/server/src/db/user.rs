//! Account repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool};
use studyshala_core::UserId;
use studyshala_platform_access::{Page, RoleCounts, StoreError, User, UserFilter, UserStore};
use tracing::instrument;

use super::{count, decode, platform_error};

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    external_id: String,
    name: String,
    email: String,
    avatar: Option<String>,
    role: String,
    active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, sqlx::Error> {
        Ok(User::with_all_fields(
            decode("user id", &self.id)?,
            self.external_id,
            self.name,
            self.email,
            self.avatar,
            decode("role", &self.role)?,
            self.active,
            self.last_login,
            self.created_at,
            self.updated_at,
        ))
    }
}

#[derive(FromRow)]
struct RoleCountRow {
    students: i64,
    faculty: i64,
    admins: i64,
    active: i64,
    inactive: i64,
}

/// Postgres-backed [`UserStore`].
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escapes LIKE wildcards and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Report<StoreError>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, external_id, name, email, avatar, role, active, last_login, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(row
            .map(UserRow::try_into_user)
            .transpose()
            .map_err(platform_error)?)
    }

    #[instrument(skip(self))]
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, Report<StoreError>> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, external_id, name, email, avatar, role, active, last_login, created_at, updated_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(row
            .map(UserRow::try_into_user)
            .transpose()
            .map_err(platform_error)?)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    async fn insert(&self, user: &User) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, name, email, avatar, role, active, last_login, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.external_id())
        .bind(user.name())
        .bind(user.email())
        .bind(user.avatar())
        .bind(user.role().as_str())
        .bind(user.is_active())
        .bind(user.last_login())
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(())
    }

    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    async fn update(&self, user: &User) -> Result<(), Report<StoreError>> {
        sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, avatar = $4, role = $5, active = $6, last_login = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.name())
        .bind(user.email())
        .bind(user.avatar())
        .bind(user.role().as_str())
        .bind(user.is_active())
        .bind(user.last_login())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: UserId) -> Result<bool, Report<StoreError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        filter: &UserFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<User>, Report<StoreError>> {
        let role = filter.role.map(|role| role.as_str());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(like_pattern);
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE ($1::TEXT IS NULL OR role = $1)
              AND ($2::BOOLEAN IS NULL OR active = $2)
              AND ($3::TEXT IS NULL OR name ILIKE $3 OR email ILIKE $3)
            "#,
        )
        .bind(role)
        .bind(filter.active)
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(platform_error)?;

        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, external_id, name, email, avatar, role, active, last_login, created_at, updated_at
            FROM users
            WHERE ($1::TEXT IS NULL OR role = $1)
              AND ($2::BOOLEAN IS NULL OR active = $2)
              AND ($3::TEXT IS NULL OR name ILIKE $3 OR email ILIKE $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(role)
        .bind(filter.active)
        .bind(search.as_deref())
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(platform_error)?;

        let items = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, _>>()
            .map_err(platform_error)?;

        Ok(Page {
            items,
            total: count(total),
            page,
            limit,
        })
    }

    #[instrument(skip(self))]
    async fn role_counts(&self) -> Result<RoleCounts, Report<StoreError>> {
        let row: RoleCountRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE role = 'student') AS students,
                COUNT(*) FILTER (WHERE role = 'faculty') AS faculty,
                COUNT(*) FILTER (WHERE role = 'admin') AS admins,
                COUNT(*) FILTER (WHERE active) AS active,
                COUNT(*) FILTER (WHERE NOT active) AS inactive
            FROM users
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(RoleCounts {
            students: count(row.students),
            faculty: count(row.faculty),
            admins: count(row.admins),
            active: count(row.active),
            inactive: count(row.inactive),
        })
    }

    #[instrument(skip(self))]
    async fn count_logged_in_since(&self, since: DateTime<Utc>) -> Result<u64, Report<StoreError>> {
        let logged_in: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE last_login >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(platform_error)?;

        Ok(count(logged_in))
    }
}
