//! Postgres repositories for the StudyShala server.
//!
//! This module implements the library storage traits:
//! - Accounts and sessions ([`PgUserStore`], [`PgSessionStore`])
//! - Materials and their files ([`PgMaterialStore`])
//! - Student saved lists and access history ([`PgLibraryStore`])
//! - The audit trail ([`PgAuditLog`])

pub mod audit;
pub mod library;
pub mod material;
pub mod session;
pub mod user;

pub use audit::PgAuditLog;
pub use library::PgLibraryStore;
pub use material::PgMaterialStore;
pub use session::PgSessionStore;
pub use user::PgUserStore;

use std::fmt::Display;
use std::str::FromStr;

/// Parses a stored text column, reporting failures as decode errors.
fn decode<T>(column: &str, value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("invalid {column} '{value}': {e}"),
        )))
    })
}

/// Coarse classification shared by both store error types.
enum Failure {
    Conflict,
    Corrupt,
    Unavailable,
}

fn classify(error: &sqlx::Error) -> Failure {
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => Failure::Conflict,
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } => Failure::Corrupt,
        _ => Failure::Unavailable,
    }
}

fn platform_error(error: sqlx::Error) -> studyshala_platform_access::StoreError {
    use studyshala_platform_access::StoreError;
    let details = error.to_string();
    match classify(&error) {
        Failure::Conflict => StoreError::Conflict { details },
        Failure::Corrupt => StoreError::Corrupt { details },
        Failure::Unavailable => StoreError::Unavailable { details },
    }
}

fn materials_error(error: sqlx::Error) -> studyshala_materials::StoreError {
    use studyshala_materials::StoreError;
    let details = error.to_string();
    match classify(&error) {
        Failure::Conflict => StoreError::Conflict { details },
        Failure::Corrupt => StoreError::Corrupt { details },
        Failure::Unavailable => StoreError::Unavailable { details },
    }
}

/// Converts a count column to `u64`. Counts are never negative.
fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyshala_core::UserId;

    #[test]
    fn decode_accepts_prefixed_ids() {
        let id = UserId::new();
        let parsed: UserId = decode("user id", &id.to_string()).expect("decode");
        assert_eq!(parsed, id);
    }

    #[test]
    fn decode_failures_are_decode_errors() {
        let result: Result<UserId, _> = decode("user id", "not-an-id");
        let error = result.expect_err("should fail");
        assert!(matches!(error, sqlx::Error::Decode(_)));
        assert!(matches!(
            platform_error(error),
            studyshala_platform_access::StoreError::Corrupt { .. }
        ));
    }

    #[test]
    fn pool_failures_are_unavailable() {
        assert!(matches!(
            materials_error(sqlx::Error::PoolTimedOut),
            studyshala_materials::StoreError::Unavailable { .. }
        ));
    }
}
