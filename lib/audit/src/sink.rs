//! The append-only audit sink abstraction.

use async_trait::async_trait;
use rootcause::prelude::Report;

use crate::entry::AuditEntry;
use crate::error::AuditError;

/// Destination for audit entries.
///
/// There is intentionally no update or delete operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: AuditEntry) -> Result<(), Report<AuditError>>;

    /// Returns the most recent `limit` entries, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, Report<AuditError>>;

    /// Appends an entry, logging instead of failing.
    ///
    /// Callers use this after the primary operation has already been applied.
    async fn append_or_warn(&self, entry: AuditEntry) {
        let action = entry.action();
        if let Err(report) = self.append(entry).await {
            tracing::warn!(%action, error = %report, "failed to append audit entry");
        }
    }
}
