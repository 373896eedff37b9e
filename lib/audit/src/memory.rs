//! In-process audit log.
//!
//! Compiled for tests and behind the `test-util` feature. Entries are kept in
//! insertion order.

use async_trait::async_trait;
use rootcause::prelude::Report;
use std::sync::Mutex;

use crate::action::AuditAction;
use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::sink::AuditSink;

/// Audit sink backed by a vector.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every entry in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Counts entries carrying `action`.
    #[must_use]
    pub fn count(&self, action: AuditAction) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.action() == action)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), Report<AuditError>> {
        let mut entries = self.entries.lock().map_err(|e| AuditError::StoreFailed {
            details: e.to_string(),
        })?;
        entries.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, Report<AuditError>> {
        let entries = self.entries.lock().map_err(|e| AuditError::StoreFailed {
            details: e.to_string(),
        })?;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ResourceType;

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let log = MemoryAuditLog::new();
        log.append(AuditEntry::new(AuditAction::Login)).await.expect("append");
        log.append(AuditEntry::new(AuditAction::FolderCreated))
            .await
            .expect("append");
        log.append(AuditEntry::new(AuditAction::Logout)).await.expect("append");

        let recent = log.recent(2).await.expect("recent");
        let actions: Vec<_> = recent.iter().map(AuditEntry::action).collect();
        assert_eq!(actions, vec![AuditAction::Logout, AuditAction::FolderCreated]);
    }

    #[tokio::test]
    async fn append_or_warn_records_the_entry() {
        let log = MemoryAuditLog::new();
        log.append_or_warn(
            AuditEntry::new(AuditAction::MaterialSaved).resource(ResourceType::Material, "mat_x"),
        )
        .await;

        assert_eq!(log.count(AuditAction::MaterialSaved), 1);
        assert_eq!(log.entries()[0].resource_id(), Some("mat_x"));
    }
}
