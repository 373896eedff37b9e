//! Audit trail for StudyShala.
//!
//! Every user-visible action against accounts and materials is recorded as an
//! [`AuditEntry`]. Entries are append-only: the [`AuditSink`] trait has no
//! update or delete operation, and history is reconstructed by ordering
//! entries on their creation time.
//!
//! ```
//! use studyshala_audit::{AuditAction, AuditEntry, ResourceType};
//! use studyshala_core::{MaterialId, UserId};
//!
//! let entry = AuditEntry::new(AuditAction::MaterialAccessed)
//!     .actor(UserId::new())
//!     .resource(ResourceType::Material, MaterialId::new().to_string())
//!     .details(serde_json::json!({ "accessCode": "1A2B3C4D" }));
//!
//! assert_eq!(entry.action().as_str(), "material-accessed");
//! ```

pub mod action;
pub mod entry;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod sink;

pub use action::{AuditAction, ResourceType};
pub use entry::{AuditEntry, RequestOrigin};
pub use error::AuditError;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryAuditLog;
pub use sink::AuditSink;
