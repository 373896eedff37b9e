//! Error types for the audit crate.

use std::fmt;

/// Errors from audit storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The backing store rejected or failed the write.
    StoreFailed { details: String },
    /// A stored entry could not be decoded.
    Corrupt { details: String },
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreFailed { details } => write!(f, "audit store failed: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt audit entry: {details}"),
        }
    }
}

impl std::error::Error for AuditError {}
