//! Error types for the materials crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `MaterialError`: a material operation could not be completed
//! - `StoreError`: the material registry or library store failed
//! - `DriveError`: the remote file provider failed

use std::fmt;

use crate::upload::UploadViolation;

/// Errors from material operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialError {
    /// A required field was missing or malformed.
    InvalidInput { reason: String },
    /// An upload batch broke the upload policy.
    Upload(UploadViolation),
    /// No active material with this id is visible to the caller.
    NotFound,
    /// The material has no file with this id.
    FileNotFound,
    /// No active material carries this access code.
    UnknownAccessCode,
    /// The student has not redeemed the material's access code.
    NotAccessible,
    /// The file has no remote copy to stream.
    ContentUnavailable,
    /// The remote provider failed while serving primary content.
    Provider { details: String },
    /// Every candidate access code collided.
    CodeSpaceExhausted { attempts: u32 },
    /// A store call failed.
    Store { details: String },
}

impl fmt::Display for MaterialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            Self::Upload(violation) => write!(f, "upload rejected: {violation}"),
            Self::NotFound => write!(f, "material not found"),
            Self::FileNotFound => write!(f, "file not found"),
            Self::UnknownAccessCode => write!(f, "invalid access code"),
            Self::NotAccessible => write!(f, "material has not been unlocked"),
            Self::ContentUnavailable => write!(f, "content not available"),
            Self::Provider { details } => write!(f, "file provider failed: {details}"),
            Self::CodeSpaceExhausted { attempts } => {
                write!(f, "no free access code after {attempts} attempts")
            }
            Self::Store { details } => write!(f, "store failed: {details}"),
        }
    }
}

impl std::error::Error for MaterialError {}

/// Errors from the material and library stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Unavailable { details: String },
    Conflict { details: String },
    Corrupt { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::Conflict { details } => write!(f, "store conflict: {details}"),
            Self::Corrupt { details } => write!(f, "corrupt row: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the remote file provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveError {
    /// Remote storage is switched off in configuration.
    Disabled,
    /// The provider rejected our credentials.
    Unauthorized { details: String },
    /// The remote object does not exist.
    NotFound { remote_id: String },
    /// The provider answered with an unexpected status.
    Status { status: u16, details: String },
    /// The request never completed.
    Transport { details: String },
}

impl fmt::Display for DriveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "remote storage is disabled"),
            Self::Unauthorized { details } => write!(f, "drive authorization failed: {details}"),
            Self::NotFound { remote_id } => write!(f, "remote object {remote_id} not found"),
            Self::Status { status, details } => {
                write!(f, "drive returned status {status}: {details}")
            }
            Self::Transport { details } => write!(f, "drive request failed: {details}"),
        }
    }
}

impl std::error::Error for DriveError {}
