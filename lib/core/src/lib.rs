//! Core domain types and utilities for StudyShala.
//!
//! This crate provides the strongly-typed identifiers and the error handling
//! foundation shared by every other StudyShala crate.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AuditEntryId, FileId, MaterialId, ParseIdError, SessionId, UserId};
