//! Study materials for StudyShala.
//!
//! Faculty create materials (folders of files) and share them through short
//! access codes. Students redeem a code to gain durable access, can save
//! materials to a personal list, and download files streamed from the remote
//! drive.
//!
//! - [`material`]: the `Material` and `FileRecord` types
//! - [`access_code`]: bounded access-code candidates with a widening fallback
//! - [`upload`]: the upload policy checked before anything is stored
//! - [`drive`]: the remote file provider seam
//! - [`store`]: persistence traits for materials and student libraries
//! - [`service`]: the operations, with their audit entries

pub mod access_code;
pub mod drive;
pub mod error;
pub mod material;
pub mod service;
pub mod store;
pub mod upload;

pub use access_code::AccessCodeGenerator;
pub use drive::{DisabledDrive, DriveProvider, DriveStream, RemoteFile};
pub use error::{DriveError, MaterialError, StoreError};
pub use material::{FileRecord, Material, NewMaterial, Permission, normalize_code};
pub use service::{
    Download, LibraryItem, MaterialService, Redemption, SaveOutcome, UnsaveOutcome,
};
pub use store::{FacultyRank, LibraryEntry, LibraryStore, MaterialStore, MaterialTotals};
pub use upload::{IncomingFile, UploadPolicy, UploadViolation};
