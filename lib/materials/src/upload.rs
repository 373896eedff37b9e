//! Upload batches and the rules they must satisfy.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A file received from faculty, before it is stored anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl IncomingFile {
    #[must_use]
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension after the last dot, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Why an upload batch was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadViolation {
    NoFiles,
    TooManyFiles { count: usize, max: usize },
    DisallowedType { name: String },
    TooLarge { name: String, size: u64, max: u64 },
}

impl fmt::Display for UploadViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFiles => write!(f, "no files uploaded"),
            Self::TooManyFiles { count, max } => {
                write!(f, "{count} files uploaded, at most {max} allowed")
            }
            Self::DisallowedType { name } => write!(f, "file type not allowed: {name}"),
            Self::TooLarge { name, size, max } => {
                write!(f, "{name} is {size} bytes, limit is {max}")
            }
        }
    }
}

impl std::error::Error for UploadViolation {}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_files() -> usize {
    10
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "txt", "png", "jpg", "jpeg", "zip",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Limits applied to every upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_files: default_max_files(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl UploadPolicy {
    /// Checks the whole batch. Nothing should be stored unless this passes.
    pub fn validate(&self, files: &[IncomingFile]) -> Result<(), UploadViolation> {
        if files.is_empty() {
            return Err(UploadViolation::NoFiles);
        }
        if files.len() > self.max_files {
            return Err(UploadViolation::TooManyFiles {
                count: files.len(),
                max: self.max_files,
            });
        }
        for file in files {
            let allowed = file
                .extension()
                .is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext));
            if !allowed {
                return Err(UploadViolation::DisallowedType {
                    name: file.name.clone(),
                });
            }
            if file.size() > self.max_file_bytes {
                return Err(UploadViolation::TooLarge {
                    name: file.name.clone(),
                    size: file.size(),
                    max: self.max_file_bytes,
                });
            }
        }
        Ok(())
    }

    /// Upper bound on a request body carrying a full batch.
    #[must_use]
    pub fn max_request_bytes(&self) -> usize {
        let files = self.max_files.max(1) as u64;
        // One MiB of headroom for multipart framing.
        usize::try_from(self.max_file_bytes.saturating_mul(files) + 1024 * 1024)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: usize) -> IncomingFile {
        IncomingFile::new(name, "application/octet-stream", Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file("Notes.PDF", 1).extension().as_deref(), Some("pdf"));
        assert_eq!(file("README", 1).extension(), None);
        assert_eq!(file(".pdf", 1).extension(), None);
    }

    #[test]
    fn accepts_allowed_batch() {
        let policy = UploadPolicy::default();
        assert!(policy.validate(&[file("a.pdf", 10), file("b.JPEG", 10)]).is_ok());
    }

    #[test]
    fn rejects_disallowed_extension_anywhere_in_batch() {
        let policy = UploadPolicy::default();
        let err = policy
            .validate(&[file("a.pdf", 10), file("run.exe", 10)])
            .unwrap_err();
        assert_eq!(
            err,
            UploadViolation::DisallowedType {
                name: "run.exe".to_string()
            }
        );
    }

    #[test]
    fn rejects_oversize_file() {
        let policy = UploadPolicy {
            max_file_bytes: 4,
            ..UploadPolicy::default()
        };
        assert!(matches!(
            policy.validate(&[file("a.txt", 5)]),
            Err(UploadViolation::TooLarge { size: 5, max: 4, .. })
        ));
    }

    #[test]
    fn rejects_too_many_and_empty_batches() {
        let policy = UploadPolicy::default();
        let many: Vec<_> = (0..11).map(|i| file(&format!("{i}.txt"), 1)).collect();
        assert!(matches!(
            policy.validate(&many),
            Err(UploadViolation::TooManyFiles { count: 11, max: 10 })
        ));
        assert_eq!(policy.validate(&[]), Err(UploadViolation::NoFiles));
    }
}
