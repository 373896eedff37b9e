//! Material folders and their file records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studyshala_core::{FileId, MaterialId, UserId};

use crate::error::MaterialError;

/// How students may interact with a material's remote files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    View,
    Comment,
    Edit,
}

impl Permission {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Comment => "comment",
            Self::Edit => "edit",
        }
    }

    /// The sharing role granted on remote objects for this permission.
    #[must_use]
    pub fn drive_role(&self) -> &'static str {
        match self {
            Self::View => "reader",
            Self::Comment => "commenter",
            Self::Edit => "writer",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = MaterialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "comment" => Ok(Self::Comment),
            "edit" => Ok(Self::Edit),
            other => Err(MaterialError::InvalidInput {
                reason: format!("unknown permission '{other}'"),
            }),
        }
    }
}

/// Fields supplied by faculty when creating a material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMaterial {
    pub subject: String,
    pub department: String,
    pub semester: String,
    /// Display name shown to students. Independent of the owner's profile.
    pub faculty_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permission: Permission,
}

impl NewMaterial {
    /// Trims every field and rejects blanks.
    pub fn normalized(self) -> Result<Self, MaterialError> {
        fn required(field: &str, value: String) -> Result<String, MaterialError> {
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(MaterialError::InvalidInput {
                    reason: format!("{field} is required"),
                });
            }
            Ok(value)
        }

        Ok(Self {
            subject: required("subject", self.subject)?,
            department: required("department", self.department)?,
            semester: required("semester", self.semester)?,
            faculty_name: required("facultyName", self.faculty_name)?,
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            permission: self.permission,
        })
    }
}

/// A file attached to a material.
///
/// Files without a `remote_id` are metadata-only: the upload was skipped or
/// failed and there are no bytes to serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    id: FileId,
    name: String,
    media_type: String,
    size: u64,
    remote_id: Option<String>,
    web_view_link: Option<String>,
    uploaded_by: UserId,
    uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    #[must_use]
    pub fn new(name: String, media_type: String, size: u64, uploaded_by: UserId) -> Self {
        Self {
            id: FileId::new(),
            name,
            media_type,
            size,
            remote_id: None,
            web_view_link: None,
            uploaded_by,
            uploaded_at: Utc::now(),
        }
    }

    /// Creates a file record with all fields specified.
    ///
    /// Use this when reconstituting a record from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: FileId,
        name: String,
        media_type: String,
        size: u64,
        remote_id: Option<String>,
        web_view_link: Option<String>,
        uploaded_by: UserId,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            media_type,
            size,
            remote_id,
            web_view_link,
            uploaded_by,
            uploaded_at,
        }
    }

    /// Links the record to its remote copy.
    #[must_use]
    pub fn with_remote(mut self, remote_id: String, web_view_link: Option<String>) -> Self {
        self.remote_id = Some(remote_id);
        self.web_view_link = web_view_link;
        self
    }

    #[must_use]
    pub fn id(&self) -> FileId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    #[must_use]
    pub fn web_view_link(&self) -> Option<&str> {
        self.web_view_link.as_deref()
    }

    #[must_use]
    pub fn uploaded_by(&self) -> UserId {
        self.uploaded_by
    }

    #[must_use]
    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

/// A faculty-owned folder of files, unlocked by its access code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    id: MaterialId,
    owner_id: UserId,
    subject: String,
    department: String,
    semester: String,
    faculty_name: String,
    description: Option<String>,
    permission: Permission,
    /// Unique among active materials.
    access_code: String,
    /// Older code still accepted on redemption.
    legacy_code: Option<String>,
    remote_folder_id: Option<String>,
    active: bool,
    access_count: u64,
    files: Vec<FileRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Material {
    /// Creates an active material from validated input.
    #[must_use]
    pub fn new(owner_id: UserId, draft: NewMaterial, access_code: String) -> Self {
        let now = Utc::now();
        Self {
            id: MaterialId::new(),
            owner_id,
            subject: draft.subject,
            department: draft.department,
            semester: draft.semester,
            faculty_name: draft.faculty_name,
            description: draft.description,
            permission: draft.permission,
            access_code,
            legacy_code: None,
            remote_folder_id: None,
            active: true,
            access_count: 0,
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a material with all fields specified.
    ///
    /// Use this when reconstituting a material from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: MaterialId,
        owner_id: UserId,
        subject: String,
        department: String,
        semester: String,
        faculty_name: String,
        description: Option<String>,
        permission: Permission,
        access_code: String,
        legacy_code: Option<String>,
        remote_folder_id: Option<String>,
        active: bool,
        access_count: u64,
        files: Vec<FileRecord>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            subject,
            department,
            semester,
            faculty_name,
            description,
            permission,
            access_code,
            legacy_code,
            remote_folder_id,
            active,
            access_count,
            files,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> MaterialId {
        self.id
    }

    #[must_use]
    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn department(&self) -> &str {
        &self.department
    }

    #[must_use]
    pub fn semester(&self) -> &str {
        &self.semester
    }

    #[must_use]
    pub fn faculty_name(&self) -> &str {
        &self.faculty_name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    #[must_use]
    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    #[must_use]
    pub fn legacy_code(&self) -> Option<&str> {
        self.legacy_code.as_deref()
    }

    #[must_use]
    pub fn remote_folder_id(&self) -> Option<&str> {
        self.remote_folder_id.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    #[must_use]
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    #[must_use]
    pub fn file(&self, id: FileId) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id() == id)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if `code` is this material's primary or legacy code.
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        self.access_code == code || self.legacy_code.as_deref() == Some(code)
    }

    /// Name of the remote folder holding this material's files.
    #[must_use]
    pub fn folder_name(&self) -> String {
        format!(
            "{} - {} - Sem {} ({})",
            self.subject, self.department, self.semester, self.access_code
        )
    }

    pub fn set_remote_folder(&mut self, folder_id: String) {
        self.remote_folder_id = Some(folder_id);
        self.updated_at = Utc::now();
    }

    pub fn set_access_count(&mut self, count: u64) {
        self.access_count = count;
    }

    pub fn push_file(&mut self, file: FileRecord) {
        self.files.push(file);
        self.updated_at = Utc::now();
    }

    /// Detaches a file record, returning it if it was attached.
    pub fn take_file(&mut self, id: FileId) -> Option<FileRecord> {
        let index = self.files.iter().position(|f| f.id() == id)?;
        self.updated_at = Utc::now();
        Some(self.files.remove(index))
    }

    /// Soft-deletes the material. Files and student references are kept.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }
}

/// Normalizes a user-typed access code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
