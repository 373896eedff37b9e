//! The fixed vocabulary of audited actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Action tag recorded on every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    // Authentication
    Login,
    LoginBlocked,
    Logout,

    // Account management
    RoleChanged,
    SelfPromoted,
    UserActivated,
    UserDeactivated,
    UserRemoved,

    // Faculty operations
    FolderCreated,
    FolderDeleted,
    FilesUploaded,
    FileDeleted,

    // Student operations
    MaterialAccessed,
    MaterialSaved,
    MaterialUnsaved,
    FileDownloaded,
}

impl AuditAction {
    /// Every action, in declaration order.
    pub const ALL: [AuditAction; 16] = [
        Self::Login,
        Self::LoginBlocked,
        Self::Logout,
        Self::RoleChanged,
        Self::SelfPromoted,
        Self::UserActivated,
        Self::UserDeactivated,
        Self::UserRemoved,
        Self::FolderCreated,
        Self::FolderDeleted,
        Self::FilesUploaded,
        Self::FileDeleted,
        Self::MaterialAccessed,
        Self::MaterialSaved,
        Self::MaterialUnsaved,
        Self::FileDownloaded,
    ];

    /// Returns the stored tag for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::LoginBlocked => "login-blocked",
            Self::Logout => "logout",
            Self::RoleChanged => "role-changed",
            Self::SelfPromoted => "self-promoted",
            Self::UserActivated => "user-activated",
            Self::UserDeactivated => "user-deactivated",
            Self::UserRemoved => "user-removed",
            Self::FolderCreated => "folder-created",
            Self::FolderDeleted => "folder-deleted",
            Self::FilesUploaded => "files-uploaded",
            Self::FileDeleted => "file-deleted",
            Self::MaterialAccessed => "material-accessed",
            Self::MaterialSaved => "material-saved",
            Self::MaterialUnsaved => "material-unsaved",
            Self::FileDownloaded => "file-downloaded",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored tag is not in the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown audit tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for AuditAction {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownTag(s.to_string()))
    }
}

/// Kind of resource an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    User,
    Material,
    File,
}

impl ResourceType {
    /// Returns the stored tag for this resource type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Material => "material",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "material" => Ok(Self::Material),
            "file" => Ok(Self::File),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_parses_back_from_its_tag() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
    }

    #[test]
    fn serde_uses_the_stored_tag() {
        let json = serde_json::to_string(&AuditAction::MaterialAccessed).expect("serialize");
        assert_eq!(json, "\"material-accessed\"");
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = "material-renamed".parse::<AuditAction>().unwrap_err();
        assert!(err.to_string().contains("material-renamed"));
    }

    #[test]
    fn resource_type_round_trips_through_str() {
        for kind in [ResourceType::User, ResourceType::Material, ResourceType::File] {
            assert_eq!(kind.as_str().parse::<ResourceType>(), Ok(kind));
        }
    }
}
