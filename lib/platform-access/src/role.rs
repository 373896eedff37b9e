//! Roles, role guards, and role transitions.
//!
//! Every account holds exactly one [`Role`] at a time. Route handlers express
//! their requirements as a [`RoleGuard`], which is evaluated only after the
//! caller has been authenticated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role an account currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Redeems access codes and reads materials.
    #[default]
    Student,
    /// Creates materials and uploads files.
    Faculty,
    /// Oversees accounts and reads analytics.
    Admin,
}

impl Role {
    /// Returns the stored name of this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Faculty => "faculty",
            Self::Admin => "admin",
        }
    }

    /// Parses a role requested at login, falling back to student.
    ///
    /// Missing or unrecognised input never yields an elevated role.
    #[must_use]
    pub fn parse_or_default(requested: Option<&str>) -> Self {
        requested
            .and_then(|value| value.trim().to_ascii_lowercase().parse().ok())
            .unwrap_or_default()
    }

    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "faculty" => Ok(Self::Faculty),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A predicate over roles, checked after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleGuard {
    /// The caller must hold exactly this role.
    Exact(Role),
    /// The caller must hold one of these roles.
    AnyOf(&'static [Role]),
}

impl RoleGuard {
    /// Returns true if `role` satisfies the guard.
    #[must_use]
    pub fn permits(&self, role: Role) -> bool {
        match self {
            Self::Exact(required) => *required == role,
            Self::AnyOf(allowed) => allowed.contains(&role),
        }
    }
}

impl fmt::Display for RoleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(role) => write!(f, "{role}"),
            Self::AnyOf(roles) => {
                let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
                write!(f, "one of [{}]", names.join(", "))
            }
        }
    }
}

/// What caused a role to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionSource {
    /// The role chosen at the provider redirect differed from the stored one.
    Login,
    /// An administrator changed the role.
    Admin,
    /// An allow-listed user promoted themselves.
    SelfPromotion,
}

/// An applied change of role, recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTransition {
    pub from: Role,
    pub to: Role,
    pub source: TransitionSource,
}

impl RoleTransition {
    /// Audit payload describing this transition.
    #[must_use]
    pub fn to_details(&self) -> serde_json::Value {
        serde_json::json!({
            "from": self.from,
            "to": self.to,
            "source": self.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_is_admin() {
        assert!(!Role::Student.is_admin());
        assert!(!Role::Faculty.is_admin());
        assert!(Role::Admin.is_admin());
    }

    #[test]
    fn parse_or_default_accepts_known_roles() {
        assert_eq!(Role::parse_or_default(Some("faculty")), Role::Faculty);
        assert_eq!(Role::parse_or_default(Some(" ADMIN ")), Role::Admin);
    }

    #[test]
    fn parse_or_default_falls_back_to_student() {
        assert_eq!(Role::parse_or_default(None), Role::Student);
        assert_eq!(Role::parse_or_default(Some("superuser")), Role::Student);
        assert_eq!(Role::parse_or_default(Some("")), Role::Student);
    }

    #[test]
    fn exact_guard_only_permits_its_role() {
        let guard = RoleGuard::Exact(Role::Faculty);
        assert!(guard.permits(Role::Faculty));
        assert!(!guard.permits(Role::Student));
        assert!(!guard.permits(Role::Admin));
    }

    #[test]
    fn any_of_guard_permits_members() {
        let guard = RoleGuard::AnyOf(&[Role::Faculty, Role::Admin]);
        assert!(guard.permits(Role::Admin));
        assert!(guard.permits(Role::Faculty));
        assert!(!guard.permits(Role::Student));
        assert_eq!(guard.to_string(), "one of [faculty, admin]");
    }

    #[test]
    fn role_serialization_format() {
        let json = serde_json::to_string(&Role::Faculty).expect("serialize");
        assert_eq!(json, "\"faculty\"");
    }

    #[test]
    fn transition_details_name_both_roles() {
        let transition = RoleTransition {
            from: Role::Student,
            to: Role::Faculty,
            source: TransitionSource::Login,
        };
        let details = transition.to_details();
        assert_eq!(details["from"], "student");
        assert_eq!(details["to"], "faculty");
        assert_eq!(details["source"], "login");
    }
}
