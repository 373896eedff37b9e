//! Audit entries and the request metadata attached to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studyshala_core::{AuditEntryId, UserId};

use crate::action::{AuditAction, ResourceType};

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    #[must_use]
    pub fn new(ip: Option<String>, user_agent: Option<String>) -> Self {
        Self { ip, user_agent }
    }
}

/// A single append-only audit record.
///
/// Built with the chained setters below and handed to an
/// [`AuditSink`](crate::AuditSink). Nothing mutates an entry after it is
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    id: AuditEntryId,
    actor: Option<UserId>,
    action: AuditAction,
    resource_type: Option<ResourceType>,
    resource_id: Option<String>,
    details: serde_json::Value,
    origin: RequestOrigin,
    created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Starts a new entry for `action`, stamped with the current time.
    #[must_use]
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor: None,
            action,
            resource_type: None,
            resource_id: None,
            details: serde_json::Value::Null,
            origin: RequestOrigin::default(),
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes an entry read back from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: AuditEntryId,
        actor: Option<UserId>,
        action: AuditAction,
        resource_type: Option<ResourceType>,
        resource_id: Option<String>,
        details: serde_json::Value,
        origin: RequestOrigin,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            actor,
            action,
            resource_type,
            resource_id,
            details,
            origin,
            created_at,
        }
    }

    #[must_use]
    pub fn actor(mut self, user_id: UserId) -> Self {
        self.actor = Some(user_id);
        self
    }

    #[must_use]
    pub fn resource(mut self, resource_type: ResourceType, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(resource_id.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn id(&self) -> AuditEntryId {
        self.id
    }

    #[must_use]
    pub fn actor_id(&self) -> Option<UserId> {
        self.actor
    }

    #[must_use]
    pub fn action(&self) -> AuditAction {
        self.action
    }

    #[must_use]
    pub fn resource_type(&self) -> Option<ResourceType> {
        self.resource_type
    }

    #[must_use]
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    #[must_use]
    pub fn detail_payload(&self) -> &serde_json::Value {
        &self.details
    }

    #[must_use]
    pub fn request_origin(&self) -> &RequestOrigin {
        &self.origin
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
