//! Admin analytics and account management.
//!
//! Analytics are read-only and recomputed on every call. Account changes are
//! explicit and audited; admin accounts cannot be deactivated or removed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use rootcause::prelude::Report;
use serde::Serialize;
use studyshala_audit::{AuditAction, AuditEntry, AuditSink, RequestOrigin, ResourceType};
use studyshala_core::UserId;
use studyshala_materials::{FacultyRank, MaterialService, MaterialStore, MaterialTotals};
use studyshala_platform_access::{
    Page, Role, RoleCounts, SessionStore, TransitionSource, User, UserFilter, UserStore,
};

/// Materials and faculty shown in the analytics rankings.
pub const TOP_N: u32 = 5;
/// Audit entries shown as recent activity.
pub const RECENT_ACTIVITY: u32 = 10;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Errors from admin operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    InvalidPage { reason: String },
    UserNotFound,
    /// Admin accounts cannot be deactivated or removed.
    AdminExempt,
    /// Admins cannot change their own role.
    OwnRole,
    Store { details: String },
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPage { reason } => write!(f, "invalid page: {reason}"),
            Self::UserNotFound => write!(f, "user not found"),
            Self::AdminExempt => write!(f, "admin accounts cannot be modified this way"),
            Self::OwnRole => write!(f, "admins cannot change their own role"),
            Self::Store { details } => write!(f, "store failed: {details}"),
        }
    }
}

impl std::error::Error for AdminError {}

fn store_error(details: impl fmt::Display) -> Report<AdminError> {
    AdminError::Store {
        details: details.to_string(),
    }
    .into()
}

/// Dashboard counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub users: UserStats,
    pub materials: MaterialTotals,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: u64,
    #[serde(flatten)]
    pub counts: RoleCounts,
}

/// A material in the access ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopMaterial {
    pub id: String,
    pub subject: String,
    pub department: String,
    pub semester: String,
    pub faculty_name: String,
    pub access_count: u64,
    pub active: bool,
}

/// Activity overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub top_materials: Vec<TopMaterial>,
    pub top_faculty: Vec<FacultyRank>,
    pub logins_today: u64,
    pub recent_activity: Vec<AuditEntry>,
}

/// Validated listing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Applies defaults and bounds: `page` >= 1, `limit` in 1..=100.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self, AdminError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(AdminError::InvalidPage {
                reason: "page must be at least 1".to_string(),
            });
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(AdminError::InvalidPage {
                reason: format!("limit must be between 1 and {MAX_PAGE_SIZE}"),
            });
        }
        Ok(Self { page, limit })
    }
}

/// Start of the current day in `now`'s time zone, as UTC.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| midnight.and_utc(), |start| start.with_timezone(&Utc))
}

/// Refuses changes that would touch an admin account.
fn ensure_not_admin(target: &User) -> Result<(), AdminError> {
    if target.role().is_admin() {
        return Err(AdminError::AdminExempt);
    }
    Ok(())
}

/// Admin-only reads and account changes.
pub struct AdminService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    materials: Arc<dyn MaterialStore>,
    material_service: Arc<MaterialService>,
    audit: Arc<dyn AuditSink>,
}

impl AdminService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        materials: Arc<dyn MaterialStore>,
        material_service: Arc<MaterialService>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            users,
            sessions,
            materials,
            material_service,
            audit,
        }
    }

    pub async fn stats(&self) -> Result<Stats, Report<AdminError>> {
        let counts = self.users.role_counts().await.map_err(store_error)?;
        let materials = self.materials.totals().await.map_err(store_error)?;
        Ok(Stats {
            users: UserStats {
                total: counts.total(),
                counts,
            },
            materials,
        })
    }

    pub async fn analytics(&self) -> Result<Analytics, Report<AdminError>> {
        let top_materials = self
            .materials
            .top_by_access(TOP_N)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|m| TopMaterial {
                id: m.id().to_string(),
                subject: m.subject().to_string(),
                department: m.department().to_string(),
                semester: m.semester().to_string(),
                faculty_name: m.faculty_name().to_string(),
                access_count: m.access_count(),
                active: m.is_active(),
            })
            .collect();
        let top_faculty = self
            .materials
            .top_faculty(TOP_N)
            .await
            .map_err(store_error)?;
        let logins_today = self
            .users
            .count_logged_in_since(start_of_day(&Local::now()))
            .await
            .map_err(store_error)?;
        let recent_activity = self
            .audit
            .recent(RECENT_ACTIVITY)
            .await
            .map_err(store_error)?;

        Ok(Analytics {
            top_materials,
            top_faculty,
            logins_today,
            recent_activity,
        })
    }

    pub async fn list_users(
        &self,
        filter: &UserFilter,
        request: PageRequest,
    ) -> Result<Page<User>, Report<AdminError>> {
        self.users
            .list(filter, request.page, request.limit)
            .await
            .map_err(store_error)
    }

    async fn target(&self, id: UserId) -> Result<User, Report<AdminError>> {
        self.users
            .find_by_id(id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AdminError::UserNotFound.into())
    }

    /// Activates or deactivates a non-admin account.
    ///
    /// Deactivation takes effect on the account's next request.
    pub async fn set_status(
        &self,
        actor: UserId,
        id: UserId,
        active: bool,
        origin: RequestOrigin,
    ) -> Result<User, Report<AdminError>> {
        let mut user = self.target(id).await?;
        ensure_not_admin(&user)?;
        if user.is_active() == active {
            return Ok(user);
        }

        user.set_active(active);
        self.users.update(&user).await.map_err(store_error)?;

        let action = if active {
            AuditAction::UserActivated
        } else {
            AuditAction::UserDeactivated
        };
        self.audit
            .append_or_warn(
                AuditEntry::new(action)
                    .actor(actor)
                    .resource(ResourceType::User, id.to_string())
                    .details(serde_json::json!({ "email": user.email() }))
                    .origin(origin),
            )
            .await;
        tracing::info!(user_id = %id, active, "account status changed");
        Ok(user)
    }

    /// Assigns a role to another account.
    pub async fn change_role(
        &self,
        actor: UserId,
        id: UserId,
        role: Role,
        origin: RequestOrigin,
    ) -> Result<User, Report<AdminError>> {
        if actor == id {
            return Err(AdminError::OwnRole.into());
        }
        let mut user = self.target(id).await?;
        let Some(transition) = user.transition_role(role, TransitionSource::Admin) else {
            return Ok(user);
        };
        self.users.update(&user).await.map_err(store_error)?;

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::RoleChanged)
                    .actor(actor)
                    .resource(ResourceType::User, id.to_string())
                    .details(transition.to_details())
                    .origin(origin),
            )
            .await;
        tracing::info!(user_id = %id, from = %transition.from, to = %transition.to, "role changed by admin");
        Ok(user)
    }

    /// Hard-deletes a non-admin account, its sessions, and its materials.
    pub async fn remove(
        &self,
        actor: UserId,
        id: UserId,
        origin: RequestOrigin,
    ) -> Result<User, Report<AdminError>> {
        let user = self.target(id).await?;
        ensure_not_admin(&user)?;

        let purged = self
            .material_service
            .purge_owner(id)
            .await
            .map_err(store_error)?;
        self.sessions
            .delete_all_for_user(id)
            .await
            .map_err(store_error)?;
        if !self.users.delete(id).await.map_err(store_error)? {
            return Err(AdminError::UserNotFound.into());
        }

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::UserRemoved)
                    .actor(actor)
                    .resource(ResourceType::User, id.to_string())
                    .details(serde_json::json!({
                        "email": user.email(),
                        "role": user.role(),
                        "materialsRemoved": purged,
                    }))
                    .origin(origin),
            )
            .await;
        tracing::info!(user_id = %id, materials_removed = purged, "account removed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use studyshala_audit::MemoryAuditLog;
    use studyshala_materials::store::memory::{MemoryLibrary, MemoryMaterials};
    use studyshala_materials::{
        AccessCodeGenerator, DisabledDrive, Material, NewMaterial, Permission, UploadPolicy,
    };
    use studyshala_platform_access::Session;
    use studyshala_platform_access::store::memory::{MemorySessions, MemoryUsers};

    struct Harness {
        users: Arc<MemoryUsers>,
        sessions: Arc<MemorySessions>,
        materials: Arc<MemoryMaterials>,
        audit: Arc<MemoryAuditLog>,
        material_service: Arc<MaterialService>,
        service: AdminService,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryUsers::default());
        let sessions = Arc::new(MemorySessions::default());
        let materials = Arc::new(MemoryMaterials::default());
        let audit = Arc::new(MemoryAuditLog::new());
        let material_service = Arc::new(MaterialService::new(
            materials.clone(),
            Arc::new(MemoryLibrary::default()),
            Arc::new(DisabledDrive),
            audit.clone(),
            AccessCodeGenerator::default(),
            UploadPolicy::default(),
        ));
        let service = AdminService::new(
            users.clone(),
            sessions.clone(),
            materials.clone(),
            material_service.clone(),
            audit.clone(),
        );
        Harness {
            users,
            sessions,
            materials,
            audit,
            material_service,
            service,
        }
    }

    fn account(h: &Harness, email: &str, role: Role) -> User {
        let user = User::new(
            format!("google-{email}"),
            email.to_string(),
            email.to_string(),
            role,
        );
        h.users.put(user.clone());
        user
    }

    fn origin() -> RequestOrigin {
        RequestOrigin::new(Some("10.0.0.9".to_string()), None)
    }

    async fn material(h: &Harness, owner: &User, subject: &str) -> Material {
        h.material_service
            .create(
                owner.id(),
                NewMaterial {
                    subject: subject.to_string(),
                    department: "CSE".to_string(),
                    semester: "5".to_string(),
                    faculty_name: owner.name().to_string(),
                    description: None,
                    permission: Permission::View,
                },
                origin(),
            )
            .await
            .expect("create")
    }

    fn stored(h: &Harness, id: UserId) -> Option<User> {
        h.users.snapshot().into_iter().find(|u| u.id() == id)
    }

    #[tokio::test]
    async fn admin_accounts_cannot_be_deactivated() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);
        let other = account(&h, "head@example.edu", Role::Admin);

        let err = h
            .service
            .set_status(actor.id(), other.id(), false, origin())
            .await
            .unwrap_err();

        assert_eq!(*err.current_context(), AdminError::AdminExempt);
        assert!(stored(&h, other.id()).expect("kept").is_active());
        assert_eq!(h.audit.count(AuditAction::UserDeactivated), 0);
    }

    #[tokio::test]
    async fn status_changes_are_audited_once() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);
        let student = account(&h, "asha@example.edu", Role::Student);

        let user = h
            .service
            .set_status(actor.id(), student.id(), false, origin())
            .await
            .expect("deactivate");
        assert!(!user.is_active());
        assert!(!stored(&h, student.id()).expect("kept").is_active());

        h.service
            .set_status(actor.id(), student.id(), false, origin())
            .await
            .expect("repeat");
        assert_eq!(h.audit.count(AuditAction::UserDeactivated), 1);
        let entry = h.audit.entries().into_iter().last().expect("entry");
        assert_eq!(entry.actor_id(), Some(actor.id()));
        assert_eq!(entry.resource_id(), Some(student.id().to_string().as_str()));
        assert_eq!(entry.detail_payload()["email"], "asha@example.edu");

        h.service
            .set_status(actor.id(), student.id(), true, origin())
            .await
            .expect("activate");
        assert!(stored(&h, student.id()).expect("kept").is_active());
        assert_eq!(h.audit.count(AuditAction::UserActivated), 1);
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);

        let err = h
            .service
            .set_status(actor.id(), UserId::new(), false, origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), AdminError::UserNotFound);

        let err = h
            .service
            .remove(actor.id(), UserId::new(), origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), AdminError::UserNotFound);
    }

    #[tokio::test]
    async fn admins_cannot_change_their_own_role() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);

        let err = h
            .service
            .change_role(actor.id(), actor.id(), Role::Student, origin())
            .await
            .unwrap_err();

        assert_eq!(*err.current_context(), AdminError::OwnRole);
        assert_eq!(stored(&h, actor.id()).expect("kept").role(), Role::Admin);
        assert_eq!(h.audit.count(AuditAction::RoleChanged), 0);
    }

    #[tokio::test]
    async fn role_change_is_recorded_as_a_transition() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);
        let student = account(&h, "ravi@example.edu", Role::Student);

        let user = h
            .service
            .change_role(actor.id(), student.id(), Role::Faculty, origin())
            .await
            .expect("change role");
        assert_eq!(user.role(), Role::Faculty);
        assert_eq!(stored(&h, student.id()).expect("kept").role(), Role::Faculty);

        let entry = h.audit.entries().into_iter().last().expect("entry");
        assert_eq!(entry.action(), AuditAction::RoleChanged);
        assert_eq!(entry.actor_id(), Some(actor.id()));
        assert_eq!(entry.detail_payload()["from"], "student");
        assert_eq!(entry.detail_payload()["to"], "faculty");
        assert_eq!(entry.detail_payload()["source"], "admin");

        h.service
            .change_role(actor.id(), student.id(), Role::Faculty, origin())
            .await
            .expect("same role");
        assert_eq!(h.audit.count(AuditAction::RoleChanged), 1);
    }

    #[tokio::test]
    async fn removing_faculty_purges_materials_and_sessions() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);
        let leaving = account(&h, "meera@example.edu", Role::Faculty);
        let staying = account(&h, "rao@example.edu", Role::Faculty);
        material(&h, &leaving, "Algorithms").await;
        material(&h, &leaving, "Compilers").await;
        let kept = material(&h, &staying, "Networks").await;
        for user in [&leaving, &leaving, &staying] {
            h.sessions
                .insert(&Session::new(user.id(), chrono::Duration::days(7)))
                .await
                .expect("session");
        }

        let removed = h
            .service
            .remove(actor.id(), leaving.id(), origin())
            .await
            .expect("remove");

        assert_eq!(removed.id(), leaving.id());
        assert!(stored(&h, leaving.id()).is_none());
        let sessions = h.sessions.sessions.lock().expect("lock");
        assert_eq!(sessions.len(), 1);
        assert!(sessions.values().all(|s| s.user_id() == staying.id()));
        drop(sessions);
        let materials = h.materials.materials.lock().expect("lock");
        assert_eq!(materials.len(), 1);
        assert!(materials.contains_key(&kept.id()));
        drop(materials);

        let entry = h.audit.entries().into_iter().last().expect("entry");
        assert_eq!(entry.action(), AuditAction::UserRemoved);
        assert_eq!(entry.detail_payload()["role"], "faculty");
        assert_eq!(entry.detail_payload()["materialsRemoved"], 2);
    }

    #[tokio::test]
    async fn admin_accounts_cannot_be_removed() {
        let h = harness();
        let actor = account(&h, "dean@example.edu", Role::Admin);
        let other = account(&h, "head@example.edu", Role::Admin);

        let err = h
            .service
            .remove(actor.id(), other.id(), origin())
            .await
            .unwrap_err();

        assert_eq!(*err.current_context(), AdminError::AdminExempt);
        assert!(stored(&h, other.id()).is_some());
        assert_eq!(h.audit.count(AuditAction::UserRemoved), 0);
    }

    #[tokio::test]
    async fn analytics_ranks_materials_and_lists_recent_activity() {
        let h = harness();
        let mut faculty = account(&h, "meera@example.edu", Role::Faculty);
        let other = account(&h, "rao@example.edu", Role::Faculty);
        let student = account(&h, "asha@example.edu", Role::Student);
        faculty.record_login();
        h.users.put(faculty.clone());

        let popular = material(&h, &faculty, "Algorithms").await;
        material(&h, &faculty, "Compilers").await;
        let quiet = material(&h, &other, "Networks").await;
        for _ in 0..3 {
            h.material_service
                .redeem(student.id(), popular.access_code(), origin())
                .await
                .expect("redeem");
        }
        h.material_service
            .redeem(student.id(), quiet.access_code(), origin())
            .await
            .expect("redeem");

        let analytics = h.service.analytics().await.expect("analytics");

        assert_eq!(analytics.top_materials[0].id, popular.id().to_string());
        assert_eq!(analytics.top_materials[0].access_count, 3);
        assert_eq!(analytics.top_materials[1].id, quiet.id().to_string());
        assert_eq!(analytics.top_faculty[0].owner_id, faculty.id());
        assert_eq!(analytics.top_faculty[0].materials, 2);
        assert_eq!(analytics.logins_today, 1);
        assert_eq!(analytics.recent_activity.len(), 7);
        assert_eq!(
            analytics.recent_activity[0].action(),
            AuditAction::MaterialAccessed
        );
        assert_eq!(
            analytics.recent_activity[6].action(),
            AuditAction::FolderCreated
        );
    }

    #[tokio::test]
    async fn recent_activity_is_capped() {
        let h = harness();
        let faculty = account(&h, "meera@example.edu", Role::Faculty);
        for i in 0..12 {
            material(&h, &faculty, &format!("Course {i}")).await;
        }

        let analytics = h.service.analytics().await.expect("analytics");

        assert_eq!(analytics.recent_activity.len(), RECENT_ACTIVITY as usize);
        assert_eq!(analytics.top_materials.len(), TOP_N as usize);
    }

    #[tokio::test]
    async fn stats_count_accounts_and_materials() {
        let h = harness();
        account(&h, "dean@example.edu", Role::Admin);
        let faculty = account(&h, "meera@example.edu", Role::Faculty);
        let mut student = account(&h, "asha@example.edu", Role::Student);
        student.set_active(false);
        h.users.put(student);
        material(&h, &faculty, "Algorithms").await;

        let stats = h.service.stats().await.expect("stats");

        assert_eq!(stats.users.total, 3);
        assert_eq!(stats.users.counts.admins, 1);
        assert_eq!(stats.users.counts.inactive, 1);
        assert_eq!(stats.materials.total, 1);
        assert_eq!(stats.materials.active, 1);
    }

    #[test]
    fn page_request_defaults() {
        assert_eq!(
            PageRequest::new(None, None),
            Ok(PageRequest { page: 1, limit: 20 })
        );
    }

    #[test]
    fn page_request_bounds() {
        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert_eq!(
            PageRequest::new(Some(3), Some(100)),
            Ok(PageRequest { page: 3, limit: 100 })
        );
    }

    #[test]
    fn start_of_day_uses_the_local_offset() {
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).expect("offset");
        let now = ist
            .with_ymd_and_hms(2024, 3, 10, 0, 30, 0)
            .single()
            .expect("time");

        let start = start_of_day(&now);

        let expected = Utc
            .with_ymd_and_hms(2024, 3, 9, 18, 30, 0)
            .single()
            .expect("time");
        assert_eq!(start, expected);
    }

    #[test]
    fn admins_are_exempt() {
        let admin = User::new(
            "google-1".to_string(),
            "dean@example.edu".to_string(),
            "Dean".to_string(),
            Role::Admin,
        );
        assert_eq!(ensure_not_admin(&admin), Err(AdminError::AdminExempt));

        let faculty = User::new(
            "google-2".to_string(),
            "prof@example.edu".to_string(),
            "Prof".to_string(),
            Role::Faculty,
        );
        assert_eq!(ensure_not_admin(&faculty), Ok(()));
    }

    #[test]
    fn user_stats_flatten_role_counts() {
        let counts = RoleCounts {
            students: 4,
            faculty: 2,
            admins: 1,
            active: 6,
            inactive: 1,
        };
        let json = serde_json::to_value(UserStats {
            total: counts.total(),
            counts,
        })
        .expect("serialize");
        assert_eq!(json["total"], 7);
        assert_eq!(json["students"], 4);
        assert_eq!(json["inactive"], 1);
    }
}
