//! Material operations for faculty and students.
//!
//! [`MaterialService`] ties the material registry, student libraries, the
//! remote drive, and the audit trail together. Multi-step operations are not
//! transactional: the primary write happens first and secondary effects
//! (counters, remote sharing, audit entries) follow on a best-effort basis.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::Serialize;
use studyshala_audit::{AuditAction, AuditEntry, AuditSink, RequestOrigin, ResourceType};
use studyshala_core::{FileId, MaterialId, UserId};

use crate::access_code::AccessCodeGenerator;
use crate::drive::{DriveProvider, DriveStream};
use crate::error::{MaterialError, StoreError};
use crate::material::{FileRecord, Material, NewMaterial, normalize_code};
use crate::store::{LibraryEntry, LibraryStore, MaterialStore};
use crate::upload::{IncomingFile, UploadPolicy};

/// Result of saving a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    AlreadySaved,
}

/// Result of unsaving a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsaveOutcome {
    Removed,
    NotSaved,
}

/// A successful redemption.
#[derive(Debug, Clone)]
pub struct Redemption {
    /// The material with its updated access counter.
    pub material: Material,
    /// True when this redemption created the history entry.
    pub first_access: bool,
}

/// A material in a student's history or saved list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub material: Material,
    pub at: DateTime<Utc>,
}

/// An opened download.
pub struct Download {
    pub file: FileRecord,
    pub stream: DriveStream,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Material operations.
pub struct MaterialService {
    materials: Arc<dyn MaterialStore>,
    library: Arc<dyn LibraryStore>,
    drive: Arc<dyn DriveProvider>,
    audit: Arc<dyn AuditSink>,
    codes: AccessCodeGenerator,
    uploads: UploadPolicy,
}

impl MaterialService {
    pub fn new(
        materials: Arc<dyn MaterialStore>,
        library: Arc<dyn LibraryStore>,
        drive: Arc<dyn DriveProvider>,
        audit: Arc<dyn AuditSink>,
        codes: AccessCodeGenerator,
        uploads: UploadPolicy,
    ) -> Self {
        Self {
            materials,
            library,
            drive,
            audit,
            codes,
            uploads,
        }
    }

    #[must_use]
    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.uploads
    }

    /// Creates a material owned by `owner` with a fresh access code.
    ///
    /// A candidate that passes the lookup can still lose a race with a
    /// concurrent create; the store's uniqueness conflict moves on to the
    /// next candidate.
    pub async fn create(
        &self,
        owner: UserId,
        draft: NewMaterial,
        origin: RequestOrigin,
    ) -> Result<Material, Report<MaterialError>> {
        let draft = draft.normalized()?;
        let material = self.insert_with_fresh_code(owner, draft).await?;

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::FolderCreated)
                    .actor(owner)
                    .resource(ResourceType::Material, material.id().to_string())
                    .details(serde_json::json!({
                        "subject": material.subject(),
                        "accessCode": material.access_code(),
                    }))
                    .origin(origin),
            )
            .await;
        tracing::info!(material_id = %material.id(), owner_id = %owner, "material created");
        Ok(material)
    }

    async fn insert_with_fresh_code(
        &self,
        owner: UserId,
        draft: NewMaterial,
    ) -> Result<Material, Report<MaterialError>> {
        for (attempt, candidate) in self.codes.candidates().enumerate() {
            let taken = self
                .materials
                .code_in_use(&candidate)
                .await
                .map_err(store_error)?;
            if taken {
                continue;
            }
            if attempt > 0 {
                tracing::debug!(attempt, len = candidate.len(), "access code collided");
            }
            let material = Material::new(owner, draft.clone(), candidate);
            match self.materials.insert(&material).await {
                Ok(()) => return Ok(material),
                Err(report) if matches!(report.current_context(), StoreError::Conflict { .. }) => {
                    tracing::debug!(attempt, error = %report, "access code taken concurrently");
                }
                Err(report) => return Err(store_error(report)),
            }
        }
        let attempts = self.codes.total_attempts();
        tracing::error!(attempts, "access code space exhausted");
        Err(MaterialError::CodeSpaceExhausted { attempts }.into())
    }

    /// Active materials owned by `owner`, newest first.
    pub async fn list_owned(&self, owner: UserId) -> Result<Vec<Material>, Report<MaterialError>> {
        self.materials.list_by_owner(owner).await.map_err(store_error)
    }

    /// Loads an active material owned by `owner`.
    ///
    /// Materials owned by someone else are reported as not found.
    pub async fn get_owned(
        &self,
        owner: UserId,
        id: MaterialId,
    ) -> Result<Material, Report<MaterialError>> {
        match self.materials.find(id).await.map_err(store_error)? {
            Some(material) if material.owner_id() == owner && material.is_active() => Ok(material),
            _ => Err(MaterialError::NotFound.into()),
        }
    }

    /// Soft-deletes a material. Files and student references are kept.
    pub async fn remove(
        &self,
        owner: UserId,
        id: MaterialId,
        origin: RequestOrigin,
    ) -> Result<(), Report<MaterialError>> {
        self.get_owned(owner, id).await?;
        self.materials.deactivate(id).await.map_err(store_error)?;
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::FolderDeleted)
                    .actor(owner)
                    .resource(ResourceType::Material, id.to_string())
                    .origin(origin),
            )
            .await;
        tracing::info!(material_id = %id, "material deactivated");
        Ok(())
    }

    /// Attaches a batch of files.
    ///
    /// The whole batch is validated before anything is stored. Each file that
    /// cannot be uploaded is still recorded, without a remote reference.
    pub async fn attach(
        &self,
        owner: UserId,
        id: MaterialId,
        files: Vec<IncomingFile>,
        origin: RequestOrigin,
    ) -> Result<Vec<FileRecord>, Report<MaterialError>> {
        self.uploads.validate(&files).map_err(MaterialError::Upload)?;
        let material = self.get_owned(owner, id).await?;
        let folder = self.ensure_folder(&material).await;

        let mut records = Vec::with_capacity(files.len());
        let mut stored_remotely = 0usize;
        for file in &files {
            let mut record =
                FileRecord::new(file.name.clone(), file.media_type.clone(), file.size(), owner);
            if let Some(folder_id) = folder.as_deref() {
                match self.drive.upload(folder_id, file).await {
                    Ok(remote) => {
                        if let Err(report) = self.drive.share(&remote.id, material.permission()).await
                        {
                            tracing::warn!(
                                remote_id = %remote.id,
                                error = %report,
                                "failed to set sharing permission"
                            );
                        }
                        record = record.with_remote(remote.id, remote.web_view_link);
                        stored_remotely += 1;
                    }
                    Err(report) => {
                        tracing::warn!(
                            material_id = %id,
                            file = %file.name,
                            error = %report,
                            "upload failed, keeping metadata only"
                        );
                    }
                }
            }
            self.materials
                .append_file(id, &record)
                .await
                .map_err(store_error)?;
            records.push(record);
        }

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::FilesUploaded)
                    .actor(owner)
                    .resource(ResourceType::Material, id.to_string())
                    .details(serde_json::json!({
                        "count": records.len(),
                        "storedRemotely": stored_remotely,
                    }))
                    .origin(origin),
            )
            .await;
        tracing::info!(material_id = %id, count = records.len(), stored_remotely, "files attached");
        Ok(records)
    }

    /// Returns the material's remote folder, creating it on first use.
    async fn ensure_folder(&self, material: &Material) -> Option<String> {
        if !self.drive.is_enabled() {
            tracing::warn!(material_id = %material.id(), "remote storage disabled, keeping metadata only");
            return None;
        }
        if let Some(folder_id) = material.remote_folder_id() {
            return Some(folder_id.to_string());
        }
        match self.drive.create_folder(&material.folder_name()).await {
            Ok(folder_id) => {
                if let Err(report) = self
                    .materials
                    .set_remote_folder(material.id(), &folder_id)
                    .await
                {
                    tracing::warn!(material_id = %material.id(), error = %report, "failed to record remote folder");
                }
                Some(folder_id)
            }
            Err(report) => {
                tracing::warn!(material_id = %material.id(), error = %report, "failed to create remote folder");
                None
            }
        }
    }

    /// Detaches a file. The remote copy is deleted on a best-effort basis.
    pub async fn detach(
        &self,
        owner: UserId,
        id: MaterialId,
        file_id: FileId,
        origin: RequestOrigin,
    ) -> Result<FileRecord, Report<MaterialError>> {
        self.get_owned(owner, id).await?;
        let record = self
            .materials
            .remove_file(id, file_id)
            .await
            .map_err(store_error)?
            .ok_or(MaterialError::FileNotFound)?;

        if let Some(remote_id) = record.remote_id() {
            if let Err(report) = self.drive.delete(remote_id).await {
                tracing::warn!(remote_id, error = %report, "failed to delete remote file");
            }
        }

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::FileDeleted)
                    .actor(owner)
                    .resource(ResourceType::File, file_id.to_string())
                    .details(serde_json::json!({
                        "materialId": id.to_string(),
                        "name": record.name(),
                    }))
                    .origin(origin),
            )
            .await;
        Ok(record)
    }

    /// Exchanges an access code for durable access to its material.
    ///
    /// Every call increments the access counter. The history entry is only
    /// created on the first call for a given student.
    pub async fn redeem(
        &self,
        student: UserId,
        code: &str,
        origin: RequestOrigin,
    ) -> Result<Redemption, Report<MaterialError>> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(MaterialError::InvalidInput {
                reason: "access code is required".to_string(),
            }
            .into());
        }

        let mut material = self
            .materials
            .find_active_by_code(&code)
            .await
            .map_err(store_error)?
            .ok_or(MaterialError::UnknownAccessCode)?;

        let first_access = self
            .library
            .add_history(student, material.id())
            .await
            .map_err(store_error)?;
        let count = self
            .materials
            .increment_access(material.id())
            .await
            .map_err(store_error)?;
        material.set_access_count(count);

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::MaterialAccessed)
                    .actor(student)
                    .resource(ResourceType::Material, material.id().to_string())
                    .details(serde_json::json!({
                        "accessCode": code,
                        "firstAccess": first_access,
                    }))
                    .origin(origin),
            )
            .await;
        Ok(Redemption {
            material,
            first_access,
        })
    }

    async fn active(&self, id: MaterialId) -> Result<Material, Report<MaterialError>> {
        match self.materials.find(id).await.map_err(store_error)? {
            Some(material) if material.is_active() => Ok(material),
            _ => Err(MaterialError::NotFound.into()),
        }
    }

    /// Adds a redeemed material to the student's saved list. Re-saving is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// [`MaterialError::NotAccessible`] if the student never redeemed the
    /// material's access code.
    pub async fn save(
        &self,
        student: UserId,
        id: MaterialId,
        origin: RequestOrigin,
    ) -> Result<SaveOutcome, Report<MaterialError>> {
        self.accessible(student, id).await?;
        if !self.library.save(student, id).await.map_err(store_error)? {
            return Ok(SaveOutcome::AlreadySaved);
        }
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::MaterialSaved)
                    .actor(student)
                    .resource(ResourceType::Material, id.to_string())
                    .origin(origin),
            )
            .await;
        Ok(SaveOutcome::Saved)
    }

    pub async fn unsave(
        &self,
        student: UserId,
        id: MaterialId,
        origin: RequestOrigin,
    ) -> Result<UnsaveOutcome, Report<MaterialError>> {
        if !self.library.unsave(student, id).await.map_err(store_error)? {
            return Ok(UnsaveOutcome::NotSaved);
        }
        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::MaterialUnsaved)
                    .actor(student)
                    .resource(ResourceType::Material, id.to_string())
                    .origin(origin),
            )
            .await;
        Ok(UnsaveOutcome::Removed)
    }

    /// The student's saved materials, newest first.
    pub async fn saved(&self, student: UserId) -> Result<Vec<LibraryItem>, Report<MaterialError>> {
        let entries = self.library.saved(student).await.map_err(store_error)?;
        self.resolve(entries).await
    }

    /// The student's redeemed materials, newest first.
    pub async fn history(&self, student: UserId) -> Result<Vec<LibraryItem>, Report<MaterialError>> {
        let entries = self.library.history(student).await.map_err(store_error)?;
        self.resolve(entries).await
    }

    async fn resolve(
        &self,
        entries: Vec<LibraryEntry>,
    ) -> Result<Vec<LibraryItem>, Report<MaterialError>> {
        let ids: Vec<MaterialId> = entries.iter().map(|e| e.material_id).collect();
        let materials = self.materials.find_many(&ids).await.map_err(store_error)?;
        // Entries whose material was hard-deleted are dropped.
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                materials
                    .iter()
                    .find(|m| m.id() == entry.material_id)
                    .map(|m| LibraryItem {
                        material: m.clone(),
                        at: entry.at,
                    })
            })
            .collect())
    }

    /// Loads an active material the student has redeemed.
    ///
    /// A saved list entry alone does not grant access.
    pub async fn accessible(
        &self,
        student: UserId,
        id: MaterialId,
    ) -> Result<Material, Report<MaterialError>> {
        let material = self.active(id).await?;
        if !self
            .library
            .has_redeemed(student, id)
            .await
            .map_err(store_error)?
        {
            return Err(MaterialError::NotAccessible.into());
        }
        Ok(material)
    }

    /// Opens a file for streaming to a student.
    pub async fn download(
        &self,
        student: UserId,
        id: MaterialId,
        file_id: FileId,
        origin: RequestOrigin,
    ) -> Result<Download, Report<MaterialError>> {
        let material = self.accessible(student, id).await?;
        let file = material
            .file(file_id)
            .cloned()
            .ok_or(MaterialError::FileNotFound)?;
        let remote_id = file.remote_id().ok_or(MaterialError::ContentUnavailable)?;

        let stream = self.drive.download(remote_id).await.map_err(|report| {
            tracing::error!(remote_id, error = %report, "remote download failed");
            MaterialError::Provider {
                details: report.current_context().to_string(),
            }
        })?;

        self.audit
            .append_or_warn(
                AuditEntry::new(AuditAction::FileDownloaded)
                    .actor(student)
                    .resource(ResourceType::File, file_id.to_string())
                    .details(serde_json::json!({ "materialId": id.to_string() }))
                    .origin(origin),
            )
            .await;
        Ok(Download { file, stream })
    }

    /// Hard-deletes every material owned by `owner`.
    pub async fn purge_owner(&self, owner: UserId) -> Result<u64, Report<MaterialError>> {
        let removed = self
            .materials
            .delete_by_owner(owner)
            .await
            .map_err(store_error)?;
        if removed > 0 {
            tracing::info!(owner_id = %owner, removed, "purged materials of removed account");
        }
        Ok(removed)
    }
}

fn store_error(report: Report<StoreError>) -> Report<MaterialError> {
    MaterialError::Store {
        details: report.current_context().to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::DisabledDrive;
    use crate::drive::fake::FakeDrive;
    use crate::material::Permission;
    use crate::store::memory::{MemoryLibrary, MemoryMaterials};
    use bytes::Bytes;
    use futures::StreamExt;
    use std::sync::atomic::Ordering;
    use studyshala_audit::MemoryAuditLog;

    struct Harness {
        materials: Arc<MemoryMaterials>,
        library: Arc<MemoryLibrary>,
        drive: Arc<FakeDrive>,
        audit: Arc<MemoryAuditLog>,
        service: MaterialService,
    }

    fn harness() -> Harness {
        harness_with(AccessCodeGenerator::default())
    }

    fn harness_with(codes: AccessCodeGenerator) -> Harness {
        let materials = Arc::new(MemoryMaterials::default());
        let library = Arc::new(MemoryLibrary::default());
        let drive = Arc::new(FakeDrive::default());
        let audit = Arc::new(MemoryAuditLog::new());
        let service = MaterialService::new(
            materials.clone(),
            library.clone(),
            drive.clone(),
            audit.clone(),
            codes,
            UploadPolicy::default(),
        );
        Harness {
            materials,
            library,
            drive,
            audit,
            service,
        }
    }

    fn algorithms() -> NewMaterial {
        NewMaterial {
            subject: "Algorithms".to_string(),
            department: "CSE".to_string(),
            semester: "3".to_string(),
            faculty_name: "Dr. Meera".to_string(),
            description: None,
            permission: Permission::Comment,
        }
    }

    fn origin() -> RequestOrigin {
        RequestOrigin::new(Some("127.0.0.1".to_string()), None)
    }

    fn pdf(name: &str) -> IncomingFile {
        IncomingFile::new(name, "application/pdf", Bytes::from_static(b"%PDF-1.7"))
    }

    #[tokio::test]
    async fn redeem_and_save_scenario() {
        let h = harness();
        let faculty = UserId::new();
        let student = UserId::new();

        let material = h
            .service
            .create(faculty, algorithms(), origin())
            .await
            .expect("create");
        let code = material.access_code().to_string();
        assert_eq!(code.len(), 8);

        let redemption = h
            .service
            .redeem(student, &code.to_lowercase(), origin())
            .await
            .expect("redeem");
        assert_eq!(redemption.material.subject(), "Algorithms");
        assert!(redemption.material.files().is_empty());
        assert_eq!(redemption.material.access_count(), 1);
        assert!(redemption.first_access);

        let history = h.service.history(student).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].material.id(), material.id());

        let first = h.service.save(student, material.id(), origin()).await.expect("save");
        assert_eq!(first, SaveOutcome::Saved);
        let second = h.service.save(student, material.id(), origin()).await.expect("save");
        assert_eq!(second, SaveOutcome::AlreadySaved);
        assert_eq!(h.service.saved(student).await.expect("saved").len(), 1);
        assert_eq!(h.audit.count(AuditAction::MaterialSaved), 1);
    }

    #[tokio::test]
    async fn repeated_redemption_counts_every_view_but_one_history_entry() {
        let h = harness();
        let student = UserId::new();
        let material = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .expect("create");

        h.service
            .redeem(student, material.access_code(), origin())
            .await
            .expect("first");
        let again = h
            .service
            .redeem(student, material.access_code(), origin())
            .await
            .expect("second");

        assert!(!again.first_access);
        assert_eq!(h.materials.get(material.id()).access_count(), 2);
        assert_eq!(h.library.history.lock().expect("lock").len(), 1);
        assert_eq!(h.audit.count(AuditAction::MaterialAccessed), 2);
    }

    #[tokio::test]
    async fn unknown_code_changes_nothing() {
        let h = harness();
        let err = h
            .service
            .redeem(UserId::new(), "FFFFFFFF", origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::UnknownAccessCode);
        assert!(h.library.history.lock().expect("lock").is_empty());
        assert_eq!(h.audit.count(AuditAction::MaterialAccessed), 0);
    }

    #[tokio::test]
    async fn retired_material_code_is_free_again() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        let code = material.access_code().to_string();

        h.service.remove(owner, material.id(), origin()).await.expect("remove");

        use crate::store::MaterialStore;
        assert!(!h.materials.code_in_use(&code).await.expect("lookup"));
        let err = h.service.redeem(UserId::new(), &code, origin()).await.unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::UnknownAccessCode);
    }

    #[tokio::test]
    async fn active_codes_are_unique() {
        let h = harness();
        let owner = UserId::new();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..50 {
            let material = h
                .service
                .create(owner, algorithms(), origin())
                .await
                .expect("create");
            assert!(codes.insert(material.access_code().to_string()));
        }
    }

    #[tokio::test]
    async fn generator_widens_after_repeated_collisions() {
        let h = harness_with(AccessCodeGenerator::new(4));
        h.materials.forced_collisions.store(4, Ordering::SeqCst);

        let material = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .expect("create");
        assert_eq!(material.access_code().len(), 12);
    }

    #[tokio::test]
    async fn insert_conflict_moves_to_the_next_code() {
        let h = harness();
        h.materials.forced_insert_conflicts.store(2, Ordering::SeqCst);

        let material = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .expect("create");

        assert_eq!(h.materials.forced_insert_conflicts.load(Ordering::SeqCst), 0);
        assert_eq!(h.materials.get(material.id()).access_code(), material.access_code());
        assert_eq!(h.materials.materials.lock().expect("lock").len(), 1);
        assert_eq!(h.audit.count(AuditAction::FolderCreated), 1);
    }

    #[tokio::test]
    async fn persistent_insert_conflicts_exhaust_the_code_space() {
        let h = harness_with(AccessCodeGenerator::new(1));
        h.materials.forced_insert_conflicts.store(2, Ordering::SeqCst);

        let err = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .unwrap_err();
        assert_eq!(
            *err.current_context(),
            MaterialError::CodeSpaceExhausted { attempts: 2 }
        );
        assert!(h.materials.materials.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn generator_fails_loudly_past_the_cap() {
        let h = harness_with(AccessCodeGenerator::new(2));
        h.materials.forced_collisions.store(4, Ordering::SeqCst);

        let err = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .unwrap_err();
        assert_eq!(
            *err.current_context(),
            MaterialError::CodeSpaceExhausted { attempts: 4 }
        );
        assert!(h.materials.materials.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn legacy_code_still_redeems() {
        let h = harness();
        let owner = UserId::new();
        let now = Utc::now();
        let material = Material::with_all_fields(
            MaterialId::new(),
            owner,
            "Networks".to_string(),
            "ECE".to_string(),
            "5".to_string(),
            "Prof. Rao".to_string(),
            None,
            Permission::View,
            "AB12CD34".to_string(),
            Some("LEGACY01".to_string()),
            None,
            true,
            0,
            Vec::new(),
            now,
            now,
        );
        h.materials
            .materials
            .lock()
            .expect("lock")
            .insert(material.id(), material.clone());

        let redemption = h
            .service
            .redeem(UserId::new(), " legacy01 ", origin())
            .await
            .expect("redeem");
        assert_eq!(redemption.material.id(), material.id());
    }

    #[tokio::test]
    async fn attach_uploads_and_shares_with_material_permission() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");

        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("week1.pdf"), pdf("week2.pdf")], origin())
            .await
            .expect("attach");

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.remote_id().is_some()));
        assert_eq!(h.drive.folders.lock().expect("lock").len(), 1);
        let objects = h.drive.objects.lock().expect("lock");
        assert!(objects.values().all(|(_, p)| *p == Permission::Comment));
        drop(objects);

        let stored = h.materials.get(material.id());
        assert_eq!(stored.files().len(), 2);
        assert!(stored.remote_folder_id().is_some());
        assert_eq!(h.audit.count(AuditAction::FilesUploaded), 1);

        // Second batch reuses the folder.
        h.service
            .attach(owner, material.id(), vec![pdf("week3.pdf")], origin())
            .await
            .expect("attach");
        assert_eq!(h.drive.folders.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn failed_upload_degrades_to_metadata_only() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        h.drive.fail_uploads.store(true, Ordering::SeqCst);

        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("notes.pdf")], origin())
            .await
            .expect("attach");
        assert_eq!(records.len(), 1);
        assert!(records[0].remote_id().is_none());
        assert_eq!(records[0].size(), 8);
    }

    #[tokio::test]
    async fn share_failure_keeps_the_remote_reference() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        h.drive.fail_shares.store(true, Ordering::SeqCst);

        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("notes.pdf")], origin())
            .await
            .expect("attach");
        assert!(records[0].remote_id().is_some());
    }

    #[tokio::test]
    async fn disabled_drive_records_metadata_only() {
        let materials = Arc::new(MemoryMaterials::default());
        let service = MaterialService::new(
            materials.clone(),
            Arc::new(MemoryLibrary::default()),
            Arc::new(DisabledDrive),
            Arc::new(MemoryAuditLog::new()),
            AccessCodeGenerator::default(),
            UploadPolicy::default(),
        );
        let owner = UserId::new();
        let material = service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        let records = service
            .attach(owner, material.id(), vec![pdf("a.pdf")], origin())
            .await
            .expect("attach");
        assert!(records[0].remote_id().is_none());
        assert!(materials.get(material.id()).remote_folder_id().is_none());
    }

    #[tokio::test]
    async fn invalid_batch_is_rejected_before_any_upload() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");

        let bad = IncomingFile::new("setup.exe", "application/octet-stream", Bytes::new());
        let err = h
            .service
            .attach(owner, material.id(), vec![pdf("ok.pdf"), bad], origin())
            .await
            .unwrap_err();
        assert!(matches!(err.current_context(), MaterialError::Upload(_)));
        assert!(h.drive.folders.lock().expect("lock").is_empty());
        assert!(h.materials.get(material.id()).files().is_empty());
    }

    #[tokio::test]
    async fn only_the_owner_can_modify() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");

        let intruder = UserId::new();
        let err = h
            .service
            .attach(intruder, material.id(), vec![pdf("x.pdf")], origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotFound);
        assert!(h.service.remove(intruder, material.id(), origin()).await.is_err());
        assert!(h.materials.get(material.id()).is_active());
    }

    #[tokio::test]
    async fn detach_removes_record_and_remote_copy() {
        let h = harness();
        let owner = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("a.pdf")], origin())
            .await
            .expect("attach");

        let removed = h
            .service
            .detach(owner, material.id(), records[0].id(), origin())
            .await
            .expect("detach");
        assert_eq!(removed.id(), records[0].id());
        assert!(h.materials.get(material.id()).files().is_empty());
        assert_eq!(h.drive.deleted.lock().expect("lock").len(), 1);

        let err = h
            .service
            .detach(owner, material.id(), records[0].id(), origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::FileNotFound);
    }

    #[tokio::test]
    async fn soft_deleted_material_stays_in_saved_list() {
        let h = harness();
        let owner = UserId::new();
        let student = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        h.service
            .redeem(student, material.access_code(), origin())
            .await
            .expect("redeem");
        h.service.save(student, material.id(), origin()).await.expect("save");
        h.service.remove(owner, material.id(), origin()).await.expect("remove");

        let saved = h.service.saved(student).await.expect("saved");
        assert_eq!(saved.len(), 1);
        assert!(!saved[0].material.is_active());

        assert_eq!(
            h.service.unsave(student, material.id(), origin()).await.expect("unsave"),
            UnsaveOutcome::Removed
        );
        assert_eq!(
            h.service.unsave(student, material.id(), origin()).await.expect("unsave"),
            UnsaveOutcome::NotSaved
        );
    }

    #[tokio::test]
    async fn download_requires_redemption_and_remote_copy() {
        let h = harness();
        let owner = UserId::new();
        let student = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("a.pdf")], origin())
            .await
            .expect("attach");
        let file_id = records[0].id();

        let err = h
            .service
            .download(student, material.id(), file_id, origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotAccessible);

        h.service
            .redeem(student, material.access_code(), origin())
            .await
            .expect("redeem");
        let download = h
            .service
            .download(student, material.id(), file_id, origin())
            .await
            .expect("download");
        assert_eq!(download.file.name(), "a.pdf");
        let chunks: Vec<_> = download.stream.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().expect("chunk").as_ref(), b"%PDF-1.7");
        assert_eq!(h.audit.count(AuditAction::FileDownloaded), 1);
    }

    #[tokio::test]
    async fn saving_without_redemption_is_refused() {
        let h = harness();
        let owner = UserId::new();
        let outsider = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("a.pdf")], origin())
            .await
            .expect("attach");

        let err = h
            .service
            .save(outsider, material.id(), origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotAccessible);
        assert!(h.library.saved.lock().expect("lock").is_empty());
        assert_eq!(h.audit.count(AuditAction::MaterialSaved), 0);

        let err = h.service.accessible(outsider, material.id()).await.unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotAccessible);
        let err = h
            .service
            .download(outsider, material.id(), records[0].id(), origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotAccessible);

        h.service
            .redeem(outsider, material.access_code(), origin())
            .await
            .expect("redeem");
        assert_eq!(
            h.service.save(outsider, material.id(), origin()).await.expect("save"),
            SaveOutcome::Saved
        );
    }

    #[tokio::test]
    async fn saved_entry_alone_does_not_grant_access() {
        let h = harness();
        let student = UserId::new();
        let material = h
            .service
            .create(UserId::new(), algorithms(), origin())
            .await
            .expect("create");
        h.library
            .save(student, material.id())
            .await
            .expect("seed saved entry");

        let err = h.service.accessible(student, material.id()).await.unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::NotAccessible);
    }

    #[tokio::test]
    async fn metadata_only_file_has_no_content() {
        let h = harness();
        let owner = UserId::new();
        let student = UserId::new();
        let material = h
            .service
            .create(owner, algorithms(), origin())
            .await
            .expect("create");
        h.drive.fail_uploads.store(true, Ordering::SeqCst);
        let records = h
            .service
            .attach(owner, material.id(), vec![pdf("a.pdf")], origin())
            .await
            .expect("attach");
        h.service
            .redeem(student, material.access_code(), origin())
            .await
            .expect("redeem");

        let err = h
            .service
            .download(student, material.id(), records[0].id(), origin())
            .await
            .unwrap_err();
        assert_eq!(*err.current_context(), MaterialError::ContentUnavailable);
    }

    #[tokio::test]
    async fn purge_owner_removes_only_their_materials() {
        let h = harness();
        let leaving = UserId::new();
        let staying = UserId::new();
        h.service.create(leaving, algorithms(), origin()).await.expect("create");
        h.service.create(leaving, algorithms(), origin()).await.expect("create");
        h.service.create(staying, algorithms(), origin()).await.expect("create");

        assert_eq!(h.service.purge_owner(leaving).await.expect("purge"), 2);
        assert_eq!(h.materials.materials.lock().expect("lock").len(), 1);
    }
}
