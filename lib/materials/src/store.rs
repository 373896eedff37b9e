//! Storage traits for materials and student libraries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use studyshala_core::{FileId, MaterialId, UserId};

use crate::error::StoreError;
use crate::material::{FileRecord, Material};

/// Aggregate material counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialTotals {
    pub total: u64,
    pub active: u64,
    pub files: u64,
    pub accesses: u64,
}

/// A faculty member ranked by how many materials they own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyRank {
    pub owner_id: UserId,
    pub faculty_name: String,
    pub materials: u64,
}

/// A material reference in a student's history or saved list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub material_id: MaterialId,
    pub at: DateTime<Utc>,
}

/// Persistence for materials and their embedded file records.
#[async_trait]
pub trait MaterialStore: Send + Sync {
    async fn insert(&self, material: &Material) -> Result<(), Report<StoreError>>;

    /// Loads a material, active or not, with its files.
    async fn find(&self, id: MaterialId) -> Result<Option<Material>, Report<StoreError>>;

    async fn find_many(&self, ids: &[MaterialId]) -> Result<Vec<Material>, Report<StoreError>>;

    /// Finds the active material whose primary or legacy code is `code`.
    async fn find_active_by_code(&self, code: &str)
    -> Result<Option<Material>, Report<StoreError>>;

    /// Returns true if an active material uses `code` as primary or legacy code.
    async fn code_in_use(&self, code: &str) -> Result<bool, Report<StoreError>>;

    /// Active materials owned by `owner`, newest first.
    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Material>, Report<StoreError>>;

    async fn set_remote_folder(
        &self,
        id: MaterialId,
        folder_id: &str,
    ) -> Result<(), Report<StoreError>>;

    async fn append_file(&self, id: MaterialId, file: &FileRecord)
    -> Result<(), Report<StoreError>>;

    /// Removes a file record and returns it, or `None` if it was not attached.
    async fn remove_file(
        &self,
        id: MaterialId,
        file_id: FileId,
    ) -> Result<Option<FileRecord>, Report<StoreError>>;

    async fn deactivate(&self, id: MaterialId) -> Result<(), Report<StoreError>>;

    /// Adds one to the access counter and returns the new value.
    async fn increment_access(&self, id: MaterialId) -> Result<u64, Report<StoreError>>;

    /// Hard-deletes every material owned by `owner`. Returns the number removed.
    async fn delete_by_owner(&self, owner: UserId) -> Result<u64, Report<StoreError>>;

    async fn totals(&self) -> Result<MaterialTotals, Report<StoreError>>;

    /// Materials with the highest access counters.
    async fn top_by_access(&self, limit: u32) -> Result<Vec<Material>, Report<StoreError>>;

    /// Owners with the most materials.
    async fn top_faculty(&self, limit: u32) -> Result<Vec<FacultyRank>, Report<StoreError>>;
}

/// Per-student access history and saved list.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Records first access. Returns false if an entry already existed.
    async fn add_history(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>>;

    /// History entries, newest first.
    async fn history(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>>;

    /// Returns false if the material was already saved.
    async fn save(&self, student: UserId, material: MaterialId)
    -> Result<bool, Report<StoreError>>;

    /// Returns false if the material was not saved.
    async fn unsave(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>>;

    /// Saved entries, newest first.
    async fn saved(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>>;

    /// Returns true if the student has a history entry for the material.
    async fn has_redeemed(
        &self,
        student: UserId,
        material: MaterialId,
    ) -> Result<bool, Report<StoreError>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod memory {
    //! In-memory stores for unit tests, also exported behind `test-util`.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    pub struct MemoryMaterials {
        pub materials: Mutex<HashMap<MaterialId, Material>>,
        /// Number of upcoming `code_in_use` calls that report a collision.
        pub forced_collisions: AtomicU32,
        /// Number of upcoming inserts rejected as a uniqueness conflict.
        pub forced_insert_conflicts: AtomicU32,
    }

    impl MemoryMaterials {
        pub fn get(&self, id: MaterialId) -> Material {
            self.materials
                .lock()
                .expect("lock")
                .get(&id)
                .cloned()
                .expect("material present")
        }

        fn with<T>(&self, id: MaterialId, f: impl FnOnce(&mut Material) -> T) -> Option<T> {
            self.materials.lock().expect("lock").get_mut(&id).map(f)
        }

        fn all(&self) -> Vec<Material> {
            self.materials.lock().expect("lock").values().cloned().collect()
        }
    }

    #[async_trait]
    impl MaterialStore for MemoryMaterials {
        async fn insert(&self, material: &Material) -> Result<(), Report<StoreError>> {
            if self
                .forced_insert_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict {
                    details: format!("access code {} already in use", material.access_code()),
                }
                .into());
            }
            self.materials
                .lock()
                .expect("lock")
                .insert(material.id(), material.clone());
            Ok(())
        }

        async fn find(&self, id: MaterialId) -> Result<Option<Material>, Report<StoreError>> {
            Ok(self.materials.lock().expect("lock").get(&id).cloned())
        }

        async fn find_many(
            &self,
            ids: &[MaterialId],
        ) -> Result<Vec<Material>, Report<StoreError>> {
            let materials = self.materials.lock().expect("lock");
            Ok(ids.iter().filter_map(|id| materials.get(id).cloned()).collect())
        }

        async fn find_active_by_code(
            &self,
            code: &str,
        ) -> Result<Option<Material>, Report<StoreError>> {
            Ok(self
                .all()
                .into_iter()
                .find(|m| m.is_active() && m.matches_code(code)))
        }

        async fn code_in_use(&self, code: &str) -> Result<bool, Report<StoreError>> {
            let forced = self
                .forced_collisions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(forced || self.find_active_by_code(code).await?.is_some())
        }

        async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Material>, Report<StoreError>> {
            let mut list: Vec<_> = self
                .all()
                .into_iter()
                .filter(|m| m.owner_id() == owner && m.is_active())
                .collect();
            list.sort_by_key(|m| std::cmp::Reverse(m.created_at()));
            Ok(list)
        }

        async fn set_remote_folder(
            &self,
            id: MaterialId,
            folder_id: &str,
        ) -> Result<(), Report<StoreError>> {
            self.with(id, |m| m.set_remote_folder(folder_id.to_string()));
            Ok(())
        }

        async fn append_file(
            &self,
            id: MaterialId,
            file: &FileRecord,
        ) -> Result<(), Report<StoreError>> {
            self.with(id, |m| m.push_file(file.clone()));
            Ok(())
        }

        async fn remove_file(
            &self,
            id: MaterialId,
            file_id: FileId,
        ) -> Result<Option<FileRecord>, Report<StoreError>> {
            Ok(self.with(id, |m| m.take_file(file_id)).flatten())
        }

        async fn deactivate(&self, id: MaterialId) -> Result<(), Report<StoreError>> {
            self.with(id, Material::deactivate);
            Ok(())
        }

        async fn increment_access(&self, id: MaterialId) -> Result<u64, Report<StoreError>> {
            Ok(self
                .with(id, |m| {
                    m.set_access_count(m.access_count() + 1);
                    m.access_count()
                })
                .unwrap_or(0))
        }

        async fn delete_by_owner(&self, owner: UserId) -> Result<u64, Report<StoreError>> {
            let mut materials = self.materials.lock().expect("lock");
            let before = materials.len();
            materials.retain(|_, m| m.owner_id() != owner);
            Ok((before - materials.len()) as u64)
        }

        async fn totals(&self) -> Result<MaterialTotals, Report<StoreError>> {
            let all = self.all();
            Ok(MaterialTotals {
                total: all.len() as u64,
                active: all.iter().filter(|m| m.is_active()).count() as u64,
                files: all.iter().map(|m| m.files().len() as u64).sum(),
                accesses: all.iter().map(Material::access_count).sum(),
            })
        }

        async fn top_by_access(&self, limit: u32) -> Result<Vec<Material>, Report<StoreError>> {
            let mut all = self.all();
            all.sort_by_key(|m| std::cmp::Reverse(m.access_count()));
            all.truncate(limit as usize);
            Ok(all)
        }

        async fn top_faculty(&self, limit: u32) -> Result<Vec<FacultyRank>, Report<StoreError>> {
            let mut counts: HashMap<UserId, FacultyRank> = HashMap::new();
            for m in self.all() {
                counts
                    .entry(m.owner_id())
                    .or_insert_with(|| FacultyRank {
                        owner_id: m.owner_id(),
                        faculty_name: m.faculty_name().to_string(),
                        materials: 0,
                    })
                    .materials += 1;
            }
            let mut ranks: Vec<_> = counts.into_values().collect();
            ranks.sort_by_key(|r| std::cmp::Reverse(r.materials));
            ranks.truncate(limit as usize);
            Ok(ranks)
        }
    }

    #[derive(Default)]
    pub struct MemoryLibrary {
        pub history: Mutex<Vec<(UserId, LibraryEntry)>>,
        pub saved: Mutex<Vec<(UserId, LibraryEntry)>>,
    }

    fn entries_for(list: &Mutex<Vec<(UserId, LibraryEntry)>>, student: UserId) -> Vec<LibraryEntry> {
        let mut entries: Vec<_> = list
            .lock()
            .expect("lock")
            .iter()
            .filter(|(s, _)| *s == student)
            .map(|(_, e)| *e)
            .collect();
        entries.reverse();
        entries
    }

    fn insert_once(
        list: &Mutex<Vec<(UserId, LibraryEntry)>>,
        student: UserId,
        material: MaterialId,
    ) -> bool {
        let mut list = list.lock().expect("lock");
        if list
            .iter()
            .any(|(s, e)| *s == student && e.material_id == material)
        {
            return false;
        }
        list.push((
            student,
            LibraryEntry {
                material_id: material,
                at: Utc::now(),
            },
        ));
        true
    }

    #[async_trait]
    impl LibraryStore for MemoryLibrary {
        async fn add_history(
            &self,
            student: UserId,
            material: MaterialId,
        ) -> Result<bool, Report<StoreError>> {
            Ok(insert_once(&self.history, student, material))
        }

        async fn history(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>> {
            Ok(entries_for(&self.history, student))
        }

        async fn save(
            &self,
            student: UserId,
            material: MaterialId,
        ) -> Result<bool, Report<StoreError>> {
            Ok(insert_once(&self.saved, student, material))
        }

        async fn unsave(
            &self,
            student: UserId,
            material: MaterialId,
        ) -> Result<bool, Report<StoreError>> {
            let mut saved = self.saved.lock().expect("lock");
            let before = saved.len();
            saved.retain(|(s, e)| !(*s == student && e.material_id == material));
            Ok(saved.len() < before)
        }

        async fn saved(&self, student: UserId) -> Result<Vec<LibraryEntry>, Report<StoreError>> {
            Ok(entries_for(&self.saved, student))
        }

        async fn has_redeemed(
            &self,
            student: UserId,
            material: MaterialId,
        ) -> Result<bool, Report<StoreError>> {
            Ok(self
                .history
                .lock()
                .expect("lock")
                .iter()
                .any(|(s, e)| *s == student && e.material_id == material))
        }
    }
}
