//! Remote file storage.
//!
//! Material files live in a remote drive, one folder per material. The
//! provider is optional: when it is disabled or failing, uploads degrade to
//! metadata-only records and downloads report that no content is available.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use rootcause::prelude::Report;

use crate::error::DriveError;
use crate::material::Permission;
use crate::upload::IncomingFile;

/// Byte stream of a remote file.
pub type DriveStream = BoxStream<'static, Result<Bytes, DriveError>>;

/// A file stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub web_view_link: Option<String>,
}

/// A remote file store.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Returns false when uploads should be skipped entirely.
    fn is_enabled(&self) -> bool;

    /// Creates a folder and returns its remote id.
    async fn create_folder(&self, name: &str) -> Result<String, Report<DriveError>>;

    /// Uploads `file` into `folder_id`.
    async fn upload(
        &self,
        folder_id: &str,
        file: &IncomingFile,
    ) -> Result<RemoteFile, Report<DriveError>>;

    /// Grants link-holders access matching `permission`.
    async fn share(&self, remote_id: &str, permission: Permission)
    -> Result<(), Report<DriveError>>;

    async fn delete(&self, remote_id: &str) -> Result<(), Report<DriveError>>;

    /// Opens a byte stream of the remote file.
    async fn download(&self, remote_id: &str) -> Result<DriveStream, Report<DriveError>>;
}

/// Provider used when remote storage is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledDrive;

#[async_trait]
impl DriveProvider for DisabledDrive {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn create_folder(&self, _name: &str) -> Result<String, Report<DriveError>> {
        Err(DriveError::Disabled.into())
    }

    async fn upload(
        &self,
        _folder_id: &str,
        _file: &IncomingFile,
    ) -> Result<RemoteFile, Report<DriveError>> {
        Err(DriveError::Disabled.into())
    }

    async fn share(
        &self,
        _remote_id: &str,
        _permission: Permission,
    ) -> Result<(), Report<DriveError>> {
        Err(DriveError::Disabled.into())
    }

    async fn delete(&self, _remote_id: &str) -> Result<(), Report<DriveError>> {
        Err(DriveError::Disabled.into())
    }

    async fn download(&self, _remote_id: &str) -> Result<DriveStream, Report<DriveError>> {
        Err(DriveError::Disabled.into())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scriptable provider for unit tests.

    use super::*;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    pub struct FakeDrive {
        pub fail_uploads: AtomicBool,
        pub fail_shares: AtomicBool,
        pub folders: Mutex<Vec<String>>,
        pub objects: Mutex<HashMap<String, (Bytes, Permission)>>,
        pub deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DriveProvider for FakeDrive {
        fn is_enabled(&self) -> bool {
            true
        }

        async fn create_folder(&self, name: &str) -> Result<String, Report<DriveError>> {
            let mut folders = self.folders.lock().expect("lock");
            folders.push(name.to_string());
            Ok(format!("folder-{}", folders.len()))
        }

        async fn upload(
            &self,
            folder_id: &str,
            file: &IncomingFile,
        ) -> Result<RemoteFile, Report<DriveError>> {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(DriveError::Status {
                    status: 500,
                    details: "backend error".to_string(),
                }
                .into());
            }
            let id = format!("{folder_id}/{}", file.name);
            self.objects
                .lock()
                .expect("lock")
                .insert(id.clone(), (file.bytes.clone(), Permission::View));
            Ok(RemoteFile {
                web_view_link: Some(format!("https://drive.example/{id}")),
                id,
            })
        }

        async fn share(
            &self,
            remote_id: &str,
            permission: Permission,
        ) -> Result<(), Report<DriveError>> {
            if self.fail_shares.load(Ordering::SeqCst) {
                return Err(DriveError::Transport {
                    details: "timeout".to_string(),
                }
                .into());
            }
            if let Some(entry) = self.objects.lock().expect("lock").get_mut(remote_id) {
                entry.1 = permission;
            }
            Ok(())
        }

        async fn delete(&self, remote_id: &str) -> Result<(), Report<DriveError>> {
            self.objects.lock().expect("lock").remove(remote_id);
            self.deleted.lock().expect("lock").push(remote_id.to_string());
            Ok(())
        }

        async fn download(&self, remote_id: &str) -> Result<DriveStream, Report<DriveError>> {
            let bytes = self
                .objects
                .lock()
                .expect("lock")
                .get(remote_id)
                .map(|(b, _)| b.clone())
                .ok_or_else(|| DriveError::NotFound {
                    remote_id: remote_id.to_string(),
                })?;
            Ok(futures::stream::iter([Ok(bytes)]).boxed())
        }
    }
}
