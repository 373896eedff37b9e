//! Google Drive v3 file provider.
//!
//! The server acts as a single Drive account. An access token is minted from
//! the configured refresh token and cached until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use oauth2::basic::BasicClient;
use oauth2::{ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::json;
use studyshala_materials::{
    DriveError, DriveProvider, DriveStream, IncomingFile, Permission, RemoteFile,
};
use tokio::sync::Mutex;

use crate::config::DriveConfig;

/// Google OAuth token URL.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct CachedToken {
    secret: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    web_view_link: Option<String>,
}

/// Drive provider backed by the Google Drive REST API.
pub struct GoogleDrive {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    root_folder_id: Option<String>,
    http_client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleDrive {
    /// Creates a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Unauthorized`] if credentials are missing.
    pub fn new(config: &DriveConfig) -> Result<Self, DriveError> {
        if config.client_id.is_empty()
            || config.client_secret.is_empty()
            || config.refresh_token.is_empty()
        {
            return Err(DriveError::Unauthorized {
                details: "drive client id, client secret and refresh token are required"
                    .to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DriveError::Transport {
                details: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
            root_folder_id: config.root_folder_id.clone(),
            http_client,
            token: Mutex::new(None),
        })
    }

    /// Returns a valid access token, refreshing it if needed.
    async fn access_token(&self) -> Result<String, DriveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.secret.clone());
            }
        }

        let token_url = TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).map_err(|e| {
            DriveError::Unauthorized {
                details: format!("invalid token URL: {e}"),
            }
        })?;
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_token_uri(token_url);

        let response = client
            .exchange_refresh_token(&RefreshToken::new(self.refresh_token.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| DriveError::Unauthorized {
                details: format!("token refresh failed: {e}"),
            })?;

        let secret = response.access_token().secret().clone();
        let lifetime = response.expires_in().unwrap_or(Duration::from_secs(3600));
        *cached = Some(CachedToken {
            secret: secret.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in = lifetime.as_secs(), "refreshed drive access token");
        Ok(secret)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        remote_id: Option<&str>,
    ) -> Result<reqwest::Response, DriveError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DriveError::Transport {
                details: e.to_string(),
            })?;
        check_status(response, remote_id).await
    }
}

/// Maps non-success statuses to [`DriveError`].
async fn check_status(
    response: reqwest::Response,
    remote_id: Option<&str>,
) -> Result<reqwest::Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let details = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), details, remote_id))
}

fn status_error(status: u16, details: String, remote_id: Option<&str>) -> DriveError {
    match (status, remote_id) {
        (401, _) => DriveError::Unauthorized { details },
        (404, Some(remote_id)) => DriveError::NotFound {
            remote_id: remote_id.to_string(),
        },
        _ => DriveError::Status { status, details },
    }
}

fn decode_error(e: reqwest::Error) -> DriveError {
    DriveError::Transport {
        details: format!("unexpected response body: {e}"),
    }
}

#[async_trait]
impl DriveProvider for GoogleDrive {
    fn is_enabled(&self) -> bool {
        true
    }

    #[tracing::instrument(skip(self))]
    async fn create_folder(&self, name: &str) -> Result<String, Report<DriveError>> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE });
        if let Some(parent) = &self.root_folder_id {
            metadata["parents"] = json!([parent]);
        }

        let request = self
            .http_client
            .post(FILES_URL)
            .query(&[("fields", "id")])
            .json(&metadata);
        let folder: DriveFile = self
            .send(request, None)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        tracing::info!(folder_id = %folder.id, "created drive folder");
        Ok(folder.id)
    }

    #[tracing::instrument(skip(self, file), fields(file = %file.name, size = file.size()))]
    async fn upload(
        &self,
        folder_id: &str,
        file: &IncomingFile,
    ) -> Result<RemoteFile, Report<DriveError>> {
        let metadata = json!({
            "name": file.name,
            "mimeType": file.media_type,
            "parents": [folder_id],
        });
        let request = self
            .http_client
            .post(FILES_URL)
            .query(&[("fields", "id")])
            .json(&metadata);
        let created: DriveFile = self
            .send(request, None)
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        let request = self
            .http_client
            .patch(format!("{UPLOAD_URL}/{}", created.id))
            .query(&[("uploadType", "media"), ("fields", "id,webViewLink")])
            .header(reqwest::header::CONTENT_TYPE, file.media_type.as_str())
            .body(file.bytes.clone());
        let uploaded: DriveFile = self
            .send(request, Some(&created.id))
            .await?
            .json()
            .await
            .map_err(decode_error)?;

        Ok(RemoteFile {
            id: uploaded.id,
            web_view_link: uploaded.web_view_link,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn share(
        &self,
        remote_id: &str,
        permission: Permission,
    ) -> Result<(), Report<DriveError>> {
        let request = self
            .http_client
            .post(format!("{FILES_URL}/{remote_id}/permissions"))
            .json(&json!({ "role": permission.drive_role(), "type": "anyone" }));
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, remote_id: &str) -> Result<(), Report<DriveError>> {
        let request = self.http_client.delete(format!("{FILES_URL}/{remote_id}"));
        self.send(request, Some(remote_id)).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn download(&self, remote_id: &str) -> Result<DriveStream, Report<DriveError>> {
        let request = self
            .http_client
            .get(format!("{FILES_URL}/{remote_id}"))
            .query(&[("alt", "media")]);
        let response = self.send(request, Some(remote_id)).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| DriveError::Transport {
                    details: e.to_string(),
                })
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_rejected() {
        let config = DriveConfig {
            enabled: true,
            client_id: "client".to_string(),
            ..DriveConfig::default()
        };
        assert!(matches!(
            GoogleDrive::new(&config),
            Err(DriveError::Unauthorized { .. })
        ));
    }

    #[test]
    fn statuses_map_to_drive_errors() {
        assert!(matches!(
            status_error(401, String::new(), None),
            DriveError::Unauthorized { .. }
        ));
        assert_eq!(
            status_error(404, String::new(), Some("abc")),
            DriveError::NotFound {
                remote_id: "abc".to_string()
            }
        );
        assert!(matches!(
            status_error(404, String::new(), None),
            DriveError::Status { status: 404, .. }
        ));
        assert!(matches!(
            status_error(500, "backend error".to_string(), Some("abc")),
            DriveError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn drive_file_reads_camel_case_fields() {
        let file: DriveFile =
            serde_json::from_str(r#"{"id":"1x","webViewLink":"https://drive.google.com/1x"}"#)
                .expect("decode");
        assert_eq!(file.id, "1x");
        assert_eq!(
            file.web_view_link.as_deref(),
            Some("https://drive.google.com/1x")
        );
    }
}
