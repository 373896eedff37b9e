//! Student access, library, and downloads.
//!
//! Students never see a material's access code, owner, or remote storage
//! references; responses go through [`MaterialView`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use studyshala_core::{FileId, MaterialId};
use studyshala_materials::{
    FileRecord, LibraryItem, Material, Permission, SaveOutcome, UnsaveOutcome,
};

use super::parse_id;
use crate::auth::RequireStudent;
use crate::error::ApiError;
use crate::origin::Origin;
use crate::state::AppState;

/// Routes mounted under `/api/student`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/access", post(access))
        .route("/materials/{id}/save", post(save).delete(unsave))
        .route("/saved", get(saved))
        .route("/history", get(history))
        .route("/materials/{id}/files", get(files))
        .route("/materials/{id}/files/{file_id}/download", get(download))
}

/// A file as shown to students.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: FileId,
    pub name: String,
    pub media_type: String,
    pub size: u64,
    pub web_view_link: Option<String>,
    /// False for metadata-only files with nothing to download.
    pub available: bool,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&FileRecord> for FileView {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id(),
            name: file.name().to_string(),
            media_type: file.media_type().to_string(),
            size: file.size(),
            web_view_link: file.web_view_link().map(str::to_string),
            available: file.remote_id().is_some(),
            uploaded_at: file.uploaded_at(),
        }
    }
}

/// A material as shown to students.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialView {
    pub id: MaterialId,
    pub subject: String,
    pub department: String,
    pub semester: String,
    pub faculty_name: String,
    pub description: Option<String>,
    pub permission: Permission,
    pub active: bool,
    pub access_count: u64,
    pub files: Vec<FileView>,
    pub created_at: DateTime<Utc>,
}

impl From<&Material> for MaterialView {
    fn from(material: &Material) -> Self {
        Self {
            id: material.id(),
            subject: material.subject().to_string(),
            department: material.department().to_string(),
            semester: material.semester().to_string(),
            faculty_name: material.faculty_name().to_string(),
            description: material.description().map(str::to_string),
            permission: material.permission(),
            active: material.is_active(),
            access_count: material.access_count(),
            files: material.files().iter().map(FileView::from).collect(),
            created_at: material.created_at(),
        }
    }
}

fn library_json(items: &[LibraryItem], at_key: &str) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            json!({
                "material": MaterialView::from(&item.material),
                at_key: item.at,
            })
        })
        .collect()
}

fn material_id(raw: &str) -> Result<MaterialId, ApiError> {
    parse_id(raw, "Material not found")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessRequest {
    access_code: String,
}

async fn access(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
    Origin(origin): Origin,
    payload: Result<Json<AccessRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let redemption = state
        .materials
        .redeem(caller.user_id(), &request.access_code, origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Access granted",
        "firstAccess": redemption.first_access,
        "material": MaterialView::from(&redemption.material),
    })))
}

async fn save(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
    Origin(origin): Origin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state
        .materials
        .save(caller.user_id(), material_id(&id)?, origin)
        .await?;
    let message = match outcome {
        SaveOutcome::Saved => "Material saved",
        SaveOutcome::AlreadySaved => "Material already saved",
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "status": outcome,
    })))
}

async fn unsave(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
    Origin(origin): Origin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state
        .materials
        .unsave(caller.user_id(), material_id(&id)?, origin)
        .await?;
    let message = match outcome {
        UnsaveOutcome::Removed => "Material removed from saved",
        UnsaveOutcome::NotSaved => "Material was not saved",
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "status": outcome,
    })))
}

async fn saved(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
) -> Result<Json<Value>, ApiError> {
    let items = state.materials.saved(caller.user_id()).await?;
    Ok(Json(json!({
        "success": true,
        "materials": library_json(&items, "savedAt"),
    })))
}

async fn history(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
) -> Result<Json<Value>, ApiError> {
    let items = state.materials.history(caller.user_id()).await?;
    Ok(Json(json!({
        "success": true,
        "materials": library_json(&items, "accessedAt"),
    })))
}

async fn files(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let material = state
        .materials
        .accessible(caller.user_id(), material_id(&id)?)
        .await?;
    let view = MaterialView::from(&material);
    Ok(Json(json!({
        "success": true,
        "files": view.files,
        "material": view,
    })))
}

/// Quoted `filename` parameter restricted to printable ASCII.
fn attachment_disposition(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn content_type(media_type: &str) -> HeaderValue {
    HeaderValue::from_str(media_type)
        .ok()
        .filter(|_| !media_type.is_empty())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"))
}

async fn download(
    State(state): State<Arc<AppState>>,
    RequireStudent(caller): RequireStudent,
    Origin(origin): Origin,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let file_id: FileId = parse_id(&file_id, "File not found")?;
    let download = state
        .materials
        .download(caller.user_id(), material_id(&id)?, file_id, origin)
        .await?;

    let headers = [
        (header::CONTENT_TYPE, content_type(download.file.media_type())),
        (
            header::CONTENT_DISPOSITION,
            attachment_disposition(download.file.name()),
        ),
    ];
    Ok((headers, Body::from_stream(download.stream)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyshala_core::UserId;
    use studyshala_materials::NewMaterial;

    fn material() -> Material {
        let draft = NewMaterial {
            subject: "Algorithms".to_string(),
            department: "CSE".to_string(),
            semester: "3".to_string(),
            faculty_name: "Dr. Rao".to_string(),
            description: None,
            permission: Permission::View,
        };
        let owner = UserId::new();
        let mut material = Material::new(owner, draft, "A1B2C3D4".to_string());
        material.push_file(FileRecord::new(
            "notes.pdf".to_string(),
            "application/pdf".to_string(),
            2048,
            owner,
        ));
        material
    }

    #[test]
    fn material_view_hides_code_and_owner() {
        let json = serde_json::to_value(MaterialView::from(&material())).expect("serialize");

        assert_eq!(json["subject"], "Algorithms");
        assert_eq!(json["facultyName"], "Dr. Rao");
        assert!(json.get("accessCode").is_none());
        assert!(json.get("ownerId").is_none());
        assert!(json.get("remoteFolderId").is_none());
        assert_eq!(json["files"][0]["available"], false);
        assert!(json["files"][0].get("remoteId").is_none());
    }

    #[test]
    fn library_entries_carry_timestamp_key() {
        let items = vec![LibraryItem {
            material: material(),
            at: Utc::now(),
        }];
        let json = library_json(&items, "savedAt");
        assert!(json[0].get("savedAt").is_some());
        assert_eq!(json[0]["material"]["department"], "CSE");
    }

    #[test]
    fn disposition_is_ascii_and_quoted() {
        let value = attachment_disposition("Lecture \"1\" – intro.pdf");
        assert_eq!(
            value.to_str().expect("ascii"),
            "attachment; filename=\"Lecture _1_ _ intro.pdf\""
        );
    }

    #[test]
    fn unknown_media_type_falls_back() {
        assert_eq!(content_type(""), "application/octet-stream");
        assert_eq!(content_type("application/pdf"), "application/pdf");
    }
}
