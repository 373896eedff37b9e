//! Faculty material management.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use rootcause::prelude::Report;
use serde_json::{Value, json};
use studyshala_core::{FileId, MaterialId};
use studyshala_materials::{IncomingFile, MaterialError, NewMaterial, UploadViolation};

use super::parse_id;
use crate::auth::RequireFaculty;
use crate::error::ApiError;
use crate::origin::Origin;
use crate::state::AppState;

/// Multipart field carrying uploaded files.
const FILES_FIELD: &str = "files";
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Routes mounted under `/api/faculty`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/materials", get(list).post(create))
        .route("/materials/{id}", get(show).delete(remove))
        .route("/materials/{id}/files", post(upload))
        .route("/materials/{id}/files/{file_id}", delete(remove_file))
}

fn material_id(raw: &str) -> Result<MaterialId, ApiError> {
    parse_id(raw, "Material not found")
}

async fn list(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
) -> Result<Json<Value>, ApiError> {
    let materials = state.materials.list_owned(caller.user_id()).await?;
    Ok(Json(json!({ "success": true, "materials": materials })))
}

async fn create(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
    Origin(origin): Origin,
    payload: Result<Json<NewMaterial>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(draft) = payload?;
    let material = state
        .materials
        .create(caller.user_id(), draft, origin)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Material created successfully",
            "material": material,
        })),
    ))
}

async fn show(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let material = state
        .materials
        .get_owned(caller.user_id(), material_id(&id)?)
        .await?;
    Ok(Json(json!({ "success": true, "material": material })))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
    Origin(origin): Origin,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .materials
        .remove(caller.user_id(), material_id(&id)?, origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Material deleted successfully",
    })))
}

/// Reads every `files` part of the request.
///
/// Stops reading once the batch is over the file count limit; the size of
/// each part is bounded by the request body limit.
async fn read_files(
    multipart: &mut Multipart,
    max_files: usize,
) -> Result<Vec<IncomingFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }
        if files.len() == max_files {
            let violation = UploadViolation::TooManyFiles {
                count: files.len() + 1,
                max: max_files,
            };
            return Err(Report::<MaterialError>::from(MaterialError::Upload(violation)).into());
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let media_type = field
            .content_type()
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();
        let bytes = field.bytes().await?;
        files.push(IncomingFile::new(name, media_type, bytes));
    }
    Ok(files)
}

async fn upload(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
    Origin(origin): Origin,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let id = material_id(&id)?;
    let files = read_files(&mut multipart, state.materials.upload_policy().max_files).await?;
    let count = files.len();
    let records = state
        .materials
        .attach(caller.user_id(), id, files, origin)
        .await?;
    tracing::debug!(material_id = %id, count, "files attached");
    Ok(Json(json!({
        "success": true,
        "message": format!("{} file(s) uploaded successfully", records.len()),
        "files": records,
    })))
}

async fn remove_file(
    State(state): State<Arc<AppState>>,
    RequireFaculty(caller): RequireFaculty,
    Origin(origin): Origin,
    Path((id, file_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let file_id: FileId = parse_id(&file_id, "File not found")?;
    state
        .materials
        .detach(caller.user_id(), material_id(&id)?, file_id, origin)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "File deleted successfully",
    })))
}
