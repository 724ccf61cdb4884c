//! # tc-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the capsule service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use tc_core::{AdminAuth, AppError, NewCapsule, StoredObject};
use tc_services::CapsuleService;
use uuid::Uuid;

use crate::dto::{
    CapsuleDetail, CapsuleJson, CreateCapsuleRequest, CreatedCapsule, HealthResponse, OwnerQuery,
    UnlockResponse,
};
use crate::error::ApiError;
use crate::form::read_capsule_form;
use crate::middleware::bearer_token;

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CapsuleService>,
    pub admin: Arc<dyn AdminAuth>,
}

type ApiResult<T> = Result<T, ApiError>;

/// Unparseable ids cannot name an existing record.
fn parse_id(kind: &'static str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found(kind, raw))
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if state.admin.authorize(bearer_token(headers)).await {
        Ok(())
    } else {
        Err(AppError::Unauthorized("admin token required".into()))
    }
}

pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Digital Time Capsule API" }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().timestamp_millis(),
    })
}

pub async fn list_capsules(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Json<Vec<CapsuleJson>>> {
    let owner = query
        .owner
        .ok_or_else(|| AppError::validation("owner query parameter is required"))?;

    let capsules = state.service.list(&owner).await?;
    Ok(Json(capsules.iter().map(CapsuleJson::from).collect()))
}

/// Multipart create: capsule fields plus any number of `files` parts.
pub async fn create_capsule(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<CreatedCapsule>> {
    let (input, uploads) = read_capsule_form(multipart).await?;
    let new = NewCapsule::parse(input)?;

    let created = state.service.create(new, uploads).await?;
    Ok(Json(CreatedCapsule::from(&created)))
}

/// JSON create without attachments.
pub async fn create_capsule_json(
    State(state): State<AppState>,
    payload: Result<Json<CreateCapsuleRequest>, JsonRejection>,
) -> ApiResult<Json<CreatedCapsule>> {
    let Json(body) = payload?;
    let new = NewCapsule::parse(body.into())?;

    let created = state.service.create(new, Vec::new()).await?;
    Ok(Json(CreatedCapsule::from(&created)))
}

pub async fn get_capsule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CapsuleDetail>> {
    let id = parse_id("capsule", &id)?;
    let capsule = state.service.get(id).await?;
    Ok(Json(CapsuleDetail::new(&capsule, Utc::now())))
}

pub async fn unlock_capsule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<UnlockResponse>> {
    require_admin(&state, &headers).await?;
    let id = parse_id("capsule", &id)?;

    state.service.unlock(id).await?;
    Ok(Json(UnlockResponse {
        success: true,
        message: format!("Capsule {id} unlocked"),
    }))
}

pub async fn delete_capsule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.admin.is_open() {
        return Err(AppError::Unauthorized("delete needs a configured admin credential".into()).into());
    }
    require_admin(&state, &headers).await?;
    let id = parse_id("capsule", &id)?;

    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams an attachment of an unlocked capsule, or redirects to the object store.
pub async fn download_file(
    State(state): State<AppState>,
    Path((capsule_id, file_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let capsule_id = parse_id("capsule", &capsule_id)?;
    let file_id = parse_id("file", &file_id)?;

    let (file, object) = state.service.open_file(capsule_id, file_id).await?;

    let response = match object {
        StoredObject::Url(url) => Redirect::temporary(&url).into_response(),
        StoredObject::Bytes(data) => {
            let content_type = HeaderValue::from_str(&file.mimetype)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            let disposition = HeaderValue::from_str(&format!(
                "attachment; filename=\"{}\"",
                tc_core::sanitize_file_name(&file.original_name)
            ))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

            ([(CONTENT_TYPE, content_type), (CONTENT_DISPOSITION, disposition)], data).into_response()
        }
    };
    Ok(response)
}
