//! JSON shapes exchanged with the single-page client.
//!
//! Message text and file URLs are only filled in once a capsule is unlocked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tc_core::{Capsule, CapsuleFile, CapsuleInput, CapsuleWithFiles, UnlockStatus};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CapsuleJson {
    pub id: Uuid,
    pub title: String,
    pub owner: String,
    pub message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub unlock_date: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub is_unlocked: bool,
}

impl From<&Capsule> for CapsuleJson {
    fn from(c: &Capsule) -> Self {
        Self {
            id: c.id,
            title: c.title.clone(),
            owner: c.owner.clone(),
            message: c.is_unlocked.then(|| c.message.clone()),
            unlock_date: c.unlock_date,
            created_at: c.created_at,
            is_unlocked: c.is_unlocked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileJson {
    pub id: Uuid,
    pub original_name: String,
    pub url: Option<String>,
    pub mimetype: String,
}

impl FileJson {
    fn new(file: &CapsuleFile, unlocked: bool) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name.clone(),
            url: unlocked.then(|| file_url(file.capsule_id, file.id)),
            mimetype: file.mimetype.clone(),
        }
    }

    fn list(capsule: &CapsuleWithFiles) -> Vec<Self> {
        capsule
            .files
            .iter()
            .map(|f| Self::new(f, capsule.capsule.is_unlocked))
            .collect()
    }
}

pub fn file_url(capsule_id: Uuid, file_id: Uuid) -> String {
    format!("/api/capsules/{capsule_id}/files/{file_id}")
}

/// Response to a create request: the capsule fields plus its files.
#[derive(Debug, Serialize)]
pub struct CreatedCapsule {
    #[serde(flatten)]
    pub capsule: CapsuleJson,
    pub files: Vec<FileJson>,
}

impl From<&CapsuleWithFiles> for CreatedCapsule {
    fn from(c: &CapsuleWithFiles) -> Self {
        Self {
            capsule: CapsuleJson::from(&c.capsule),
            files: FileJson::list(c),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CapsuleDetail {
    pub capsule: CapsuleJson,
    pub files: Vec<FileJson>,
    pub unlocked: bool,
    pub status: UnlockStatus,
}

impl CapsuleDetail {
    pub fn new(c: &CapsuleWithFiles, now: DateTime<Utc>) -> Self {
        Self {
            capsule: CapsuleJson::from(&c.capsule),
            files: FileJson::list(c),
            unlocked: c.capsule.is_unlocked,
            status: c.capsule.status_at(now),
        }
    }
}

/// Body of `POST /api/capsules/json`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCapsuleRequest {
    pub title: Option<String>,
    pub owner: Option<String>,
    #[serde(alias = "unlock_date")]
    pub unlock_date: Option<String>,
    pub message: Option<String>,
}

impl From<CreateCapsuleRequest> for CapsuleInput {
    fn from(req: CreateCapsuleRequest) -> Self {
        CapsuleInput {
            title: req.title,
            owner: req.owner,
            unlock_date: req.unlock_date,
            message: req.message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
}
