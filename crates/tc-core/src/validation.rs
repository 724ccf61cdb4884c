//! Boundary validation: untyped form/JSON input in, `NewCapsule` out.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::truncate_millis;

pub const MAX_TITLE_CHARS: usize = 200;

/// Capsule fields exactly as received from a client.
#[derive(Debug, Clone, Default)]
pub struct CapsuleInput {
    pub title: Option<String>,
    pub owner: Option<String>,
    pub unlock_date: Option<String>,
    pub message: Option<String>,
}

/// A validated request to seal a new capsule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapsule {
    pub title: String,
    pub owner: String,
    pub message: String,
    pub unlock_date: DateTime<Utc>,
}

impl NewCapsule {
    pub fn parse(input: CapsuleInput) -> Result<Self> {
        let title = required(input.title, "title")?;
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AppError::validation(format!(
                "title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        let owner = required(input.owner, "owner")?;
        let unlock_date = parse_unlock_date(input.unlock_date.as_deref().unwrap_or_default())?;

        Ok(Self {
            title,
            owner,
            message: input.message.unwrap_or_default(),
            unlock_date,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value.map(|v| v.trim().to_owned()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::validation(format!("{field} is required"))),
    }
}

/// Accepts a full RFC 3339 timestamp, or `YYYY-MM-DD` (anything after a `T`
/// is ignored) meaning midnight UTC of that day.
pub fn parse_unlock_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::validation("unlockDate is required"));
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(truncate_millis(ts.with_timezone(&Utc)));
    }

    let date_part = raw.split('T').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::validation("Invalid unlockDate format. Use YYYY-MM-DD."))
}

/// Reduces a client filename to a safe single path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ' ' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_owned()
    } else {
        cleaned.to_owned()
    }
}
