//! Multipart decoding for `POST /api/capsules`.

use axum::extract::Multipart;
use tc_core::{CapsuleInput, Upload};
use tracing::debug;

use crate::error::ApiError;

/// Splits the form into capsule fields and file parts.
///
/// Empty file parts (a file input left blank by the browser) are skipped.
pub async fn read_capsule_form(mut multipart: Multipart) -> Result<(CapsuleInput, Vec<Upload>), ApiError> {
    let mut input = CapsuleInput::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();

        match name.as_str() {
            "title" => input.title = Some(field.text().await?),
            "owner" => input.owner = Some(field.text().await?),
            "unlockDate" | "unlock_date" => input.unlock_date = Some(field.text().await?),
            "message" => input.message = Some(field.text().await?),
            "files" | "files[]" | "file" => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let data = field.bytes().await?;

                if file_name.is_empty() && data.is_empty() {
                    continue;
                }
                uploads.push(Upload {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok((input, uploads))
}
