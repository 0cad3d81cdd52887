//! Multipart upload parsing: buffers one named file field into memory.

use crate::error::RelayError;
use crate::relay::UploadPayload;
use actix_multipart::{Field, Multipart};
use actix_web::http::header;
use actix_web::{web, HttpRequest};
use futures_util::stream::StreamExt;

/// Read the file in form field `field_name`, if the request carries one.
///
/// Requests that are not `multipart/*` at all are treated as carrying no
/// file. Only the first field with the wanted name that is a file part
/// (its disposition carries a `filename`) is kept; plain text fields and
/// everything else are drained and ignored.
pub async fn read_file_field(
    req: &HttpRequest,
    payload: web::Payload,
    field_name: &str,
    max_bytes: usize,
) -> Result<Option<UploadPayload>, RelayError> {
    if !is_multipart(req) {
        return Ok(None);
    }

    let mut payload = Multipart::new(req.headers(), payload);

    let mut upload = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| RelayError::client_data(format!("Multipart error: {}", e)))?;

        let name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(str::to_string);

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        if upload.is_none() && name.as_deref() == Some(field_name) && file_name.is_some() {
            let content_type = field.content_type().map(|mime| mime.to_string());
            let bytes = read_field(&mut field, max_bytes).await?;

            upload = Some(UploadPayload {
                bytes,
                file_name,
                content_type,
            });
        } else {
            drain_field(&mut field).await?;
        }
    }

    Ok(upload)
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false)
}

async fn read_field(field: &mut Field, max_bytes: usize) -> Result<Vec<u8>, RelayError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| RelayError::client_data(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(RelayError::client_data(format!(
                "File too large (max: {} bytes)",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn drain_field(field: &mut Field) -> Result<(), RelayError> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| RelayError::client_data(format!("Chunk error: {}", e)))?;
    }
    Ok(())
}
