//! # Relay Endpoints
//!
//! - `POST /transcribe`: multipart field `audio`, relayed to speech2sign
//! - `POST /process-video`: multipart field `video`, relayed to sign2speech
//!
//! ## Response:
//! ```json
//! { "result": { "text": "...", "audio": "https://...", "video": "https://..." } }
//! ```
//! On failure: `{ "error": "<message>" }` with the kind in `X-Error-Kind`.

use crate::error::RelayError;
use crate::handlers::upload::read_file_field;
use crate::relay::{RelayResponse, RelayResult, RelaySpec, PROCESS_VIDEO, TRANSCRIBE};
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{error, info};

pub async fn transcribe(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> HttpResponse {
    relay_upload(&TRANSCRIBE, req, payload, state).await
}

pub async fn process_video(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> HttpResponse {
    relay_upload(&PROCESS_VIDEO, req, payload, state).await
}

/// Buffer the upload, relay it, and render either envelope.
///
/// Every error is caught here so the caller always gets the JSON envelope.
async fn relay_upload(
    spec: &RelaySpec,
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> HttpResponse {
    let outcome: Result<RelayResult, RelayError> = async {
        let upload = read_file_field(&req, payload, spec.field, state.config.upload.max_file_bytes).await?;
        let _in_flight = state.track_relay();
        spec.run(&state.registry, upload).await
    }
    .await;

    match outcome {
        Ok(result) => {
            info!(service = spec.service, text_len = result.text.len(), "{} succeeded", spec.label);
            HttpResponse::Ok().json(RelayResponse { result })
        }
        Err(err) => {
            error!(service = spec.service, kind = err.kind.as_str(), "{} error: {}", spec.label, err);
            err.to_response(state.status_policy())
        }
    }
}
