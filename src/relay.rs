//! # Request Relay
//!
//! Forwards an uploaded file to one remote Space and reshapes the reply.
//!
//! Both public operations share a single code path, [`RelaySpec::run`];
//! each is just a different [`RelaySpec`] value:
//!
//! | Spec | Service | Form field | Declared type | Remote arguments |
//! |---|---|---|---|---|
//! | [`TRANSCRIBE`] | speech2sign | `audio` | `audio/wav` | `[file]` |
//! | [`PROCESS_VIDEO`] | sign2speech | `video` | `video/mp4` | `{input_video_path: {video: file}}` |
//!
//! Checks run in a fixed order: connection, then file, then the remote call.
//! A request that fails either check never reaches the remote service.

use crate::config::{SIGN2SPEECH, SPEECH2SIGN};
use crate::error::RelayError;
use crate::gradio::{Arg, FilePayload, PredictArgs};
use crate::registry::ConnectionRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Remote endpoint both Spaces expose.
pub const PREDICT_ENDPOINT: &str = "/predict";

/// A file received from the caller, held in memory for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// The reshaped remote reply sent back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResult {
    pub text: String,
    pub audio: String,
    pub video: String,
}

/// Success envelope: `{"result": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub result: RelayResult,
}

/// Everything that distinguishes one relay operation from another.
#[derive(Debug, Clone, Copy)]
pub struct RelaySpec {
    /// Logical name of the connection this operation needs.
    pub service: &'static str,
    /// Multipart field carrying the file.
    pub field: &'static str,
    /// Message reported when the field is absent.
    pub missing_file: &'static str,
    /// Used for log lines, e.g. "Transcription".
    pub label: &'static str,
    pub wrap: fn(UploadPayload) -> FilePayload,
    pub build_args: fn(FilePayload) -> PredictArgs,
    pub decode: fn(Vec<Value>) -> Result<RelayResult, RelayError>,
}

pub const TRANSCRIBE: RelaySpec = RelaySpec {
    service: SPEECH2SIGN,
    field: "audio",
    missing_file: "No audio file provided",
    label: "Transcription",
    wrap: wrap_audio,
    build_args: audio_args,
    decode: decode_outputs,
};

pub const PROCESS_VIDEO: RelaySpec = RelaySpec {
    service: SIGN2SPEECH,
    field: "video",
    missing_file: "No video file provided",
    label: "Video processing",
    wrap: wrap_video,
    build_args: video_args,
    decode: decode_outputs,
};

impl RelaySpec {
    /// Relay one upload through the registry's connection for this spec.
    pub async fn run(
        &self,
        registry: &ConnectionRegistry,
        upload: Option<UploadPayload>,
    ) -> Result<RelayResult, RelayError> {
        let client = registry.get(self.service).ok_or_else(|| {
            RelayError::service_unavailable(format!("Gradio client for {} not initialized", self.service))
        })?;

        let upload = upload.ok_or_else(|| RelayError::client_data(self.missing_file))?;

        let received_as = upload.content_type.clone().unwrap_or_else(|| "unknown".to_string());
        let file = (self.wrap)(upload);
        debug!(
            service = self.service,
            url = client.url(),
            bytes = file.len(),
            received_as = %received_as,
            mime_type = %file.mime_type,
            "Forwarding upload"
        );

        let outputs = client
            .predict(PREDICT_ENDPOINT, (self.build_args)(file))
            .await?;

        (self.decode)(outputs)
    }
}

fn wrap_audio(upload: UploadPayload) -> FilePayload {
    let name = upload.file_name.unwrap_or_else(|| "audio.wav".to_string());
    FilePayload::new(upload.bytes, "audio/wav", name)
}

fn wrap_video(upload: UploadPayload) -> FilePayload {
    let name = upload.file_name.unwrap_or_else(|| "video.mp4".to_string());
    FilePayload::new(upload.bytes, "video/mp4", name)
}

fn audio_args(file: FilePayload) -> PredictArgs {
    PredictArgs::Positional(vec![Arg::File(file)])
}

fn video_args(file: FilePayload) -> PredictArgs {
    PredictArgs::Named(vec![(
        "input_video_path".to_string(),
        Arg::Object(vec![("video".to_string(), Arg::File(file))]),
    )])
}

/// Read `[text, audio, video]` outputs into a [`RelayResult`].
///
/// The audio output is a file reference (`{url}`); the video output wraps
/// one (`{video: {url}}`).
fn decode_outputs(outputs: Vec<Value>) -> Result<RelayResult, RelayError> {
    let [text, audio, video] = match <[Value; 3]>::try_from(outputs) {
        Ok(outputs) => outputs,
        Err(outputs) => {
            return Err(unexpected(format!("expected 3 outputs, got {}", outputs.len())));
        }
    };

    let text = match text {
        Value::String(text) => text,
        other => return Err(unexpected(format!("text output is not a string: {}", other))),
    };

    let audio = audio
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| unexpected("audio output has no url".to_string()))?
        .to_string();

    let video = video
        .get("video")
        .and_then(|video| video.get("url"))
        .and_then(Value::as_str)
        .ok_or_else(|| unexpected("video output has no video.url".to_string()))?
        .to_string();

    Ok(RelayResult { text, audio, video })
}

fn unexpected(detail: String) -> RelayError {
    RelayError::upstream(format!("Unexpected response from Gradio server: {}", detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::tests::{registry_with, FakeClient};
    use serde_json::json;

    fn upload(bytes: &[u8]) -> Option<UploadPayload> {
        Some(UploadPayload {
            bytes: bytes.to_vec(),
            file_name: None,
            content_type: Some("application/octet-stream".to_string()),
        })
    }

    fn hello_outputs() -> Vec<Value> {
        vec![
            json!("hello"),
            json!({"url": "a.wav"}),
            json!({"video": {"url": "b.mp4"}, "subtitles": null}),
        ]
    }

    #[tokio::test]
    async fn test_transcribe_success() {
        let client = FakeClient::new(Ok(hello_outputs()));
        let registry = registry_with(vec![(SPEECH2SIGN, Some(client.clone()))]);

        let result = TRANSCRIBE.run(&registry, upload(b"RIFF")).await.unwrap();

        assert_eq!(
            result,
            RelayResult {
                text: "hello".to_string(),
                audio: "a.wav".to_string(),
                video: "b.mp4".to_string(),
            }
        );

        let (endpoint, args) = client.last_args.lock().unwrap().take().unwrap();
        assert_eq!(endpoint, PREDICT_ENDPOINT);
        assert_eq!(
            args,
            PredictArgs::Positional(vec![Arg::File(FilePayload::new(
                b"RIFF".to_vec(),
                "audio/wav",
                "audio.wav"
            ))])
        );
    }

    #[tokio::test]
    async fn test_process_video_sends_named_argument() {
        let client = FakeClient::new(Ok(hello_outputs()));
        let registry = registry_with(vec![(SIGN2SPEECH, Some(client.clone()))]);

        let mut payload = upload(b"mp4").unwrap();
        payload.file_name = Some("clip.mp4".to_string());
        PROCESS_VIDEO.run(&registry, Some(payload)).await.unwrap();

        let (_, args) = client.last_args.lock().unwrap().take().unwrap();
        let expected_file = FilePayload::new(b"mp4".to_vec(), "video/mp4", "clip.mp4");
        assert_eq!(
            args,
            PredictArgs::Named(vec![(
                "input_video_path".to_string(),
                Arg::Object(vec![("video".to_string(), Arg::File(expected_file))]),
            )])
        );
    }

    #[tokio::test]
    async fn test_missing_connection_skips_remote_call() {
        let other = FakeClient::new(Ok(hello_outputs()));
        let registry = registry_with(vec![(SPEECH2SIGN, None), (SIGN2SPEECH, Some(other.clone()))]);

        let err = TRANSCRIBE.run(&registry, upload(b"RIFF")).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(err.message, "Gradio client for speech2sign not initialized");
        assert_eq!(other.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let client = FakeClient::new(Ok(hello_outputs()));
        let registry = registry_with(vec![(SIGN2SPEECH, Some(client.clone()))]);

        let err = PROCESS_VIDEO.run(&registry, None).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::ClientData);
        assert_eq!(err.message, "No video file provided");
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_failure_message_passes_through() {
        let client = FakeClient::new(Err("upstream timeout".to_string()));
        let registry = registry_with(vec![(SIGN2SPEECH, Some(client))]);

        let err = PROCESS_VIDEO.run(&registry, upload(b"mp4")).await.unwrap_err();

        assert_eq!(err, RelayError::upstream("upstream timeout"));
    }

    #[test]
    fn test_decode_rejects_malformed_outputs() {
        let err = decode_outputs(vec![json!("hello")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("expected 3 outputs"));

        let err = decode_outputs(vec![json!("t"), json!({"url": "a.wav"}), json!({"url": "b.mp4"})])
            .unwrap_err();
        assert!(err.message.contains("video.url"));

        let err = decode_outputs(vec![json!(null), json!({}), json!({})]).unwrap_err();
        assert!(err.message.contains("text output"));
    }

    #[test]
    fn test_response_envelope_shape() {
        let response = RelayResponse {
            result: decode_outputs(hello_outputs()).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"result": {"text": "hello", "audio": "a.wav", "video": "b.mp4"}})
        );
    }
}
