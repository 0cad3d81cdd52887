//! Wire types for the Gradio REST API and its server-sent-event results.

use crate::gradio::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Marker Gradio uses to recognise file references inside call data.
pub const FILE_DATA_TYPE: &str = "gradio.FileData";

/// Subset of `GET /config` the client needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpaceConfig {
    /// Route prefix for API calls, `/gradio_api` on Gradio 5, absent before.
    #[serde(default)]
    pub api_prefix: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Subset of `GET {prefix}/info`: parameter names per named endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub named_endpoints: HashMap<String, EndpointInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointInfo {
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParameterInfo {
    #[serde(default)]
    pub parameter_name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub parameter_has_default: bool,
    #[serde(default)]
    pub parameter_default: Option<Value>,
}

impl ParameterInfo {
    fn name(&self) -> Option<&str> {
        self.parameter_name.as_deref().or(self.label.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

/// Reference to a file already stored on the Space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub meta: FileMeta,
}

impl FileData {
    /// Build the reference for a freshly uploaded file.
    ///
    /// `api_root` is the Space URL including any API prefix.
    pub fn uploaded(api_root: &str, path: String, orig_name: &str, size: usize, mime_type: &str) -> Self {
        Self {
            url: Some(format!("{}/file={}", api_root, path)),
            path,
            orig_name: Some(orig_name.to_string()),
            size: Some(size as u64),
            mime_type: Some(mime_type.to_string()),
            meta: FileMeta {
                kind: FILE_DATA_TYPE.to_string(),
            },
        }
    }
}

/// Body of `POST {prefix}/call/{name}`.
#[derive(Debug, Serialize)]
pub struct CallRequest {
    pub data: Vec<Value>,
}

/// Reply to `POST {prefix}/call/{name}`.
#[derive(Debug, Deserialize)]
pub struct CallResponse {
    pub event_id: String,
}

/// Endpoint names are addressed as `/predict` in info and `predict` in call routes.
pub fn api_name(endpoint: &str) -> &str {
    endpoint.trim_start_matches('/')
}

/// Reorder named arguments into the endpoint's positional order.
///
/// Parameters the caller did not name fall back to their declared
/// default, or null. Names the endpoint does not declare are rejected.
pub fn order_named_args(
    endpoint: &str,
    info: &EndpointInfo,
    mut named: Vec<(String, Value)>,
) -> Result<Vec<Value>, ClientError> {
    let mut data = Vec::with_capacity(info.parameters.len());

    for param in &info.parameters {
        let supplied = param
            .name()
            .and_then(|name| named.iter().position(|(key, _)| key == name))
            .map(|idx| named.remove(idx).1);

        let value = match supplied {
            Some(value) => value,
            None if param.parameter_has_default => {
                param.parameter_default.clone().unwrap_or(Value::Null)
            }
            None => Value::Null,
        };
        data.push(value);
    }

    if let Some((unknown, _)) = named.first() {
        return Err(ClientError::Protocol(format!(
            "endpoint {} has no parameter named {}",
            endpoint, unknown
        )));
    }

    Ok(data)
}

/// Extract the outcome of a call from its event stream body.
///
/// Events are blank-line separated blocks of `event:` and `data:` lines.
/// `complete` carries the output array, `error` the failure message;
/// `generating` and `heartbeat` are progress noise.
pub fn parse_event_stream(body: &str) -> Result<Vec<Value>, ClientError> {
    let normalized = body.replace("\r\n", "\n");

    for block in normalized.split("\n\n") {
        let mut event = None;
        let mut data_lines = Vec::new();

        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event = Some(rest.trim());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            }
        }

        let data = data_lines.join("\n");
        match event {
            Some("complete") => {
                let value: Value = serde_json::from_str(&data).map_err(|e| {
                    ClientError::Protocol(format!("invalid result payload: {}", e))
                })?;
                return match value {
                    Value::Array(items) => Ok(items),
                    other => Err(ClientError::Protocol(format!(
                        "expected an array of outputs, got {}",
                        other
                    ))),
                };
            }
            Some("error") => return Err(ClientError::Remote(remote_error_message(&data))),
            _ => continue,
        }
    }

    Err(ClientError::Protocol(
        "event stream ended without a result".to_string(),
    ))
}

fn remote_error_message(data: &str) -> String {
    const UNSPECIFIED: &str = "Remote service reported an error";

    let trimmed = data.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(message)) => message,
        Ok(Value::Null) => UNSPECIFIED.to_string(),
        Ok(Value::Object(map)) => {
            let message = map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str);
            match message {
                Some(message) => message.to_string(),
                None => Value::Object(map.clone()).to_string(),
            }
        }
        Ok(other) => other.to_string(),
        Err(_) if trimmed.is_empty() => UNSPECIFIED.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint(params: &[(&str, Option<Value>)]) -> EndpointInfo {
        EndpointInfo {
            parameters: params
                .iter()
                .map(|(name, default)| ParameterInfo {
                    parameter_name: Some(name.to_string()),
                    label: None,
                    parameter_has_default: default.is_some(),
                    parameter_default: default.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_complete_event_returns_outputs() {
        let body = "event: generating\ndata: null\n\nevent: heartbeat\ndata: null\n\n\
                    event: complete\ndata: [\"hello\", {\"url\": \"a.wav\"}]\n\n";
        let outputs = parse_event_stream(body).unwrap();
        assert_eq!(outputs, vec![json!("hello"), json!({"url": "a.wav"})]);
    }

    #[test]
    fn test_crlf_event_stream() {
        let body = "event: complete\r\ndata: [1, 2, 3]\r\n\r\n";
        assert_eq!(parse_event_stream(body).unwrap().len(), 3);
    }

    #[test]
    fn test_error_event_message() {
        let err = parse_event_stream("event: error\ndata: \"upstream timeout\"\n\n").unwrap_err();
        assert!(matches!(err, ClientError::Remote(_)));
        assert_eq!(err.to_string(), "upstream timeout");

        let err = parse_event_stream("event: error\ndata: null\n\n").unwrap_err();
        assert_eq!(err.to_string(), "Remote service reported an error");
    }

    #[test]
    fn test_stream_without_result() {
        let err = parse_event_stream("event: heartbeat\ndata: null\n\n").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_order_named_args() {
        let info = endpoint(&[("input_video_path", None), ("language", Some(json!("ar")))]);
        let data = order_named_args(
            "/predict",
            &info,
            vec![("input_video_path".to_string(), json!({"video": "x"}))],
        )
        .unwrap();
        assert_eq!(data, vec![json!({"video": "x"}), json!("ar")]);

        let err = order_named_args("/predict", &info, vec![("nope".to_string(), json!(1))]);
        assert!(err.is_err());
    }

    #[test]
    fn test_uploaded_file_data_serialization() {
        let file = FileData::uploaded("http://space/gradio_api", "/tmp/a.wav".into(), "a.wav", 4, "audio/wav");
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["meta"]["_type"], FILE_DATA_TYPE);
        assert_eq!(value["url"], "http://space/gradio_api/file=/tmp/a.wav");
        assert_eq!(api_name("/predict"), "predict");
    }
}
