//! # Gradio Client
//!
//! reqwest-backed implementation of [`PredictClient`].
//!
//! ## Call Sequence:
//! 1. **connect**: `GET /config` (must succeed), then `GET {prefix}/info` (best effort)
//! 2. **upload**: every [`Arg::File`] is posted to `{prefix}/upload`
//! 3. **call**: `POST {prefix}/call/{name}` returns an event id
//! 4. **result**: `GET {prefix}/call/{name}/{event_id}` streams events until
//!    `complete` or `error`
//!
//! No retries and no timeouts are configured; a hung Space hangs the call.

use crate::gradio::protocol::{
    self, ApiInfo, CallRequest, CallResponse, FileData, SpaceConfig,
};
use crate::gradio::{Arg, ClientError, Connector, FilePayload, PredictArgs, PredictClient};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection to one Gradio Space.
#[derive(Debug, Clone)]
pub struct GradioClient {
    http: reqwest::Client,
    root: String,
    api_prefix: String,
    api_info: Option<ApiInfo>,
}

impl GradioClient {
    /// Connect to the Space at `url`.
    ///
    /// Fails if the Space's config cannot be fetched. A missing `/info`
    /// only disables named-argument reordering.
    pub async fn connect(http: reqwest::Client, url: &str) -> Result<Self, ClientError> {
        let root = url.trim().trim_end_matches('/').to_string();

        let config_url = format!("{}/config", root);
        let response = check_status(&config_url, http.get(&config_url).send().await?).await?;
        let config: SpaceConfig = response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(format!("invalid config from {}: {}", config_url, e)))?;

        let api_prefix = config
            .api_prefix
            .as_deref()
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .unwrap_or_default();

        debug!(
            url = %root,
            version = config.version.as_deref().unwrap_or("unknown"),
            protocol = config.protocol.as_deref().unwrap_or("unknown"),
            "Fetched Gradio config"
        );

        let mut client = Self {
            http,
            root,
            api_prefix,
            api_info: None,
        };
        client.api_info = client.fetch_api_info().await;
        Ok(client)
    }

    fn api_root(&self) -> String {
        format!("{}{}", self.root, self.api_prefix)
    }

    async fn fetch_api_info(&self) -> Option<ApiInfo> {
        let info_url = format!("{}/info", self.api_root());
        let result: Result<ApiInfo, ClientError> = async {
            let response = check_status(&info_url, self.http.get(&info_url).send().await?).await?;
            response
                .json::<ApiInfo>()
                .await
                .map_err(|e| ClientError::Protocol(e.to_string()))
        }
        .await;

        match result {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(url = %info_url, error = %e, "Could not fetch API info, named arguments keep their given order");
                None
            }
        }
    }

    /// Upload one file and return its reference on the Space.
    pub async fn upload(&self, file: FilePayload) -> Result<FileData, ClientError> {
        let upload_url = format!("{}/upload", self.api_root());
        let size = file.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("files", part);

        let response = self.http.post(&upload_url).multipart(form).send().await?;
        let paths: Vec<String> = check_status(&upload_url, response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(format!("invalid upload reply: {}", e)))?;

        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Protocol("upload reply listed no files".to_string()))?;

        debug!(path = %path, size, "Uploaded file to Gradio");
        Ok(FileData::uploaded(
            &self.api_root(),
            path,
            &file.file_name,
            size,
            &file.mime_type,
        ))
    }

    /// Turn an argument tree into JSON, uploading files along the way.
    fn resolve_arg(&self, arg: Arg) -> BoxFuture<'_, Result<Value, ClientError>> {
        async move {
            match arg {
                Arg::Value(value) => Ok(value),
                Arg::File(file) => {
                    let data = self.upload(file).await?;
                    serde_json::to_value(data).map_err(|e| ClientError::Protocol(e.to_string()))
                }
                Arg::Object(fields) => {
                    let mut map = Map::new();
                    for (key, value) in fields {
                        map.insert(key, self.resolve_arg(value).await?);
                    }
                    Ok(Value::Object(map))
                }
            }
        }
        .boxed()
    }

    async fn resolve_args(&self, endpoint: &str, args: PredictArgs) -> Result<Vec<Value>, ClientError> {
        match args {
            PredictArgs::Positional(args) => {
                let mut data = Vec::with_capacity(args.len());
                for arg in args {
                    data.push(self.resolve_arg(arg).await?);
                }
                Ok(data)
            }
            PredictArgs::Named(args) => {
                let mut named = Vec::with_capacity(args.len());
                for (name, arg) in args {
                    named.push((name, self.resolve_arg(arg).await?));
                }

                let endpoint_info = self
                    .api_info
                    .as_ref()
                    .and_then(|info| info.named_endpoints.get(endpoint));
                match endpoint_info {
                    Some(info) => protocol::order_named_args(endpoint, info, named),
                    None => Ok(named.into_iter().map(|(_, value)| value).collect()),
                }
            }
        }
    }

    async fn call(&self, endpoint: &str, data: Vec<Value>) -> Result<Vec<Value>, ClientError> {
        let call_url = format!("{}/call/{}", self.api_root(), protocol::api_name(endpoint));

        let response = self
            .http
            .post(&call_url)
            .json(&CallRequest { data })
            .send()
            .await?;
        let CallResponse { event_id } = check_status(&call_url, response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Protocol(format!("invalid call reply: {}", e)))?;

        let result_url = format!("{}/{}", call_url, event_id);
        debug!(url = %result_url, "Waiting for Gradio result");
        let body = check_status(&result_url, self.http.get(&result_url).send().await?)
            .await?
            .text()
            .await?;

        protocol::parse_event_stream(&body)
    }
}

#[async_trait]
impl PredictClient for GradioClient {
    async fn predict(&self, endpoint: &str, args: PredictArgs) -> Result<Vec<Value>, ClientError> {
        let data = self.resolve_args(endpoint, args).await?;
        self.call(endpoint, data).await
    }

    fn url(&self) -> &str {
        &self.root
    }
}

/// Opens [`GradioClient`] connections sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct GradioConnector {
    http: reqwest::Client,
}

impl GradioConnector {
    pub fn new() -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connector for GradioConnector {
    async fn connect(&self, url: &str) -> Result<Arc<dyn PredictClient>, ClientError> {
        let client = GradioClient::connect(self.http.clone(), url).await?;
        Ok(Arc::new(client))
    }
}

async fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
