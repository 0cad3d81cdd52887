//! # Remote Inference Client
//!
//! Client side of the Gradio HTTP API used by the hosted speech2sign and
//! sign2speech Spaces. The relay only ever talks to these services through
//! the [`PredictClient`] and [`Connector`] traits, so handlers and the
//! registry can be exercised against fakes.
//!
//! ## Module Organization:
//! - **protocol**: wire types (`/config`, `/info`, FileData, event streams)
//! - **client**: the reqwest-backed `GradioClient` and [`GradioConnector`]

pub mod client;
pub mod protocol;

pub use client::GradioConnector;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while connecting to or calling a remote Space.
///
/// `Display` is what ends up in the caller's error envelope, so
/// [`ClientError::Remote`] carries the remote message without decoration.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Remote(String),

    #[error("Unexpected response from Gradio server: {0}")]
    Protocol(String),
}

/// A file to be uploaded alongside a predict call.
///
/// Equivalent of wrapping raw bytes in a typed blob: the bytes are sent
/// to the Space's upload route first, then referenced by path.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl FilePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// One argument value for a predict call.
///
/// Files may appear anywhere inside the tree; they are uploaded and
/// replaced by a FileData reference before the call is made.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    File(FilePayload),
    Object(Vec<(String, Arg)>),
}

/// Arguments for a predict call, either in endpoint order or by parameter name.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictArgs {
    Positional(Vec<Arg>),
    Named(Vec<(String, Arg)>),
}

/// An established connection to one remote inference service.
#[async_trait]
pub trait PredictClient: Send + Sync {
    /// Invoke `endpoint` (e.g. `/predict`) and return its ordered outputs.
    async fn predict(&self, endpoint: &str, args: PredictArgs) -> Result<Vec<Value>, ClientError>;

    /// Root URL this client is bound to.
    fn url(&self) -> &str;
}

/// Establishes [`PredictClient`] handles from service URLs.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn PredictClient>, ClientError>;
}
