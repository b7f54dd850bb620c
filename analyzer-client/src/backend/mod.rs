//! Analysis backend abstraction and the HTTP implementation

mod http;
pub mod sse;


pub use http::HttpBackend;

use crate::model::{
    Analysis, AnalysisResponse, AnalyzeRequest, Document, ProgressEvent, PromptTemplate,
    SaveAnalysisRequest, UploadReceipt,
};
use crate::upload::UploadFile;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur when talking to the backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Backend returned HTTP {status}: {}", message.as_deref().unwrap_or("no message"))]
    ServerError { status: u16, message: Option<String> },

    #[error("Progress stream failed: {0}")]
    StreamError(String),
}

impl BackendError {
    /// Message the server attached to an error response, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            BackendError::ServerError { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text to show the user: the server's message, else `fallback`
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.server_message().unwrap_or(fallback)
    }
}

/// Stream of progress updates for one document
pub type ProgressStream = BoxStream<'static, Result<ProgressEvent, BackendError>>;

/// Name under which `POST /analyze` expects the document id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentField {
    #[default]
    FileId,
    DocumentId,
}

impl DocumentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentField::FileId => "file_id",
            DocumentField::DocumentId => "document_id",
        }
    }
}

/// Trait for the remote analysis service
#[async_trait]
pub trait AnalyzerBackend: Send + Sync {
    /// Name for logging/identification
    fn name(&self) -> &str;

    /// `GET /documents`
    async fn list_documents(&self) -> Result<Vec<Document>, BackendError>;

    /// `GET /prompt-templates`
    async fn list_templates(&self) -> Result<Vec<PromptTemplate>, BackendError>;

    /// `GET /analyses`
    async fn list_analyses(&self) -> Result<Vec<Analysis>, BackendError>;

    /// `POST /analyze`
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResponse, BackendError>;

    /// `POST /save-analysis`
    async fn save_analysis(&self, request: &SaveAnalysisRequest)
    -> Result<Analysis, BackendError>;

    /// `POST /upload`
    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError>;

    /// `GET /stream/{document_id}`
    async fn progress_stream(&self, document_id: &str) -> Result<ProgressStream, BackendError>;
}

/// Coerce a catalog payload into a list.
///
/// Anything other than a JSON array becomes an empty list; array elements
/// that do not decode are dropped.
pub fn normalize_collection<T: DeserializeOwned>(payload: Value, resource: &str) -> Vec<T> {
    let Value::Array(items) = payload else {
        warn!(resource, "Catalog payload is not a sequence, using empty list");
        return Vec::new();
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    if decoded.len() < total {
        warn!(
            resource,
            skipped = total - decoded.len(),
            "Dropped catalog entries that failed to decode"
        );
    }

    decoded
}

/// Pull a human-readable message out of an error body (`message`, then `detail`)
pub fn extract_server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "detail"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
