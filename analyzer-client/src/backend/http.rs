//! HTTP backend for the document analysis service

use super::sse::SseDecoder;
use super::{
    AnalyzerBackend, BackendError, DocumentField, ProgressStream, extract_server_message,
    normalize_collection,
};
use crate::AnalyzerConfig;
use crate::model::{
    Analysis, AnalysisResponse, AnalyzeRequest, Document, ProgressEvent, PromptTemplate,
    SaveAnalysisRequest, UploadReceipt,
};
use crate::upload::UploadFile;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Backend reached over plain HTTP
pub struct HttpBackend {
    client: Client,
    stream_client: Client,
    base_url: String,
    document_field: DocumentField,
    name: String,
}

impl HttpBackend {
    /// Create a backend rooted at `base_url`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let name = format!("http:{}", base_url);

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            // The progress stream stays open for the whole run, so only the
            // connect phase is bounded.
            stream_client: Client::builder().connect_timeout(timeout).build()?,
            base_url,
            document_field: DocumentField::default(),
            name,
        })
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, BackendError> {
        Ok(Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?
            .with_document_field(config.document_field))
    }

    /// Choose the field name carrying the document id in `POST /analyze`
    pub fn with_document_field(mut self, field: DocumentField) -> Self {
        self.document_field = field;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn non-2xx responses into `ServerError`
    async fn check(response: Response) -> Result<Response, BackendError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "Backend error response");

        Err(BackendError::ServerError {
            status: status.as_u16(),
            message: extract_server_message(&body),
        })
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.url(path);
        let start = Instant::now();
        debug!(url = %url, "GET");

        let response = Self::check(self.client.get(&url).send().await?).await?;
        let payload: Value = response.json().await?;

        debug!(
            url = %url,
            latency_ms = start.elapsed().as_millis() as u64,
            "GET complete"
        );
        Ok(normalize_collection(payload, resource))
    }

    /// Body of `POST /analyze` with the configured document field name
    fn analyze_body(&self, request: &AnalyzeRequest) -> Value {
        let mut body = Map::new();
        body.insert(
            self.document_field.as_str().to_string(),
            Value::String(request.document_id.clone()),
        );
        body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        Value::Object(body)
    }
}

#[async_trait]
impl AnalyzerBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError> {
        self.get_collection("/documents", "documents").await
    }

    async fn list_templates(&self) -> Result<Vec<PromptTemplate>, BackendError> {
        self.get_collection("/prompt-templates", "prompt-templates").await
    }

    async fn list_analyses(&self) -> Result<Vec<Analysis>, BackendError> {
        self.get_collection("/analyses", "analyses").await
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResponse, BackendError> {
        let url = self.url("/analyze");
        let body = self.analyze_body(request);
        let start = Instant::now();

        debug!(
            url = %url,
            document_id = %request.document_id,
            field = self.document_field.as_str(),
            prompt_len = request.prompt.len(),
            "POST analyze"
        );

        let response = Self::check(self.client.post(&url).json(&body).send().await?).await?;
        let value: Value = response.json().await?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Analyze complete"
        );
        Ok(AnalysisResponse::new(value))
    }

    async fn save_analysis(
        &self,
        request: &SaveAnalysisRequest,
    ) -> Result<Analysis, BackendError> {
        let url = self.url("/save-analysis");
        debug!(url = %url, document_id = %request.document_id, "POST save-analysis");

        let response = Self::check(self.client.post(&url).json(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError> {
        let url = self.url("/upload");
        debug!(
            url = %url,
            file_name = %file.file_name,
            mime = %file.mime,
            size = file.bytes.len(),
            "POST upload"
        );

        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime)?;
        let form = Form::new().part("file", part);

        let response = Self::check(self.client.post(&url).multipart(form).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn progress_stream(&self, document_id: &str) -> Result<ProgressStream, BackendError> {
        let url = self.url(&format!("/stream/{}", document_id));
        debug!(url = %url, "Opening progress stream");

        let response = Self::check(
            self.stream_client
                .get(&url)
                .header(ACCEPT, "text/event-stream")
                .send()
                .await?,
        )
        .await?;

        let bytes = Box::pin(response.bytes_stream());
        let pending: VecDeque<Result<ProgressEvent, BackendError>> = VecDeque::new();
        let state = (bytes, SseDecoder::new(), pending);

        let events = futures::stream::unfold(
            state,
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (bytes, decoder, pending)));
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            for event in decoder.feed(&chunk) {
                                pending.push_back(
                                    serde_json::from_str::<ProgressEvent>(&event.data)
                                        .map_err(BackendError::from),
                                );
                            }
                        }
                        Some(Err(e)) => {
                            return Some((Err(BackendError::from(e)), (bytes, decoder, pending)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(events.boxed())
    }
}
