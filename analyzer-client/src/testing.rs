//! In-memory backend for unit tests

use crate::backend::{AnalyzerBackend, BackendError, ProgressStream};
use crate::model::{
    Analysis, AnalysisResponse, AnalyzeRequest, Document, ProgressEvent, PromptTemplate,
    SaveAnalysisRequest, UploadReceipt,
};
use crate::upload::UploadFile;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Documents,
    Templates,
    Analyses,
    Analyze,
    Save,
    Upload,
    Stream,
}

/// How the fake progress stream ends after its scripted events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Close,
    Hang,
    Error,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub list_documents: usize,
    pub list_templates: usize,
    pub list_analyses: usize,
    pub analyze: usize,
    pub save: usize,
    pub upload: usize,
    pub stream: usize,
}

#[derive(Default)]
struct Counters {
    list_documents: AtomicUsize,
    list_templates: AtomicUsize,
    list_analyses: AtomicUsize,
    analyze: AtomicUsize,
    save: AtomicUsize,
    upload: AtomicUsize,
    stream: AtomicUsize,
}

/// Counts a progress stream as open until it is dropped
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self(open)
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeBackend {
    documents: Vec<Document>,
    templates: Vec<PromptTemplate>,
    analyses: Mutex<Vec<Analysis>>,
    failing: Mutex<HashSet<Resource>>,
    failure_message: Mutex<Option<String>>,
    analyze_response: Mutex<Value>,
    analyze_delay: Mutex<Duration>,
    records_on_analyze: bool,
    progress: Vec<ProgressEvent>,
    stream_end: StreamEnd,
    last_analyze: Mutex<Option<AnalyzeRequest>>,
    last_save: Mutex<Option<SaveAnalysisRequest>>,
    counters: Counters,
    open_streams: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            documents: Vec::new(),
            templates: Vec::new(),
            analyses: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            failure_message: Mutex::new(None),
            analyze_response: Mutex::new(json!({"response": "ok"})),
            analyze_delay: Mutex::new(Duration::ZERO),
            records_on_analyze: true,
            progress: Vec::new(),
            stream_end: StreamEnd::Close,
            last_analyze: Mutex::new(None),
            last_save: Mutex::new(None),
            counters: Counters::default(),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_templates(mut self, templates: Vec<PromptTemplate>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_analyses(self, analyses: Vec<Analysis>) -> Self {
        *self.analyses.lock().unwrap() = analyses;
        self
    }

    /// Do not append a record to `/analyses` when `/analyze` succeeds
    pub fn without_recording(mut self) -> Self {
        self.records_on_analyze = false;
        self
    }

    pub fn with_progress(mut self, events: Vec<ProgressEvent>, end: StreamEnd) -> Self {
        self.progress = events;
        self.stream_end = end;
        self
    }

    pub fn fail(&self, resource: Resource) {
        self.failing.lock().unwrap().insert(resource);
    }

    /// Fail uploads, optionally with a server-provided message
    pub fn fail_upload(&self, message: Option<&str>) {
        *self.failure_message.lock().unwrap() = message.map(str::to_string);
        self.fail(Resource::Upload);
    }

    /// Fail `/analyze`, optionally with a server-provided message
    pub fn fail_analyze(&self, message: Option<&str>) {
        *self.failure_message.lock().unwrap() = message.map(str::to_string);
        self.fail(Resource::Analyze);
    }

    pub fn set_analyze_response(&self, value: Value) {
        *self.analyze_response.lock().unwrap() = value;
    }

    pub fn set_analyze_delay(&self, delay: Duration) {
        *self.analyze_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            list_documents: c.list_documents.load(Ordering::SeqCst),
            list_templates: c.list_templates.load(Ordering::SeqCst),
            list_analyses: c.list_analyses.load(Ordering::SeqCst),
            analyze: c.analyze.load(Ordering::SeqCst),
            save: c.save.load(Ordering::SeqCst),
            upload: c.upload.load(Ordering::SeqCst),
            stream: c.stream.load(Ordering::SeqCst),
        }
    }

    /// Progress streams handed out and not yet dropped
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    pub fn last_analyze(&self) -> Option<AnalyzeRequest> {
        self.last_analyze.lock().unwrap().clone()
    }

    pub fn last_save(&self) -> Option<SaveAnalysisRequest> {
        self.last_save.lock().unwrap().clone()
    }

    fn check(&self, resource: Resource) -> Result<(), BackendError> {
        if self.failing.lock().unwrap().contains(&resource) {
            return Err(BackendError::ServerError {
                status: 500,
                message: self.failure_message.lock().unwrap().clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyzerBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_documents(&self) -> Result<Vec<Document>, BackendError> {
        self.counters.list_documents.fetch_add(1, Ordering::SeqCst);
        self.check(Resource::Documents)?;
        Ok(self.documents.clone())
    }

    async fn list_templates(&self) -> Result<Vec<PromptTemplate>, BackendError> {
        self.counters.list_templates.fetch_add(1, Ordering::SeqCst);
        self.check(Resource::Templates)?;
        Ok(self.templates.clone())
    }

    async fn list_analyses(&self) -> Result<Vec<Analysis>, BackendError> {
        self.counters.list_analyses.fetch_add(1, Ordering::SeqCst);
        self.check(Resource::Analyses)?;
        Ok(self.analyses.lock().unwrap().clone())
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResponse, BackendError> {
        let n = self.counters.analyze.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_analyze.lock().unwrap() = Some(request.clone());

        let delay = *self.analyze_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check(Resource::Analyze)?;

        let value = self.analyze_response.lock().unwrap().clone();
        if self.records_on_analyze {
            let mut record = Analysis::new(
                format!("run-{}", n),
                request.prompt.clone(),
                value.get("response").cloned().unwrap_or(Value::Null),
            );
            record.document_id = Some(request.document_id.clone());
            self.analyses.lock().unwrap().push(record);
        }
        Ok(AnalysisResponse::new(value))
    }

    async fn save_analysis(
        &self,
        request: &SaveAnalysisRequest,
    ) -> Result<Analysis, BackendError> {
        let n = self.counters.save.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_save.lock().unwrap() = Some(request.clone());
        self.check(Resource::Save)?;

        let mut record = Analysis::new(
            format!("saved-{}", n),
            request.final_prompt.clone(),
            Value::String(request.gemini_response.clone()),
        );
        record.document_id = Some(request.document_id.clone());
        record.prompt_template_id = request.prompt_template_id.clone();
        self.analyses.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError> {
        let n = self.counters.upload.fetch_add(1, Ordering::SeqCst) + 1;
        self.check(Resource::Upload)?;
        Ok(UploadReceipt {
            file_id: format!("file-{}-{}", n, file.file_name),
        })
    }

    async fn progress_stream(&self, _document_id: &str) -> Result<ProgressStream, BackendError> {
        self.counters.stream.fetch_add(1, Ordering::SeqCst);
        self.check(Resource::Stream)?;

        let guard = OpenStream::new(self.open_streams.clone());
        let events = futures::stream::iter(self.progress.clone().into_iter().map(Ok));
        let stream = match self.stream_end {
            StreamEnd::Close => events.boxed(),
            StreamEnd::Hang => events.chain(futures::stream::pending()).boxed(),
            StreamEnd::Error => events
                .chain(futures::stream::once(async {
                    Err(BackendError::StreamError("connection reset".to_string()))
                }))
                .boxed(),
        };
        Ok(stream
            .map(move |item| {
                let _open = &guard;
                item
            })
            .boxed())
    }
}
