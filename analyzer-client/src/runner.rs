//! Submitting (document, prompt) pairs for analysis

use crate::backend::{AnalyzerBackend, BackendError};
use crate::model::{Analysis, AnalysisResponse, AnalyzeRequest, SaveAnalysisRequest};
use crate::notify::Notifier;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const VALIDATION_MESSAGE: &str = "Select a document and enter a prompt.";
pub const RUN_COMPLETE: &str = "Analysis complete!";
pub const RUN_FAILED: &str = "Analysis failed.";
pub const SAVE_COMPLETE: &str = "Analysis saved!";
pub const SAVE_FAILED: &str = "Failed to save analysis.";
pub const NOTHING_TO_SAVE: &str = "Run an analysis before saving.";
const REFRESH_FAILED: &str = "Failed to refresh analyses.";

/// Who records a finished analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    /// `/analyze` records it; the runner re-reads `/analyses`
    #[default]
    Auto,
    /// The user saves it through `/save-analysis`
    ExplicitSave,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Select a document and enter a prompt.")]
    MissingInput,

    #[error("An analysis is already running.")]
    Busy,

    #[error("Run an analysis before saving.")]
    NothingToSave,

    #[error("Saving is only available in explicit_save mode.")]
    SaveDisabled,

    #[error("{0}")]
    Backend(#[from] BackendError),
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub response: AnalysisResponse,
    /// Fresh `/analyses` read, when the mode asks for one and it succeeded
    pub refreshed: Option<Vec<Analysis>>,
}

/// Clears the in-flight flag when a run ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AnalysisRunner {
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
    mode: PersistenceMode,
    refresh_delay: Duration,
    in_flight: AtomicBool,
}

impl AnalysisRunner {
    pub fn new(
        backend: Arc<dyn AnalyzerBackend>,
        notifier: Arc<dyn Notifier>,
        mode: PersistenceMode,
    ) -> Self {
        Self {
            backend,
            notifier,
            mode,
            refresh_delay: Duration::ZERO,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Wait this long before re-reading `/analyses` after a run
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Build the request, rejecting an empty document id or blank prompt
    pub fn validate(document_id: &str, prompt: &str) -> Result<AnalyzeRequest, RunError> {
        if document_id.is_empty() || prompt.trim().is_empty() {
            return Err(RunError::MissingInput);
        }
        Ok(AnalyzeRequest {
            document_id: document_id.to_string(),
            prompt: prompt.to_string(),
        })
    }

    /// Run one analysis. Failures are notified here and returned; nothing retries.
    pub async fn run(&self, document_id: &str, prompt: &str) -> Result<RunOutcome, RunError> {
        let request = match Self::validate(document_id, prompt) {
            Ok(request) => request,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return Err(e);
            }
        };

        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            debug!(document_id, "Rejected run while another is in flight");
            return Err(RunError::Busy);
        };

        info!(
            backend = self.backend.name(),
            document_id,
            prompt_len = prompt.len(),
            "Starting analysis"
        );
        let start = Instant::now();

        let response = match self.backend.analyze(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(document_id, error = %e, "Analysis failed");
                self.notifier.error(e.user_message(RUN_FAILED));
                return Err(e.into());
            }
        };

        info!(
            document_id,
            latency_ms = start.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        self.notifier.success(RUN_COMPLETE);

        let refreshed = match self.mode {
            PersistenceMode::Auto => self.refresh().await,
            PersistenceMode::ExplicitSave => None,
        };

        Ok(RunOutcome {
            response,
            refreshed,
        })
    }

    async fn refresh(&self) -> Option<Vec<Analysis>> {
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match self.backend.list_analyses().await {
            Ok(analyses) => {
                debug!(count = analyses.len(), "Refreshed analyses");
                Some(analyses)
            }
            Err(e) => {
                warn!(error = %e, "Failed to refresh analyses after run");
                self.notifier.error(REFRESH_FAILED);
                None
            }
        }
    }

    /// Persist a run through `/save-analysis` (explicit mode only)
    pub async fn save(&self, request: &SaveAnalysisRequest) -> Result<Analysis, RunError> {
        if self.mode != PersistenceMode::ExplicitSave {
            self.notifier.error(&RunError::SaveDisabled.to_string());
            return Err(RunError::SaveDisabled);
        }

        match self.backend.save_analysis(request).await {
            Ok(analysis) => {
                info!(analysis_id = %analysis.id, document_id = %request.document_id, "Analysis saved");
                self.notifier.success(SAVE_COMPLETE);
                Ok(analysis)
            }
            Err(e) => {
                warn!(document_id = %request.document_id, error = %e, "Save failed");
                self.notifier.error(e.user_message(SAVE_FAILED));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{RecordingNotifier, Severity};
    use crate::testing::{FakeBackend, Resource};
    use serde_json::json;

    fn runner(
        backend: &Arc<FakeBackend>,
        mode: PersistenceMode,
    ) -> (AnalysisRunner, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        (
            AnalysisRunner::new(backend.clone(), notifier.clone(), mode),
            notifier,
        )
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_call() {
        let backend = Arc::new(FakeBackend::new());
        let (runner, notifier) = runner(&backend, PersistenceMode::Auto);

        for (doc, prompt) in [("", "Summarize"), ("d1", "  "), ("d1", "")] {
            let err = runner.run(doc, prompt).await.unwrap_err();
            assert!(matches!(err, RunError::MissingInput));
        }

        assert_eq!(backend.calls().analyze, 0);
        assert_eq!(notifier.count(Severity::Error), 3);
        assert_eq!(notifier.messages(Severity::Error)[0], VALIDATION_MESSAGE);
    }

    #[tokio::test]
    async fn test_success_refreshes_once() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_analyze_response(json!({"response": "42"}));
        let (runner, notifier) = runner(&backend, PersistenceMode::Auto);

        let outcome = runner.run("d1", "What is the answer?").await.unwrap();

        assert_eq!(outcome.response.value(), &json!({"response": "42"}));
        assert_eq!(backend.calls().analyze, 1);
        assert_eq!(backend.calls().list_analyses, 1);
        assert_eq!(outcome.refreshed.unwrap().len(), 1);
        assert_eq!(notifier.messages(Severity::Success), vec![RUN_COMPLETE.to_string()]);

        let sent = backend.last_analyze().unwrap();
        assert_eq!(sent.document_id, "d1");
        assert_eq!(sent.prompt, "What is the answer?");
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_response() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail(Resource::Analyses);
        let (runner, notifier) = runner(&backend, PersistenceMode::Auto);

        let outcome = runner.run("d1", "p").await.unwrap();

        assert!(outcome.refreshed.is_none());
        assert_eq!(notifier.count(Severity::Success), 1);
        assert_eq!(notifier.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn test_failure_messages() {
        let backend = Arc::new(FakeBackend::new());
        let (runner, notifier) = runner(&backend, PersistenceMode::Auto);

        backend.fail_analyze(None);
        runner.run("d1", "p").await.unwrap_err();
        backend.fail_analyze(Some("Document not found."));
        runner.run("d1", "p").await.unwrap_err();

        assert_eq!(
            notifier.messages(Severity::Error),
            vec![RUN_FAILED.to_string(), "Document not found.".to_string()]
        );
        assert_eq!(backend.calls().analyze, 2);
        assert_eq!(backend.calls().list_analyses, 0);
    }

    #[tokio::test]
    async fn test_second_run_is_busy() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_analyze_delay(Duration::from_millis(50));
        let (runner, _notifier) = runner(&backend, PersistenceMode::Auto);

        let (first, second) = tokio::join!(runner.run("d1", "a"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            runner.run("d1", "b").await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(RunError::Busy)));
        assert_eq!(backend.calls().analyze, 1);
    }

    #[tokio::test]
    async fn test_explicit_mode_skips_refresh_and_saves() {
        let backend = Arc::new(FakeBackend::new().without_recording());
        let (runner, notifier) = runner(&backend, PersistenceMode::ExplicitSave);

        let outcome = runner.run("d1", "p").await.unwrap();
        assert!(outcome.refreshed.is_none());
        assert_eq!(backend.calls().list_analyses, 0);

        let saved = runner
            .save(&SaveAnalysisRequest {
                document_id: "d1".to_string(),
                prompt_template_id: Some("t1".to_string()),
                final_prompt: "p".to_string(),
                gemini_response: outcome.response.persisted_text(),
            })
            .await
            .unwrap();

        assert_eq!(saved.prompt.as_deref(), Some("p"));
        assert_eq!(backend.last_save().unwrap().gemini_response, "ok");
        assert!(notifier.messages(Severity::Success).contains(&SAVE_COMPLETE.to_string()));
    }

    #[tokio::test]
    async fn test_save_rejected_in_auto_mode() {
        let backend = Arc::new(FakeBackend::new());
        let (runner, _notifier) = runner(&backend, PersistenceMode::Auto);

        let request = SaveAnalysisRequest {
            document_id: "d1".to_string(),
            prompt_template_id: None,
            final_prompt: "p".to_string(),
            gemini_response: "r".to_string(),
        };
        assert!(matches!(runner.save(&request).await, Err(RunError::SaveDisabled)));
        assert_eq!(backend.calls().save, 0);
    }
}
