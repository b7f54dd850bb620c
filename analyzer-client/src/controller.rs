//! Session state for one analysis workspace
//!
//! [`AnalysisController`] owns everything a front end shows: the catalog,
//! the current selections and draft, the latest response, the comparison
//! pair and the progress observer. Front ends drive it through its methods
//! and draw it through a [`View`](crate::view::View) over a
//! [`ControllerSnapshot`].

use crate::AnalyzerConfig;
use crate::backend::AnalyzerBackend;
use crate::catalog::Catalog;
use crate::export::{COPIED, Clipboard, ExportError, ExportFormat, ExportedFile, export};
use crate::history::search_prompts;
use crate::model::{
    Analysis, AnalysisResponse, AnalyzeRequest, Document, PromptTemplate, SaveAnalysisRequest,
};
use crate::notify::Notifier;
use crate::progress::{ProgressObserver, ProgressState};
use crate::runner::{AnalysisRunner, RunError};
use crate::selection::{Comparison, PAIR_FULL, SelectOutcome, SelectionPair, Slot};
use crate::template::{bind_template, render_preview};
use crate::view::View;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

pub struct AnalysisController {
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
    runner: AnalysisRunner,
    observer: ProgressObserver,
    catalog: Catalog,
    loaded: bool,
    selected_document: Option<String>,
    selected_template: Option<String>,
    draft_prompt: String,
    current_response: Option<AnalysisResponse>,
    last_run: Option<LastRun>,
    selection: SelectionPair,
}

/// What produced `current_response`, fixed at run time
struct LastRun {
    request: AnalyzeRequest,
    template_id: Option<String>,
}

impl AnalysisController {
    pub fn new(
        backend: Arc<dyn AnalyzerBackend>,
        notifier: Arc<dyn Notifier>,
        config: &AnalyzerConfig,
    ) -> Self {
        let runner = AnalysisRunner::new(backend.clone(), notifier.clone(), config.persistence)
            .with_refresh_delay(Duration::from_millis(config.refresh_delay_ms));
        Self {
            observer: ProgressObserver::new(backend.clone()),
            backend,
            notifier,
            runner,
            catalog: Catalog::default(),
            loaded: false,
            selected_document: None,
            selected_template: None,
            draft_prompt: String::new(),
            current_response: None,
            last_run: None,
            selection: SelectionPair::new(config.selection_policy),
        }
    }

    /// Load the catalog and re-resolve any template picked before it arrived
    pub async fn mount(&mut self) {
        self.catalog = Catalog::load(self.backend.as_ref(), self.notifier.as_ref()).await;
        self.loaded = true;
        self.rebind_template();
    }

    pub fn select_document(&mut self, id: Option<&str>) {
        self.selected_document = id.filter(|id| !id.is_empty()).map(str::to_string);
    }

    /// Pick a template (`None` is "Custom") and bind it into the draft
    pub fn select_template(&mut self, id: Option<&str>) {
        self.selected_template = id.filter(|id| !id.is_empty()).map(str::to_string);
        self.rebind_template();
    }

    fn rebind_template(&mut self) {
        if !self.loaded && self.selected_template.is_some() {
            return;
        }
        bind_template(
            self.selected_template.as_deref(),
            &self.catalog.templates,
            &mut self.draft_prompt,
        );
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.draft_prompt = prompt.into();
    }

    pub fn draft_prompt(&self) -> &str {
        &self.draft_prompt
    }

    /// Analyze the selected document with the draft prompt.
    ///
    /// With `watch`, the document's progress stream is followed for the
    /// duration of the run and closed when it ends.
    pub async fn run(&mut self, watch: bool) -> Result<&AnalysisResponse, RunError> {
        let document_id = self.selected_document.clone().unwrap_or_default();
        let prompt = self.draft_prompt.clone();

        let watching = watch && AnalysisRunner::validate(&document_id, &prompt).is_ok();
        if watching {
            self.observer.start(&document_id);
        }

        let result = self.runner.run(&document_id, &prompt).await;

        if watching {
            self.observer.stop();
        }

        let outcome = result?;
        if let Some(analyses) = outcome.refreshed {
            self.catalog.analyses = analyses;
        }
        self.last_run = Some(LastRun {
            request: AnalyzeRequest {
                document_id,
                prompt,
            },
            template_id: self.selected_template.clone(),
        });
        Ok(&*self.current_response.insert(outcome.response))
    }

    /// Record the current response through `/save-analysis`
    pub async fn save(&mut self) -> Result<&Analysis, RunError> {
        let (Some(response), Some(last_run)) = (&self.current_response, &self.last_run) else {
            self.notifier.error(&RunError::NothingToSave.to_string());
            return Err(RunError::NothingToSave);
        };

        let request = SaveAnalysisRequest {
            document_id: last_run.request.document_id.clone(),
            prompt_template_id: last_run.template_id.clone(),
            final_prompt: last_run.request.prompt.clone(),
            gemini_response: response.persisted_text(),
        };

        let saved = self.runner.save(&request).await?;
        self.catalog.append_analysis(saved);
        let index = self.catalog.analyses.len() - 1;
        Ok(&self.catalog.analyses[index])
    }

    pub fn toggle_compare(&mut self, analysis_id: &str) -> SelectOutcome {
        let outcome = self.selection.select(analysis_id);
        debug!(analysis_id, ?outcome, "Comparison selection");
        if outcome == SelectOutcome::PairFull {
            self.notifier.info(PAIR_FULL);
        }
        outcome
    }

    /// Put an analysis in a slot, returning the id it replaced
    pub fn assign_compare(&mut self, slot: Slot, analysis_id: &str) -> Option<String> {
        let replaced = self.selection.assign(slot, analysis_id);
        debug!(analysis_id, %slot, ?replaced, "Comparison slot assigned");
        replaced
    }

    pub fn clear_compare(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &SelectionPair {
        &self.selection
    }

    pub fn comparison(&self) -> Option<Comparison> {
        self.selection.comparison(&self.catalog.analyses)
    }

    /// Render the current response; `None` when nothing has run yet
    pub fn export(&self, format: ExportFormat) -> Option<ExportedFile> {
        self.current_response
            .as_ref()
            .map(|response| export(response, format))
    }

    /// Copy the current response as pretty JSON. Returns whether anything was copied.
    pub fn copy_response(&self, clipboard: &mut dyn Clipboard) -> Result<bool, ExportError> {
        let Some(response) = &self.current_response else {
            return Ok(false);
        };
        clipboard.set_text(response.pretty())?;
        self.notifier.info(COPIED);
        Ok(true)
    }

    /// Draft prompt with the given variables filled in
    pub fn preview(&self, variables: &HashMap<String, String>) -> String {
        render_preview(&self.draft_prompt, variables)
    }

    pub fn history(&self, query: &str) -> Vec<&Analysis> {
        search_prompts(&self.catalog.analyses, query)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn document(&self) -> Option<&Document> {
        self.selected_document
            .as_deref()
            .and_then(|id| self.catalog.document(id))
    }

    pub fn template(&self) -> Option<&PromptTemplate> {
        self.selected_template
            .as_deref()
            .and_then(|id| self.catalog.template(id))
    }

    pub fn current_response(&self) -> Option<&AnalysisResponse> {
        self.current_response.as_ref()
    }

    pub fn progress(&self) -> ProgressState {
        self.observer.snapshot()
    }

    pub fn progress_updates(&self) -> watch::Receiver<ProgressState> {
        self.observer.subscribe()
    }

    pub fn snapshot(&self) -> ControllerSnapshot<'_> {
        ControllerSnapshot {
            loaded: self.loaded,
            documents: &self.catalog.documents,
            templates: &self.catalog.templates,
            analyses: &self.catalog.analyses,
            selected_document: self.selected_document.as_deref(),
            selected_template: self.selected_template.as_deref(),
            draft_prompt: &self.draft_prompt,
            response: self.current_response.as_ref(),
            comparison: self.comparison(),
            progress: self.progress(),
        }
    }

    pub fn render(&self, view: &mut dyn View) -> std::io::Result<()> {
        view.render(&self.snapshot())
    }
}

/// Read-only view of controller state
#[derive(Debug, Clone)]
pub struct ControllerSnapshot<'a> {
    pub loaded: bool,
    pub documents: &'a [Document],
    pub templates: &'a [PromptTemplate],
    pub analyses: &'a [Analysis],
    pub selected_document: Option<&'a str>,
    pub selected_template: Option<&'a str>,
    pub draft_prompt: &'a str,
    pub response: Option<&'a AnalysisResponse>,
    pub comparison: Option<Comparison>,
    pub progress: ProgressState,
}
