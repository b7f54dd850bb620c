//! In-memory catalogs of documents, templates and past analyses

use crate::backend::AnalyzerBackend;
use crate::model::{Analysis, Document, PromptTemplate};
use crate::notify::Notifier;
use std::time::Instant;
use tracing::{info, warn};

/// Shown once when the initial load fails
pub const LOAD_FAILED: &str = "Failed to fetch initial data.";

/// Session copy of the three server-side collections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub documents: Vec<Document>,
    pub templates: Vec<PromptTemplate>,
    pub analyses: Vec<Analysis>,
}

impl Catalog {
    /// Fetch all three collections concurrently.
    ///
    /// Any failure empties every collection and produces a single error
    /// notification; nothing is retried.
    pub async fn load(backend: &dyn AnalyzerBackend, notifier: &dyn Notifier) -> Self {
        let start = Instant::now();

        let (documents, templates, analyses) = tokio::join!(
            backend.list_documents(),
            backend.list_templates(),
            backend.list_analyses(),
        );

        match (documents, templates, analyses) {
            (Ok(documents), Ok(templates), Ok(analyses)) => {
                info!(
                    backend = backend.name(),
                    documents = documents.len(),
                    templates = templates.len(),
                    analyses = analyses.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Catalog loaded"
                );
                Self {
                    documents,
                    templates,
                    analyses,
                }
            }
            (documents, templates, analyses) => {
                for (resource, error) in [
                    ("documents", documents.err()),
                    ("prompt-templates", templates.err()),
                    ("analyses", analyses.err()),
                ] {
                    if let Some(error) = error {
                        warn!(backend = backend.name(), resource, error = %error, "Catalog request failed");
                    }
                }
                notifier.error(LOAD_FAILED);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.templates.is_empty() && self.analyses.is_empty()
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn template(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn analysis(&self, id: &str) -> Option<&Analysis> {
        self.analyses.iter().find(|a| a.id == id)
    }

    /// Append a record created by an explicit save
    pub fn append_analysis(&mut self, analysis: Analysis) {
        self.analyses.push(analysis);
    }
}
