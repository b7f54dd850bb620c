//! Analyzer - client for a document analysis service
//!
//! This crate provides:
//! - An HTTP backend for listing documents, prompt templates and past analyses
//! - Running analyses, with optional live progress over server-sent events
//! - Side-by-side comparison of past analyses
//! - Uploads, exports and the `analyzer` command-line front end

pub mod backend;
pub mod catalog;
pub mod controller;
pub mod export;
pub mod history;
pub mod model;
pub mod notify;
pub mod progress;
pub mod runner;
pub mod selection;
pub mod template;
pub mod upload;
pub mod view;

#[cfg(test)]
mod testing;

pub use backend::{AnalyzerBackend, BackendError, DocumentField, HttpBackend};
pub use controller::{AnalysisController, ControllerSnapshot};
pub use notify::{Notifier, Severity};
pub use runner::PersistenceMode;
pub use selection::ReplacementPolicy;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

/// Environment variable overriding `base_url`
pub const API_URL_ENV: &str = "ANALYZER_API_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the analyzer client
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Root URL of the analysis service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds); the progress stream only bounds connecting
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Field carrying the document id in `POST /analyze`
    #[serde(default)]
    pub document_field: DocumentField,

    /// What selecting a third analysis for comparison does
    #[serde(default)]
    pub selection_policy: ReplacementPolicy,

    /// Whether runs are recorded by the backend or saved explicitly
    #[serde(default)]
    pub persistence: PersistenceMode,

    /// Pause before re-reading analyses after a run (ms)
    #[serde(default)]
    pub refresh_delay_ms: u64,

    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where exports are written
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_export_dir() -> PathBuf { PathBuf::from(".") }

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            document_field: DocumentField::default(),
            selection_policy: ReplacementPolicy::default(),
            persistence: PersistenceMode::default(),
            refresh_delay_ms: 0,
            log_level: default_log_level(),
            export_dir: default_export_dir(),
        }
    }
}

impl AnalyzerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply `ANALYZER_API_URL` when set and non-empty
    pub fn with_env_overrides(self) -> Self {
        self.with_api_url(std::env::var(API_URL_ENV).ok())
    }

    fn with_api_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url;
        }
        self
    }

    /// Max tracing level for `log_level`, falling back to INFO
    pub fn tracing_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}
