//! Exporting the current response to a file or the clipboard

use crate::model::AnalysisResponse;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub const COPIED: &str = "Copied to clipboard!";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unknown export format '{0}' (expected json or md)")]
    UnknownFormat(String),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Clipboard unavailable: {0}")]
    Clipboard(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "analysis.json",
            ExportFormat::Markdown => "analysis.md",
        }
    }

    pub fn render(&self, response: &AnalysisResponse) -> String {
        let pretty = response.pretty();
        match self {
            ExportFormat::Json => pretty,
            ExportFormat::Markdown => format!("# Analysis Result\n\n```json\n{}\n```", pretty),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// A rendered export, not yet written anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: &'static str,
    pub contents: String,
}

impl ExportedFile {
    /// Write into `dir`, returning the full path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(self.file_name);
        std::fs::write(&path, &self.contents).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = self.contents.len(), "Exported response");
        Ok(path)
    }
}

pub fn export(response: &AnalysisResponse, format: ExportFormat) -> ExportedFile {
    ExportedFile {
        file_name: format.file_name(),
        contents: format.render(response),
    }
}

/// Destination for copied text
pub trait Clipboard {
    fn set_text(&mut self, text: String) -> Result<(), ExportError>;
}

/// The desktop clipboard
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ExportError> {
        let inner =
            arboard::Clipboard::new().map_err(|e| ExportError::Clipboard(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: String) -> Result<(), ExportError> {
        self.inner
            .set_text(text)
            .map_err(|e| ExportError::Clipboard(e.to_string()))
    }
}

/// Keeps the last copied text
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    pub contents: Option<String>,
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: String) -> Result<(), ExportError> {
        self.contents = Some(text);
        Ok(())
    }
}
