//! Document upload with client-side pre-validation
//!
//! Files are checked against the accepted envelope (PDF or plain text, at
//! most 5 MiB) before any bytes leave the machine.

use crate::backend::{AnalyzerBackend, BackendError};
use crate::model::UploadReceipt;
use crate::notify::Notifier;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// MIME types the backend can extract text from
pub const ACCEPTED_TYPES: [&str; 2] = ["application/pdf", "text/plain"];

const UPLOAD_FAILED: &str = "Upload failed. Please try again.";

/// Errors from validating or uploading a file
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Please select a file to upload.")]
    NoFile,

    #[error("Only PDF and TXT files are allowed.")]
    UnsupportedType(String),

    #[error("File size must be less than 5MB.")]
    TooLarge(u64),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{}", .0.user_message(UPLOAD_FAILED))]
    Backend(#[from] BackendError),
}

/// A validated file ready to be posted
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Validate and wrap in-memory contents
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let file_name = file_name.into();
        let mime = validate(&file_name, bytes.len() as u64)?;
        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }

    /// Validate a file on disk, checking its size before reading it
    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(UploadError::NoFile)?;

        let size = std::fs::metadata(path)?.len();
        validate(&file_name, size)?;

        let bytes = std::fs::read(path)?;
        Self::new(file_name, bytes)
    }

    /// Size in KiB with two decimals, as shown next to the file name
    pub fn size_kib(&self) -> String {
        format!("{:.2} KB", self.bytes.len() as f64 / 1024.0)
    }
}

/// Check the guessed MIME type and size, returning the MIME type
pub fn validate(file_name: &str, size: u64) -> Result<String, UploadError> {
    let mime = mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or("application/octet-stream");

    if !ACCEPTED_TYPES.contains(&mime) {
        return Err(UploadError::UnsupportedType(mime.to_string()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadError::TooLarge(size));
    }
    Ok(mime.to_string())
}

/// Posts validated files and reports the outcome
pub struct Uploader {
    backend: Arc<dyn AnalyzerBackend>,
    notifier: Arc<dyn Notifier>,
}

impl Uploader {
    pub fn new(backend: Arc<dyn AnalyzerBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Validate and upload the file at `path`; `None` means nothing was picked
    pub async fn upload_path(&self, path: Option<&Path>) -> Result<UploadReceipt, UploadError> {
        let file = match path.ok_or(UploadError::NoFile).and_then(UploadFile::from_path) {
            Ok(file) => file,
            Err(e) => {
                self.notifier.error(&e.to_string());
                return Err(e);
            }
        };
        self.upload(&file).await
    }

    pub async fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, UploadError> {
        match self.backend.upload(file).await {
            Ok(receipt) => {
                info!(file_id = %receipt.file_id, file_name = %file.file_name, "Upload complete");
                self.notifier.success(&format!(
                    "Upload successful! File ID: {}",
                    receipt.file_id
                ));
                Ok(receipt)
            }
            Err(e) => {
                let err = UploadError::from(e);
                self.notifier.error(&err.to_string());
                Err(err)
            }
        }
    }
}
