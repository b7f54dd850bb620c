//! Client-side projections of backend entities
//!
//! Everything here is read from the backend and held for the length of a
//! session. The backend is authoritative; these types only decode what it
//! sends, tolerating the field-name drift between its revisions
//! (`content`/`prompt_text`, `prompt`/`final_prompt`, `response`/`gemini_response`).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Placeholder shown when a compared field or record is missing
pub const PLACEHOLDER: &str = "—";

/// An uploaded document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub upload_time: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            filename: None,
            file_size: None,
            status: None,
            current_stage: None,
            progress: None,
            text_length: None,
            language: None,
            upload_time: None,
        }
    }

    /// Display label: `filename (short id)`, else the name, else the id
    pub fn label(&self) -> String {
        if let Some(filename) = self.filename.as_deref().filter(|f| !f.is_empty()) {
            let short: String = self.id.chars().take(8).collect();
            return format!("{} ({})", filename, short);
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if self.id.is_empty() {
            "No ID".to_string()
        } else {
            self.id.clone()
        }
    }

    /// File name used for the `{filename}` prompt variable
    pub fn file_name(&self) -> Option<&str> {
        self.filename.as_deref().or(self.name.as_deref())
    }
}

/// A stored prompt template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    #[serde(alias = "prompt_text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            description: None,
            category: None,
        }
    }
}

/// A recorded (document, prompt) → response evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: String,
    #[serde(default, alias = "final_prompt")]
    pub prompt: Option<String>,
    #[serde(default, alias = "gemini_response")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Analysis {
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, response: Value) -> Self {
        Self {
            id: id.into(),
            prompt: Some(prompt.into()),
            response: Some(response),
            document_id: None,
            prompt_template_id: None,
            created_at: None,
        }
    }

    /// Prompt text, or the placeholder when missing or empty
    pub fn prompt_or_placeholder(&self) -> String {
        match self.prompt.as_deref() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => PLACEHOLDER.to_string(),
        }
    }

    /// Response rendered for display, or the placeholder
    pub fn response_or_placeholder(&self) -> String {
        display_value(self.response.as_ref())
    }
}

/// Render a response value: strings verbatim, structures pretty-printed
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => PLACEHOLDER.to_string(),
        Some(Value::String(s)) if s.is_empty() => PLACEHOLDER.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Structured result of `POST /analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResponse(pub Value);

impl AnalysisResponse {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// The `response` field when the backend returned plain text
    pub fn text(&self) -> Option<&str> {
        self.0.get("response").and_then(Value::as_str)
    }

    /// Text persisted by an explicit save: the plain response when present,
    /// otherwise the whole payload as pretty JSON
    pub fn persisted_text(&self) -> String {
        match self.text() {
            Some(text) => text.to_string(),
            None => self.pretty(),
        }
    }

    /// Two-space indented JSON
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

/// Payload of `POST /analyze`, before the document field is named
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    pub document_id: String,
    pub prompt: String,
}

/// Payload of `POST /save-analysis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnalysisRequest {
    pub document_id: String,
    pub prompt_template_id: Option<String>,
    pub final_prompt: String,
    pub gemini_response: String,
}

/// Result of `POST /upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub file_id: String,
}

/// One server-sent progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: i64,
    #[serde(default)]
    pub stage: String,
}

impl ProgressEvent {
    pub fn new(progress: i64, stage: impl Into<String>) -> Self {
        Self {
            progress,
            stage: stage.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress >= 100
    }

    /// Progress clamped into 0..=100
    pub fn percent(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }
}

/// Accepts RFC 3339 timestamps, naive timestamps (read as UTC), or anything
/// else as `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::String(s)) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&s) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    Ok(NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}
