use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub code: String,
    pub details: Option<FxHashMap<String, String>>,
    pub source: Option<String>,
}

/// Errors produced while streaming, resuming or driving a scenario.
///
/// Only `ShellRender` and `ScenarioTimeout` halt a scenario; the other
/// variants are recorded and the scenario keeps running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResumeError {
    ShellRender(String, Option<ErrorMetadata>),
    DeferredContent(String, Option<ErrorMetadata>),
    UnknownBoundary(String, Option<ErrorMetadata>),
    ScenarioTimeout(String, Option<ErrorMetadata>),
    Validation(String, Option<ErrorMetadata>),
    Serialization(String, Option<ErrorMetadata>),
    Internal(String, Option<ErrorMetadata>),
    IoError(String, Option<ErrorMetadata>),
}

impl std::fmt::Display for ResumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShellRender(msg, _) => write!(f, "Shell render error: {msg}"),
            Self::DeferredContent(msg, _) => write!(f, "Deferred content error: {msg}"),
            Self::UnknownBoundary(msg, _) => write!(f, "Unknown boundary: {msg}"),
            Self::ScenarioTimeout(msg, _) => write!(f, "Scenario timeout: {msg}"),
            Self::Validation(msg, _) => write!(f, "Validation error: {msg}"),
            Self::Serialization(msg, _) => write!(f, "Serialization error: {msg}"),
            Self::Internal(msg, _) => write!(f, "{msg}"),
            Self::IoError(msg, _) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ResumeError {}

impl ResumeError {
    pub fn message(&self) -> String {
        match self {
            Self::ShellRender(msg, _)
            | Self::DeferredContent(msg, _)
            | Self::UnknownBoundary(msg, _)
            | Self::ScenarioTimeout(msg, _)
            | Self::Validation(msg, _)
            | Self::Serialization(msg, _)
            | Self::Internal(msg, _)
            | Self::IoError(msg, _) => msg.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ShellRender(_, _) => "SHELL_RENDER_ERROR",
            Self::DeferredContent(_, _) => "DEFERRED_CONTENT_ERROR",
            Self::UnknownBoundary(_, _) => "UNKNOWN_BOUNDARY",
            Self::ScenarioTimeout(_, _) => "SCENARIO_TIMEOUT",
            Self::Validation(_, _) => "VALIDATION",
            Self::Serialization(_, _) => "SERIALIZATION_ERROR",
            Self::Internal(_, _) => "INTERNAL",
            Self::IoError(_, _) => "IO_ERROR",
        }
    }

    /// Whether the error halts the scenario it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ShellRender(_, _) | Self::ScenarioTimeout(_, _))
    }

    fn metadata(&self) -> Option<&ErrorMetadata> {
        match self {
            Self::ShellRender(_, meta)
            | Self::DeferredContent(_, meta)
            | Self::UnknownBoundary(_, meta)
            | Self::ScenarioTimeout(_, meta)
            | Self::Validation(_, meta)
            | Self::Serialization(_, meta)
            | Self::Internal(_, meta)
            | Self::IoError(_, meta) => meta.as_ref(),
        }
    }

    fn metadata_mut(&mut self) -> &mut Option<ErrorMetadata> {
        match self {
            Self::ShellRender(_, meta)
            | Self::DeferredContent(_, meta)
            | Self::UnknownBoundary(_, meta)
            | Self::ScenarioTimeout(_, meta)
            | Self::Validation(_, meta)
            | Self::Serialization(_, meta)
            | Self::Internal(_, meta)
            | Self::IoError(_, meta) => meta,
        }
    }

    pub fn shell_render(message: impl Into<String>) -> Self {
        Self::ShellRender(message.into(), None)
    }

    pub fn deferred_content(message: impl Into<String>) -> Self {
        Self::DeferredContent(message.into(), None)
    }

    pub fn unknown_boundary(boundary_id: &str) -> Self {
        Self::UnknownBoundary(boundary_id.to_string(), None).with_property("boundary_id", boundary_id)
    }

    pub fn scenario_timeout(message: impl Into<String>) -> Self {
        Self::ScenarioTimeout(message.into(), None)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into(), None)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into(), None)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into(), None)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Internal(message.into(), None)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::IoError(message.into(), None)
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.set_property(key, value);
        self
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        let code = self.code().to_string();
        let metadata = self.metadata_mut();
        let meta = metadata.get_or_insert_with(|| ErrorMetadata {
            code,
            details: Some(FxHashMap::default()),
            source: None,
        });

        meta.details
            .get_or_insert_with(FxHashMap::default)
            .insert(key.to_string(), value.to_string());
    }

    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|meta| meta.details.as_ref())
            .and_then(|details| details.get(key))
            .map(String::as_str)
    }

    pub fn boundary_id(&self) -> Option<&str> {
        self.get_property("boundary_id")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Chunk receiver dropped before {0} chunk could be sent")]
    ReceiverDropped(String),

    #[error("Render stream closed before all boundaries were flushed")]
    Incomplete,

    #[error("Chunk {row_id} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        row_id: u32,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl From<StreamingError> for ResumeError {
    fn from(error: StreamingError) -> Self {
        match error {
            StreamingError::InvalidUtf8 { .. } => Self::Serialization(error.to_string(), None),
            StreamingError::ReceiverDropped(_) | StreamingError::Incomplete => {
                Self::Internal(error.to_string(), None)
            }
        }
    }
}

impl From<std::io::Error> for ResumeError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(
            error.to_string(),
            Some(ErrorMetadata {
                code: "IO_ERROR".to_string(),
                details: None,
                source: Some("std::io::Error".to_string()),
            }),
        )
    }
}

impl From<tokio::time::error::Elapsed> for ResumeError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::ScenarioTimeout(error.to_string(), None)
    }
}

impl From<regex::Error> for ResumeError {
    fn from(error: regex::Error) -> Self {
        Self::Internal(format!("Invalid marker pattern: {error}"), None)
    }
}

impl From<serde_json::Error> for ResumeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(
            error.to_string(),
            Some(ErrorMetadata {
                code: "JSON_ERROR".to_string(),
                details: None,
                source: Some("serde_json".to_string()),
            }),
        )
    }
}

impl From<String> for ResumeError {
    fn from(error: String) -> Self {
        Self::Internal(error, None)
    }
}

impl From<&str> for ResumeError {
    fn from(error: &str) -> Self {
        Self::Internal(error.to_string(), None)
    }
}
