use serde::Serialize;
use std::sync::Arc;

use crate::error::ResumeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Shell,
    BoundaryUpdate,
    BoundaryError,
    StreamComplete,
}

#[derive(Debug, Clone)]
pub struct RenderChunk {
    pub data: Vec<u8>,
    pub kind: ChunkKind,
    pub row_id: u32,
    pub boundary_id: Option<String>,
}

/// Progress of a render pass. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadyState {
    Pending,
    ShellReady,
    AllReady,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoundaryError {
    pub boundary_id: String,
    pub error_message: String,
    pub row_id: u32,
}

pub type ErrorCallback = Arc<dyn Fn(&ResumeError) + Send + Sync>;

#[derive(Clone)]
pub struct RenderOptions {
    pub chunk_capacity: usize,
    /// Receives every deferred content error. Errors are logged when unset.
    pub on_error: Option<ErrorCallback>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { chunk_capacity: 64, on_error: None }
    }
}

impl std::fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOptions")
            .field("chunk_capacity", &self.chunk_capacity)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    pub title: String,
    pub include_diagnostic_marker: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { title: "resumable scenario".to_string(), include_diagnostic_marker: false }
    }
}
