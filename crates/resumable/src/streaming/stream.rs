use futures::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{ResumeError, StreamingError};

use super::types::{ChunkKind, ReadyState, RenderChunk};

/// Chunk stream of one render pass. Dropping it aborts the task driving the
/// pass, along with any deferred subtree it is still waiting on.
pub struct RenderStream {
    receiver: mpsc::Receiver<RenderChunk>,
    driver: JoinHandle<()>,
}

impl RenderStream {
    pub fn new(receiver: mpsc::Receiver<RenderChunk>, driver: JoinHandle<()>) -> Self {
        Self { receiver, driver }
    }

    pub async fn next_chunk(&mut self) -> Option<RenderChunk> {
        self.receiver.recv().await
    }

    /// Drains the stream into text. Fails when the stream closes before the
    /// completion chunk arrives.
    pub async fn collect_text(mut self) -> Result<String, ResumeError> {
        let mut text = String::new();
        let mut completed = false;

        while let Some(chunk) = self.next_chunk().await {
            if chunk.kind == ChunkKind::StreamComplete {
                completed = true;
            }

            let row_id = chunk.row_id;
            let part = String::from_utf8(chunk.data)
                .map_err(|source| StreamingError::InvalidUtf8 { row_id, source })?;
            text.push_str(&part);
        }

        if !completed {
            return Err(StreamingError::Incomplete.into());
        }

        Ok(text)
    }
}

impl Drop for RenderStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl Stream for RenderStream {
    type Item = Vec<u8>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk.data)),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Publisher half of the `shellReady` / `allReady` signals.
pub(crate) struct ReadyPublisher {
    sender: watch::Sender<ReadyState>,
    transitions: Arc<Mutex<Vec<ReadyState>>>,
}

impl ReadyPublisher {
    pub(crate) fn new() -> (Self, RenderSignals) {
        let (sender, receiver) = watch::channel(ReadyState::Pending);
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let signals = RenderSignals { receiver, transitions: Arc::clone(&transitions) };
        (Self { sender, transitions }, signals)
    }

    pub(crate) fn advance(&self, next: ReadyState) {
        let advanced = self.sender.send_if_modified(|state| {
            if next <= *state {
                return false;
            }
            *state = next;
            true
        });

        if advanced {
            self.transitions.lock().push(next);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSignals {
    receiver: watch::Receiver<ReadyState>,
    transitions: Arc<Mutex<Vec<ReadyState>>>,
}

impl RenderSignals {
    pub fn state(&self) -> ReadyState {
        *self.receiver.borrow()
    }

    /// Every state the render pass moved through, in order.
    pub fn transitions(&self) -> Vec<ReadyState> {
        self.transitions.lock().clone()
    }

    /// Resolves once the synchronous shell has been emitted. Returns
    /// `false` if the render pass ended without reaching it.
    pub async fn shell_ready(&self) -> bool {
        self.wait_for(ReadyState::ShellReady).await
    }

    pub async fn all_ready(&self) -> bool {
        self.wait_for(ReadyState::AllReady).await
    }

    async fn wait_for(&self, target: ReadyState) -> bool {
        let mut receiver = self.receiver.clone();
        receiver.wait_for(|state| *state >= target).await.is_ok()
    }
}
