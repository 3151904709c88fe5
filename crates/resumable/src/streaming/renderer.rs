use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::deferred::{DeferredContentProvider, DeferredSubtree};
use crate::error::{ResumeError, StreamingError};
use crate::tree::{BoundaryNode, ComponentTree, Node};

use super::boundary_manager::SuspenseBoundaryManager;
use super::markup;
use super::stream::{ReadyPublisher, RenderSignals, RenderStream};
use super::types::{BoundaryError, ChunkKind, ReadyState, RenderChunk, RenderOptions};

/// Result of starting a render pass.
pub struct RenderHandle {
    pub stream: RenderStream,
    pub signals: RenderSignals,
}

/// A thrown node, before it is attributed to the shell or a boundary.
struct Thrown(String);

struct PendingBoundary {
    boundary: BoundaryNode,
    segment: u32,
    parent_id: Option<String>,
}

type Resolution = (PendingBoundary, Result<(), ResumeError>);

/// Renders a component tree into a chunked text stream.
///
/// One instance drives exactly one render pass.
pub struct StreamingSerializer {
    provider: Arc<dyn DeferredContentProvider>,
    options: RenderOptions,
    boundaries: Arc<SuspenseBoundaryManager>,
    segment_counter: AtomicU32,
}

impl StreamingSerializer {
    pub fn new(provider: Arc<dyn DeferredContentProvider>, options: RenderOptions) -> Self {
        Self {
            provider,
            options,
            boundaries: Arc::new(SuspenseBoundaryManager::new()),
            segment_counter: AtomicU32::new(0),
        }
    }

    pub fn boundary_manager(&self) -> Arc<SuspenseBoundaryManager> {
        Arc::clone(&self.boundaries)
    }

    /// Emits the shell synchronously, then streams every pending boundary as
    /// its deferred subtree resolves.
    ///
    /// A node that throws during the shell pass fails the whole render with
    /// `ShellRender`. Failures after the shell are reported through
    /// `RenderOptions::on_error` and leave the boundary on its fallback.
    pub fn render(self, tree: &ComponentTree) -> Result<RenderHandle, ResumeError> {
        let mut pending = Vec::new();
        let shell = self
            .render_node(tree.root(), None, &mut pending)
            .map_err(|Thrown(message)| ResumeError::shell_render(message))?;

        let (chunk_sender, chunk_receiver) =
            mpsc::channel::<RenderChunk>(self.options.chunk_capacity.max(1));
        let (publisher, signals) = ReadyPublisher::new();

        debug!(
            "Shell rendered with {} pending boundaries ({} bytes)",
            pending.len(),
            shell.len()
        );

        let driver = tokio::spawn(async move {
            if let Err(e) = self.drive(shell, pending, chunk_sender, publisher).await {
                debug!("Render pass stopped early: {}", e);
            }
        });

        Ok(RenderHandle { stream: RenderStream::new(chunk_receiver, driver), signals })
    }

    async fn drive(
        self,
        shell: String,
        pending: Vec<PendingBoundary>,
        sender: mpsc::Sender<RenderChunk>,
        publisher: ReadyPublisher,
    ) -> Result<(), StreamingError> {
        let mut row_id = 0u32;

        send(&sender, ChunkKind::Shell, &mut row_id, None, shell).await?;
        publisher.advance(ReadyState::ShellReady);

        let mut inflight: FuturesUnordered<BoxFuture<'static, Resolution>> = FuturesUnordered::new();
        for boundary in pending {
            inflight.push(self.await_subtree(boundary));
        }

        while let Some((pending_boundary, result)) = inflight.next().await {
            let boundary_id = pending_boundary.boundary.id.clone();
            let segment = pending_boundary.segment;

            let mut nested = Vec::new();
            let rendered = result.and_then(|()| {
                self.render_node(&pending_boundary.boundary.content, Some(&boundary_id), &mut nested)
                    .map_err(|Thrown(message)| ResumeError::deferred_content(message))
            });

            match rendered {
                Ok(content) => {
                    self.boundaries.resolve_boundary(&boundary_id);
                    let html = markup::completion_segment(segment, &content);
                    send(&sender, ChunkKind::BoundaryUpdate, &mut row_id, Some(&boundary_id), html)
                        .await?;

                    for boundary in nested {
                        inflight.push(self.await_subtree(boundary));
                    }
                }
                Err(error) => {
                    let error = error
                        .with_property("boundary_id", &boundary_id)
                        .with_property("segment", &segment.to_string());
                    let report = BoundaryError {
                        boundary_id: boundary_id.clone(),
                        error_message: error.message(),
                        row_id: row_id + 1,
                    };

                    for orphan in &nested {
                        self.boundaries.discard_boundary(&orphan.boundary.id);
                    }
                    self.boundaries.fail_boundary(&boundary_id, &report.error_message);
                    self.report_error(&error, pending_boundary.parent_id.as_deref());

                    let html = markup::error_segment(segment, &report.error_message);
                    send(&sender, ChunkKind::BoundaryError, &mut row_id, Some(&boundary_id), html)
                        .await?;
                }
            }
        }

        send(&sender, ChunkKind::StreamComplete, &mut row_id, None, String::new()).await?;
        publisher.advance(ReadyState::AllReady);

        Ok(())
    }

    fn await_subtree(&self, boundary: PendingBoundary) -> BoxFuture<'static, Resolution> {
        let provider = Arc::clone(&self.provider);
        let subtree: Arc<DeferredSubtree> = Arc::clone(&boundary.boundary.server);

        Box::pin(async move {
            let result = provider.provide(subtree).await;
            (boundary, result)
        })
    }

    fn report_error(&self, error: &ResumeError, parent_id: Option<&str>) {
        match &self.options.on_error {
            Some(callback) => callback(error),
            None => error!(
                "Deferred content failed for boundary {} (parent: {}): {}",
                error.boundary_id().unwrap_or("unknown"),
                parent_id.unwrap_or("root"),
                error
            ),
        }
    }

    fn render_node(
        &self,
        node: &Node,
        parent_id: Option<&str>,
        pending: &mut Vec<PendingBoundary>,
    ) -> Result<String, Thrown> {
        match node {
            Node::Text(text) => Ok(markup::escape_html(text)),
            Node::Throw(message) => Err(Thrown(message.clone())),
            Node::Element { tag, attrs, children } => {
                let mut inner = String::new();
                for child in children {
                    inner.push_str(&self.render_node(child, parent_id, pending)?);
                }
                Ok(markup::element(tag, attrs, &inner))
            }
            Node::Boundary(boundary) => self.render_boundary(boundary, parent_id, pending),
        }
    }

    fn render_boundary(
        &self,
        boundary: &BoundaryNode,
        parent_id: Option<&str>,
        pending: &mut Vec<PendingBoundary>,
    ) -> Result<String, Thrown> {
        self.boundaries.register_boundary(&boundary.id, parent_id);

        if boundary.server.is_resolved() {
            let content = self.render_node(&boundary.content, Some(&boundary.id), pending)?;
            self.boundaries.resolve_boundary(&boundary.id);
            return Ok(markup::inline_boundary(&boundary.id, &content));
        }

        let fallback = self.render_node(&boundary.fallback, parent_id, pending)?;
        let segment = self.segment_counter.fetch_add(1, Ordering::Relaxed);
        self.boundaries.mark_placeholder_rendered(&boundary.id, segment);

        pending.push(PendingBoundary {
            boundary: boundary.clone(),
            segment,
            parent_id: parent_id.map(str::to_string),
        });

        Ok(markup::pending_boundary(&boundary.id, segment, &fallback))
    }
}

async fn send(
    sender: &mpsc::Sender<RenderChunk>,
    kind: ChunkKind,
    row_id: &mut u32,
    boundary_id: Option<&str>,
    html: String,
) -> Result<(), StreamingError> {
    *row_id += 1;

    let chunk = RenderChunk {
        data: html.into_bytes(),
        kind,
        row_id: *row_id,
        boundary_id: boundary_id.map(str::to_string),
    };

    sender.send(chunk).await.map_err(|_| StreamingError::ReceiverDropped(format!("{kind:?}")))
}
