use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::deferred::DeferredSubtree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundaryState {
    Content,
    Placeholder,
}

impl std::fmt::Display for BoundaryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoundaryState::Content => write!(f, "content"),
            BoundaryState::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// What the streamed document left behind for a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerOutcome {
    /// Content was written inline or completed by a segment.
    Content,
    /// The boundary errored, never completed, or is missing from the markup.
    Fallback,
}

/// One-way phase of the attach pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumePhase {
    Resuming,
    Resumed,
}

/// A boundary bound to the live tree after attach.
///
/// `content_ready` only moves from `false` to `true`. Every switch to the
/// placeholder replaces the client subtree and bumps `generation`, so a
/// resolution of the replaced subtree can no longer bring content back.
#[derive(Debug)]
pub struct LiveBoundary {
    id: String,
    state: BoundaryState,
    content_ready: bool,
    server_outcome: ServerOutcome,
    subtree: Arc<DeferredSubtree>,
    generation: u64,
    history: Vec<BoundaryState>,
}

impl LiveBoundary {
    pub fn new(
        id: impl Into<String>,
        server_outcome: ServerOutcome,
        subtree: Arc<DeferredSubtree>,
    ) -> Self {
        let content_ready = subtree.is_resolved();
        let state = if content_ready || server_outcome == ServerOutcome::Content {
            BoundaryState::Content
        } else {
            BoundaryState::Placeholder
        };

        Self {
            id: id.into(),
            state,
            content_ready,
            server_outcome,
            subtree,
            generation: 0,
            history: vec![state],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> BoundaryState {
        self.state
    }

    pub fn content_ready(&self) -> bool {
        self.content_ready
    }

    pub fn server_outcome(&self) -> ServerOutcome {
        self.server_outcome
    }

    pub fn subtree(&self) -> Arc<DeferredSubtree> {
        Arc::clone(&self.subtree)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every state the boundary presented, consecutive duplicates folded.
    pub fn history(&self) -> &[BoundaryState] {
        &self.history
    }

    /// Switches to the placeholder and starts waiting on a fresh subtree.
    /// Returns `false` when the boundary already shows its placeholder or its
    /// content is ready.
    pub fn show_placeholder(&mut self) -> bool {
        if self.content_ready || self.state == BoundaryState::Placeholder {
            return false;
        }

        self.subtree = Arc::new(self.subtree.renewed());
        self.generation += 1;
        self.set_state(BoundaryState::Placeholder);
        true
    }

    /// Records the resolution of the subtree issued at `generation`.
    pub fn mark_content_ready(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                boundary_id = %self.id,
                generation,
                current = self.generation,
                "Ignoring resolution of a replaced subtree"
            );
            return false;
        }

        if self.content_ready {
            return false;
        }

        self.content_ready = true;
        self.set_state(BoundaryState::Content);
        true
    }

    fn set_state(&mut self, state: BoundaryState) {
        if self.state != state {
            self.state = state;
            self.history.push(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::RenderContext;
    use std::time::Duration;

    fn client_subtree(latency_ms: u64) -> Arc<DeferredSubtree> {
        Arc::new(DeferredSubtree::new(RenderContext::Client, Duration::from_millis(latency_ms)))
    }

    #[test]
    fn test_initial_state_follows_server_outcome() {
        let streamed = LiveBoundary::new("a", ServerOutcome::Content, client_subtree(3000));
        assert_eq!(streamed.state(), BoundaryState::Content);
        assert!(!streamed.content_ready());

        let fell_back = LiveBoundary::new("b", ServerOutcome::Fallback, client_subtree(3000));
        assert_eq!(fell_back.state(), BoundaryState::Placeholder);

        let ready = LiveBoundary::new(
            "c",
            ServerOutcome::Fallback,
            Arc::new(DeferredSubtree::pre_resolved(RenderContext::Client)),
        );
        assert_eq!(ready.state(), BoundaryState::Content);
        assert!(ready.content_ready());
    }

    #[test]
    fn test_placeholder_replaces_subtree() {
        let original = client_subtree(3000);
        let mut boundary = LiveBoundary::new("a", ServerOutcome::Content, Arc::clone(&original));

        assert!(boundary.show_placeholder());
        assert_eq!(boundary.generation(), 1);
        assert!(!Arc::ptr_eq(&boundary.subtree(), &original));
        assert_eq!(boundary.subtree().latency(), Duration::from_millis(3000));

        assert!(!boundary.show_placeholder());
        assert_eq!(boundary.generation(), 1);
    }

    #[test]
    fn test_stale_resolution_ignored() {
        let mut boundary = LiveBoundary::new("a", ServerOutcome::Content, client_subtree(3000));
        boundary.show_placeholder();

        assert!(!boundary.mark_content_ready(0));
        assert_eq!(boundary.state(), BoundaryState::Placeholder);

        assert!(boundary.mark_content_ready(1));
        assert_eq!(boundary.state(), BoundaryState::Content);
        assert_eq!(
            boundary.history(),
            &[BoundaryState::Content, BoundaryState::Placeholder, BoundaryState::Content]
        );
    }

    #[test]
    fn test_ready_content_never_reverts() {
        let mut boundary = LiveBoundary::new("a", ServerOutcome::Content, client_subtree(10));
        assert!(boundary.mark_content_ready(0));

        assert!(!boundary.show_placeholder());
        assert!(!boundary.mark_content_ready(0));
        assert!(boundary.content_ready());
        assert_eq!(boundary.history(), &[BoundaryState::Content]);
    }
}
