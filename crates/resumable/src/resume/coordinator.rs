use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::deferred::{DeferredContentProvider, DeferredSubtree, TimerRegistry};
use crate::error::ResumeError;
use crate::scheduler::{AppliedDecision, DecisionRule, PriorityUpdateScheduler, UpdateTrigger};
use crate::tree::ComponentTree;

use super::boundary::{BoundaryState, LiveBoundary, ResumePhase, ServerOutcome};
use super::markers::DocumentMarkers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderCause {
    Attach,
    Update,
    Resolution,
}

/// One boundary-scoped render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRecord {
    pub boundary_id: String,
    pub cause: RenderCause,
    pub state: BoundaryState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub phase: ResumePhase,
    pub applied: AppliedDecision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryReport {
    pub id: String,
    pub server_outcome: ServerOutcome,
    pub final_state: BoundaryState,
    pub content_ready: bool,
    pub history: Vec<BoundaryState>,
    pub renders: usize,
}

impl BoundaryReport {
    pub fn ever_showed_placeholder(&self) -> bool {
        self.history.contains(&BoundaryState::Placeholder)
    }
}

/// State reachable from resolution tasks.
#[derive(Debug, Default)]
struct LiveState {
    boundaries: Mutex<FxHashMap<String, LiveBoundary>>,
    render_log: Mutex<Vec<RenderRecord>>,
    errors: Mutex<Vec<ResumeError>>,
}

impl LiveState {
    fn record_render(&self, boundary_id: &str, cause: RenderCause, state: BoundaryState) {
        self.render_log.lock().push(RenderRecord {
            boundary_id: boundary_id.to_string(),
            cause,
            state,
        });
    }

    fn settle(&self, boundary_id: &str, generation: u64, result: Result<(), ResumeError>) {
        let mut boundaries = self.boundaries.lock();
        let Some(boundary) = boundaries.get_mut(boundary_id) else {
            return;
        };

        match result {
            Ok(()) => {
                if boundary.mark_content_ready(generation) {
                    debug!(boundary_id, generation, "Client content ready");
                    self.record_render(boundary_id, RenderCause::Resolution, boundary.state());
                }
            }
            Err(error) => {
                if generation != boundary.generation() {
                    return;
                }
                warn!("Client content for boundary {} failed: {}", boundary_id, error);
                if boundary.show_placeholder() {
                    self.record_render(boundary_id, RenderCause::Resolution, boundary.state());
                }
                self.errors.lock().push(error.with_property("boundary_id", boundary_id));
            }
        }
    }
}

/// Binds a live tree to previously streamed markup and routes updates to
/// single boundaries.
pub struct ResumeCoordinator {
    resumed: AtomicBool,
    order: Vec<String>,
    state: Arc<LiveState>,
    scheduler: PriorityUpdateScheduler,
    provider: Arc<dyn DeferredContentProvider>,
    timers: Arc<TimerRegistry>,
}

impl ResumeCoordinator {
    /// Starts in `Resuming`. Client subtrees that are not yet resolved are
    /// scheduled on `timers`.
    pub fn attach(
        document: &str,
        tree: &ComponentTree,
        provider: Arc<dyn DeferredContentProvider>,
        timers: Arc<TimerRegistry>,
    ) -> Result<Self, ResumeError> {
        let markers = DocumentMarkers::parse(document)?;
        let entries = tree.boundaries();

        let mut outcomes: FxHashMap<&str, ServerOutcome> = FxHashMap::default();
        let mut order = Vec::with_capacity(entries.len());
        let mut boundaries = FxHashMap::default();

        for entry in &entries {
            let id = entry.node.id.as_str();
            let parent_fell_back = entry
                .parent_id
                .and_then(|parent| outcomes.get(parent))
                .is_some_and(|outcome| *outcome == ServerOutcome::Fallback);

            let outcome = match markers.outcome(id) {
                Some(outcome) => outcome,
                None if parent_fell_back => {
                    debug!("Boundary {} was never streamed because its parent fell back", id);
                    ServerOutcome::Fallback
                }
                None => {
                    warn!("Hydration mismatch: boundary {} has no marker in the document", id);
                    ServerOutcome::Fallback
                }
            };

            outcomes.insert(id, outcome);
            order.push(id.to_string());
            boundaries
                .insert(id.to_string(), LiveBoundary::new(id, outcome, Arc::clone(&entry.node.client)));
        }

        for id in markers.boundary_ids() {
            if !outcomes.contains_key(id) {
                warn!("Hydration mismatch: document marker for unknown boundary {}", id);
            }
        }

        let state = Arc::new(LiveState::default());
        for id in &order {
            if let Some(boundary) = boundaries.get(id) {
                state.record_render(id, RenderCause::Attach, boundary.state());
            }
        }

        let pending: Vec<(String, Arc<DeferredSubtree>, u64)> = boundaries
            .values()
            .filter(|boundary| !boundary.content_ready())
            .map(|boundary| (boundary.id().to_string(), boundary.subtree(), boundary.generation()))
            .collect();

        *state.boundaries.lock() = boundaries;

        let coordinator = Self {
            resumed: AtomicBool::new(false),
            order,
            state,
            scheduler: PriorityUpdateScheduler::new(),
            provider,
            timers,
        };

        for (id, subtree, generation) in pending {
            coordinator.schedule_resolution(id, subtree, generation);
        }

        info!("Attached {} boundaries", coordinator.order.len());

        Ok(coordinator)
    }

    pub fn phase(&self) -> ResumePhase {
        if self.resumed.load(Ordering::Acquire) {
            ResumePhase::Resumed
        } else {
            ResumePhase::Resuming
        }
    }

    /// Ends the attach pass. Returns `false` if it had already ended.
    pub fn complete_initial_pass(&self) -> bool {
        let first =
            self.resumed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok();

        if first {
            debug!("Initial attach pass complete");
        }

        first
    }

    /// Decides the update against the boundary and re-renders that boundary
    /// alone.
    pub fn dispatch(
        &self,
        boundary_id: &str,
        trigger: &UpdateTrigger,
    ) -> Result<DispatchOutcome, ResumeError> {
        let phase = self.phase();

        let (applied, renewed) = {
            let mut boundaries = self.state.boundaries.lock();
            let boundary = boundaries.get_mut(boundary_id).ok_or_else(|| {
                warn!("Dispatch against unknown boundary {}", boundary_id);
                ResumeError::unknown_boundary(boundary_id)
            })?;

            let generation = boundary.generation();
            let applied = self.scheduler.apply(boundary, trigger, phase);
            self.state.record_render(boundary_id, RenderCause::Update, boundary.state());

            let renewed = (boundary.generation() != generation)
                .then(|| (boundary.subtree(), boundary.generation()));
            (applied, renewed)
        };

        if let Some((subtree, generation)) = renewed {
            self.schedule_resolution(boundary_id.to_string(), subtree, generation);
        }

        Ok(DispatchOutcome { phase, applied })
    }

    pub fn boundary_state(&self, boundary_id: &str) -> Option<BoundaryState> {
        self.state.boundaries.lock().get(boundary_id).map(LiveBoundary::state)
    }

    /// Per-boundary reports in document order.
    pub fn snapshot(&self) -> Vec<BoundaryReport> {
        let boundaries = self.state.boundaries.lock();
        let render_log = self.state.render_log.lock();

        self.order
            .iter()
            .filter_map(|id| boundaries.get(id))
            .map(|boundary| BoundaryReport {
                id: boundary.id().to_string(),
                server_outcome: boundary.server_outcome(),
                final_state: boundary.state(),
                content_ready: boundary.content_ready(),
                history: boundary.history().to_vec(),
                renders: render_log.iter().filter(|r| r.boundary_id == boundary.id()).count(),
            })
            .collect()
    }

    pub fn render_log(&self) -> Vec<RenderRecord> {
        self.state.render_log.lock().clone()
    }

    /// Client-side failures recorded since attach.
    pub fn errors(&self) -> Vec<ResumeError> {
        self.state.errors.lock().clone()
    }

    pub fn rule_counts(&self) -> FxHashMap<DecisionRule, usize> {
        self.scheduler.rule_counts()
    }

    fn schedule_resolution(&self, boundary_id: String, subtree: Arc<DeferredSubtree>, generation: u64) {
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);

        debug!(
            boundary_id = %boundary_id,
            generation,
            latency_ms = subtree.latency().as_millis() as u64,
            "Scheduling client resolution"
        );

        self.timers.spawn(async move {
            let result = provider.provide(subtree).await;
            state.settle(&boundary_id, generation, result);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{RenderContext, TimerProvider};
    use crate::scheduler::SourceKind;
    use crate::streaming::{SerializeOptions, serialize};
    use crate::tree::{BoundaryNode, Node};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn single_boundary_tree(latency_ms: u64) -> ComponentTree {
        let boundary = BoundaryNode::new("main", Node::text("Loading"), Node::text("Content"))
            .with_client_latency(Duration::from_millis(latency_ms));
        ComponentTree::new(Node::element("div", vec![Node::boundary(boundary)])).unwrap()
    }

    async fn attach(tree: &ComponentTree, timers: &Arc<TimerRegistry>) -> ResumeCoordinator {
        let provider: Arc<dyn DeferredContentProvider> = Arc::new(TimerProvider::new());
        let document =
            serialize(tree, &SerializeOptions::default(), Arc::clone(&provider)).await.unwrap();
        ResumeCoordinator::attach(&document, tree, provider, Arc::clone(timers)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_starts_resuming_with_server_content() {
        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&single_boundary_tree(3000), &timers).await;

        assert_eq!(coordinator.phase(), ResumePhase::Resuming);
        assert_eq!(coordinator.boundary_state("main"), Some(BoundaryState::Content));
        assert_eq!(timers.pending(), 1);

        let report = &coordinator.snapshot()[0];
        assert_eq!(report.server_outcome, ServerOutcome::Content);
        assert!(!report.content_ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_initial_pass_is_idempotent() {
        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&single_boundary_tree(3000), &timers).await;

        assert!(coordinator.complete_initial_pass());
        assert!(!coordinator.complete_initial_pass());
        assert_eq!(coordinator.phase(), ResumePhase::Resumed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_rerenders_only_target() {
        let first = BoundaryNode::new("first", Node::text("Loading"), Node::text("One"))
            .with_client_latency(Duration::from_millis(3000));
        let second = BoundaryNode::new("second", Node::text("Loading"), Node::text("Two"))
            .with_client_latency(Duration::from_millis(3000));
        let tree = ComponentTree::new(Node::element(
            "div",
            vec![Node::boundary(first), Node::boundary(second)],
        ))
        .unwrap();

        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&tree, &timers).await;
        let before = coordinator.render_log().len();

        let outcome =
            coordinator.dispatch("second", &UpdateTrigger::urgent(SourceKind::LocalState)).unwrap();

        assert_eq!(outcome.phase, ResumePhase::Resuming);
        assert!(outcome.applied.switched_to_placeholder());
        assert_eq!(coordinator.boundary_state("first"), Some(BoundaryState::Content));
        assert_eq!(coordinator.boundary_state("second"), Some(BoundaryState::Placeholder));

        let log = coordinator.render_log();
        assert_eq!(log.len(), before + 1);
        assert_eq!(log[before].boundary_id, "second");
        assert_eq!(log[before].cause, RenderCause::Update);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_boundary_leaves_coordinator_usable() {
        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&single_boundary_tree(3000), &timers).await;

        let error = coordinator
            .dispatch("sidebar", &UpdateTrigger::urgent(SourceKind::LocalState))
            .unwrap_err();
        assert_eq!(error.code(), "UNKNOWN_BOUNDARY");
        assert_eq!(error.boundary_id(), Some("sidebar"));

        let outcome =
            coordinator.dispatch("main", &UpdateTrigger::deferred(SourceKind::LocalState)).unwrap();
        assert!(outcome.applied.decision.keep_content);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_recovers_when_new_subtree_resolves() {
        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&single_boundary_tree(3000), &timers).await;

        tokio::time::sleep(Duration::from_millis(1000)).await;
        coordinator.dispatch("main", &UpdateTrigger::urgent(SourceKind::LocalState)).unwrap();

        // The subtree issued at attach resolves at 3000 and is stale by then.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(coordinator.boundary_state("main"), Some(BoundaryState::Placeholder));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(coordinator.boundary_state("main"), Some(BoundaryState::Content));

        let report = &coordinator.snapshot()[0];
        assert!(report.content_ready);
        assert_eq!(
            report.history,
            vec![BoundaryState::Content, BoundaryState::Placeholder, BoundaryState::Content]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_resolved_round_trip_never_shows_placeholder() {
        let boundary =
            BoundaryNode::new("main", Node::text("Loading"), Node::text("Content")).pre_resolved();
        let tree = ComponentTree::new(Node::element("div", vec![Node::boundary(boundary)])).unwrap();

        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&tree, &timers).await;
        assert_eq!(timers.pending(), 0);

        coordinator.dispatch("main", &UpdateTrigger::urgent(SourceKind::SubscriptionStore)).unwrap();
        coordinator.complete_initial_pass();
        coordinator.dispatch("main", &UpdateTrigger::urgent(SourceKind::LocalState)).unwrap();

        assert!(coordinator.snapshot().iter().all(|report| !report.ever_showed_placeholder()));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_missing_marker_is_a_mismatch() {
        let tree = single_boundary_tree(3000);
        let provider: Arc<dyn DeferredContentProvider> = Arc::new(TimerProvider::new());
        let timers = Arc::new(TimerRegistry::new());

        let coordinator =
            ResumeCoordinator::attach("<div>Content</div>", &tree, provider, timers).unwrap();

        assert!(logs_contain("Hydration mismatch"));
        assert_eq!(coordinator.boundary_state("main"), Some(BoundaryState::Placeholder));
        assert_eq!(coordinator.snapshot()[0].server_outcome, ServerOutcome::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_rejection_falls_back() {
        let boundary = BoundaryNode::new("main", Node::text("Loading"), Node::text("Content"))
            .with_client_subtree(
                DeferredSubtree::new(RenderContext::Client, Duration::from_millis(50))
                    .rejecting("chunk load failed"),
            );
        let tree = ComponentTree::new(Node::element("div", vec![Node::boundary(boundary)])).unwrap();

        let timers = Arc::new(TimerRegistry::new());
        let coordinator = attach(&tree, &timers).await;

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(coordinator.boundary_state("main"), Some(BoundaryState::Placeholder));
        let errors = coordinator.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "DEFERRED_CONTENT_ERROR");
        assert_eq!(errors[0].boundary_id(), Some("main"));
    }
}
