pub mod decision;
pub mod types;

pub use decision::decide;
pub use types::*;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::resume::{BoundaryState, LiveBoundary, ResumePhase};

/// A decision together with what it did to the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDecision {
    pub decision: Decision,
    /// The boundary's content was not ready, so the update suspended it.
    pub suspended: bool,
    pub state_after: BoundaryState,
}

impl AppliedDecision {
    pub fn switched_to_placeholder(&self) -> bool {
        self.suspended && !self.decision.keep_content
    }
}

/// Classifies incoming updates and applies the keep-or-fallback decision to
/// the targeted boundary.
#[derive(Debug, Default)]
pub struct PriorityUpdateScheduler {
    rule_counts: Mutex<FxHashMap<DecisionRule, usize>>,
}

impl PriorityUpdateScheduler {
    pub fn new() -> Self {
        Self { rule_counts: Mutex::new(FxHashMap::default()) }
    }

    /// Decides and applies in one step. The caller holds the boundary
    /// exclusively for the duration of the call.
    pub fn apply(
        &self,
        boundary: &mut LiveBoundary,
        trigger: &UpdateTrigger,
        phase: ResumePhase,
    ) -> AppliedDecision {
        let decision = decide(trigger, phase);
        *self.rule_counts.lock().entry(decision.rule).or_insert(0) += 1;

        let suspended = !boundary.content_ready();
        if suspended && !decision.keep_content {
            boundary.show_placeholder();
        }

        debug!(
            boundary_id = boundary.id(),
            rule = ?decision.rule,
            keep_content = decision.keep_content,
            suspended,
            "Applied update"
        );

        AppliedDecision { decision, suspended, state_after: boundary.state() }
    }

    pub fn rule_counts(&self) -> FxHashMap<DecisionRule, usize> {
        self.rule_counts.lock().clone()
    }
}
