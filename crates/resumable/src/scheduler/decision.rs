//! The keep-content decision for an update that reaches a boundary.
//!
//! Rules are checked in order and the first match decides:
//!
//! 1. An update that leaves the value unchanged keeps content.
//! 2. An update from a subscription store never keeps content.
//! 3. While resuming, an urgent update falls back.
//! 4. While resuming, a deferred update keeps content if its write happens
//!    before the suspension point, or after it with the async context
//!    preserved, unless the same pass also renders an unwrapped pending
//!    indicator into the boundary.
//! 5. Once resumed, deferred keeps content and urgent falls back.
//!
//! Unrecognized classifications or sources are treated as urgent.

use crate::resume::ResumePhase;

use super::types::{
    Decision, DecisionRule, OriginTiming, SourceKind, UpdateClassification, UpdateTrigger,
};

pub fn decide(trigger: &UpdateTrigger, phase: ResumePhase) -> Decision {
    if !trigger.value_changed {
        return Decision::keep(DecisionRule::UnchangedValue);
    }

    match trigger.source_kind {
        SourceKind::SubscriptionStore => return Decision::fallback(DecisionRule::SubscriptionStore),
        SourceKind::Unrecognized => return Decision::fallback(DecisionRule::Unrecognized),
        SourceKind::LocalState | SourceKind::Reducer => {}
    }

    match (phase, trigger.classification) {
        (_, UpdateClassification::Unrecognized) => Decision::fallback(DecisionRule::Unrecognized),
        (ResumePhase::Resuming, UpdateClassification::Urgent) => {
            Decision::fallback(DecisionRule::UrgentWhileResuming)
        }
        (ResumePhase::Resuming, UpdateClassification::Deferred) => deferred_while_resuming(trigger),
        (ResumePhase::Resumed, UpdateClassification::Deferred) => {
            Decision::keep(DecisionRule::DeferredAfterResume)
        }
        (ResumePhase::Resumed, UpdateClassification::Urgent) => {
            Decision::fallback(DecisionRule::UrgentAfterResume)
        }
    }
}

fn deferred_while_resuming(trigger: &UpdateTrigger) -> Decision {
    let eligible = match trigger.origin_timing {
        OriginTiming::PreResume => DecisionRule::DeferredBeforeSuspension,
        OriginTiming::PostResume if trigger.async_context_preserved => {
            DecisionRule::DeferredContextPreserved
        }
        OriginTiming::PostResume => return Decision::fallback(DecisionRule::DeferredContextLost),
    };

    // Kept isolated: an unwrapped pending indicator rendered in the same
    // pass drags the boundary down with it.
    if trigger.pending_indicator {
        return Decision::fallback(DecisionRule::PendingIndicatorCoUpdate);
    }

    Decision::keep(eligible)
}
