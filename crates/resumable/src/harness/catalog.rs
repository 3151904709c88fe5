//! The fixed scenario catalog run by the `resumable` binary.
//!
//! Every scenario attaches at 0ms. Unless stated otherwise a boundary's
//! client content takes 3000ms to load and the observation happens at
//! 1000ms, long before that.

use crate::resume::BoundaryState;
use crate::resume::BoundaryState::{Content, Placeholder};
use crate::scheduler::{SourceKind, UpdateTrigger};

use super::scenario::{BoundarySpec, Expectation, Scenario};

const CLIENT_LATENCY_MS: u64 = 3000;

fn main_boundary() -> BoundarySpec {
    BoundarySpec::new("main").client_latency_ms(CLIENT_LATENCY_MS)
}

fn single(name: &str, trigger: UpdateTrigger, expected: BoundaryState) -> Scenario {
    Scenario::new(name, Expectation::final_states([("main", expected)]))
        .boundary(main_boundary())
        .step(0, "main", trigger)
}

pub fn all() -> Vec<Scenario> {
    vec![
        single("urgent-while-resuming", UpdateTrigger::urgent(SourceKind::LocalState), Placeholder)
            .describe("An urgent update right after attach hides the streamed content"),
        single("transition-while-resuming", UpdateTrigger::deferred(SourceKind::LocalState), Content)
            .describe("A transition keeps the streamed content while the client code loads"),
        single(
            "transition-with-pending-indicator",
            UpdateTrigger::deferred(SourceKind::LocalState).with_pending_indicator(),
            Placeholder,
        )
        .describe("An unwrapped pending indicator in the same pass drags the boundary down"),
        single(
            "store-urgent",
            UpdateTrigger::urgent(SourceKind::SubscriptionStore),
            Placeholder,
        )
        .describe("Subscription store updates always fall back"),
        single(
            "store-transition",
            UpdateTrigger::deferred(SourceKind::SubscriptionStore),
            Placeholder,
        )
        .describe("Wrapping a store update in a transition does not help"),
        single(
            "unchanged-value",
            UpdateTrigger::urgent(SourceKind::LocalState).unchanged(),
            Content,
        )
        .describe("Writing the current value is a no-op"),
        single(
            "transition-after-await-context-lost",
            UpdateTrigger::deferred(SourceKind::LocalState).after_suspension(5, false),
            Placeholder,
        )
        .describe("A hook-provided transition loses its context across an await"),
        single(
            "transition-after-await-context-preserved",
            UpdateTrigger::deferred(SourceKind::LocalState).after_suspension(5, true),
            Content,
        )
        .describe("The module-level transition keeps its context across an await"),
        single("reducer-transition", UpdateTrigger::deferred(SourceKind::Reducer), Content)
            .describe("Reducer dispatches inside a transition keep content"),
        Scenario::new(
            "urgent-after-resume",
            Expectation::final_states([("main", Placeholder)]),
        )
        .describe("Once resumed, an urgent update still suspends content that is not ready")
        .boundary(main_boundary())
        .step(50, "main", UpdateTrigger::urgent(SourceKind::LocalState)),
        Scenario::new(
            "transition-after-resume",
            Expectation::final_states([("main", Content)]),
        )
        .describe("Once resumed, a transition keeps content")
        .boundary(main_boundary())
        .step(50, "main", UpdateTrigger::deferred(SourceKind::LocalState)),
        single(
            "placeholder-recovers",
            UpdateTrigger::urgent(SourceKind::LocalState),
            Content,
        )
        .describe("A fallen-back boundary returns to content when its client code loads")
        .observe_at(CLIENT_LATENCY_MS + 500),
        Scenario::new("pre-resolved-round-trip", Expectation::NeverPlaceholder)
            .describe("Content that is ready everywhere never shows a placeholder")
            .boundary(BoundarySpec::new("main").pre_resolved())
            .boundary(BoundarySpec::new("sidebar").pre_resolved())
            .step(0, "main", UpdateTrigger::urgent(SourceKind::LocalState))
            .step(0, "sidebar", UpdateTrigger::urgent(SourceKind::SubscriptionStore))
            .step(50, "main", UpdateTrigger::urgent(SourceKind::Reducer)),
        Scenario::new(
            "nested-deferred-failure",
            Expectation::final_states([("outer", Content), ("inner", Placeholder)]),
        )
        .describe("A failing nested boundary falls back alone")
        .boundary(
            BoundarySpec::new("outer")
                .client_latency_ms(CLIENT_LATENCY_MS)
                .child(
                    BoundarySpec::new("inner")
                        .client_latency_ms(CLIENT_LATENCY_MS)
                        .content_throws("comments unavailable"),
                ),
        ),
        Scenario::new("shell-failure", Expectation::ShellRenderError)
            .describe("A failure outside every boundary aborts the scenario")
            .boundary(main_boundary())
            .shell_throws("layout crashed"),
        Scenario::new("unknown-boundary", Expectation::final_states([("main", Content)]))
            .describe("Dispatching to a missing boundary is reported and changes nothing")
            .boundary(main_boundary())
            .step(0, "sidebar", UpdateTrigger::urgent(SourceKind::LocalState)),
        Scenario::new("server-rejection", Expectation::final_states([("main", Placeholder)]))
            .describe("A boundary whose server data failed stays on its placeholder")
            .boundary(main_boundary().server_rejection("upstream timeout")),
    ]
}

pub fn find(name: &str) -> Option<Scenario> {
    all().into_iter().find(|scenario| scenario.name == name)
}
