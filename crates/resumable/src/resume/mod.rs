pub mod boundary;
pub mod coordinator;
pub mod markers;

pub use boundary::{BoundaryState, LiveBoundary, ResumePhase, ServerOutcome};
pub use coordinator::{
    BoundaryReport, DispatchOutcome, RenderCause, RenderRecord, ResumeCoordinator,
};
pub use markers::DocumentMarkers;
