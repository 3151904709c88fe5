pub mod catalog;
pub mod outcome;
pub mod runner;
pub mod scenario;

pub use outcome::{DecisionRecord, Outcome, Summary, Verdict};
pub use runner::{Harness, ProviderFactory};
pub use scenario::{BoundarySpec, Expectation, Scenario, ScenarioStep};
