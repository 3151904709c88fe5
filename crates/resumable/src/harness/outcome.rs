use serde::Serialize;

use crate::error::ResumeError;
use crate::resume::{BoundaryReport, BoundaryState, ResumePhase};
use crate::scheduler::DecisionRule;

use super::scenario::{Expectation, Scenario};

/// One dispatched update as the harness observed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub at_ms: u64,
    pub boundary_id: String,
    pub phase: ResumePhase,
    pub rule: DecisionRule,
    pub keep_content: bool,
    pub state_after: BoundaryState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum Verdict {
    Pass,
    Fail { reasons: Vec<String> },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub scenario: String,
    pub boundaries: Vec<BoundaryReport>,
    pub decisions: Vec<DecisionRecord>,
    /// Non-fatal errors recorded while the scenario ran.
    pub errors: Vec<ResumeError>,
    pub document_len: usize,
    pub fatal: Option<ResumeError>,
    pub verdict: Verdict,
}

impl Outcome {
    pub fn completed(
        scenario: &Scenario,
        boundaries: Vec<BoundaryReport>,
        decisions: Vec<DecisionRecord>,
        errors: Vec<ResumeError>,
        document_len: usize,
    ) -> Self {
        let verdict = evaluate(&scenario.expectation, &boundaries, None);
        Self {
            scenario: scenario.name.clone(),
            boundaries,
            decisions,
            errors,
            document_len,
            fatal: None,
            verdict,
        }
    }

    /// A scenario halted by a fatal error before any boundary was observed.
    pub fn halted(scenario: &Scenario, error: ResumeError, errors: Vec<ResumeError>) -> Self {
        let verdict = evaluate(&scenario.expectation, &[], Some(&error));
        Self {
            scenario: scenario.name.clone(),
            boundaries: Vec::new(),
            decisions: Vec::new(),
            errors,
            document_len: 0,
            fatal: Some(error),
            verdict,
        }
    }

    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }

    pub fn final_state(&self, boundary_id: &str) -> Option<BoundaryState> {
        self.boundaries.iter().find(|report| report.id == boundary_id).map(|r| r.final_state)
    }
}

fn evaluate(
    expectation: &Expectation,
    boundaries: &[BoundaryReport],
    fatal: Option<&ResumeError>,
) -> Verdict {
    let mut reasons = Vec::new();

    match (expectation, fatal) {
        (Expectation::ShellRenderError, Some(ResumeError::ShellRender(_, _))) => {}
        (Expectation::ShellRenderError, Some(other)) => {
            reasons.push(format!("expected a shell render error, got: {other}"));
        }
        (Expectation::ShellRenderError, None) => {
            reasons.push("expected a shell render error, but the shell rendered".to_string());
        }
        (_, Some(error)) => reasons.push(format!("scenario halted: {error}")),
        (Expectation::FinalStates(expected), None) => {
            for (id, state) in expected {
                match boundaries.iter().find(|report| &report.id == id) {
                    Some(report) if report.final_state == *state => {}
                    Some(report) => reasons.push(format!(
                        "boundary {id}: expected {state}, observed {}",
                        report.final_state
                    )),
                    None => reasons.push(format!("boundary {id}: not present after attach")),
                }
            }
        }
        (Expectation::NeverPlaceholder, None) => {
            for report in boundaries.iter().filter(|report| report.ever_showed_placeholder()) {
                reasons.push(format!(
                    "boundary {}: showed its placeholder (history {:?})",
                    report.id, report.history
                ));
            }
        }
    }

    if reasons.is_empty() { Verdict::Pass } else { Verdict::Fail { reasons } }
}

/// Aggregate of a catalog run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<Outcome>,
}

impl Summary {
    pub fn from_outcomes(results: Vec<Outcome>) -> Self {
        let passed = results.iter().filter(|outcome| outcome.passed()).count();
        Self { passed, failed: results.len() - passed, results }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resume::ServerOutcome;

    fn report(id: &str, history: Vec<BoundaryState>) -> BoundaryReport {
        BoundaryReport {
            id: id.to_string(),
            server_outcome: ServerOutcome::Content,
            final_state: *history.last().unwrap_or(&BoundaryState::Content),
            content_ready: false,
            history,
            renders: 1,
        }
    }

    #[test]
    fn test_final_state_mismatch_is_reported() {
        let scenario = Scenario::new(
            "mismatch",
            Expectation::final_states([
                ("main", BoundaryState::Content),
                ("ghost", BoundaryState::Content),
            ]),
        );
        let reports =
            vec![report("main", vec![BoundaryState::Content, BoundaryState::Placeholder])];

        let outcome = Outcome::completed(&scenario, reports, Vec::new(), Vec::new(), 10);

        match outcome.verdict {
            Verdict::Fail { reasons } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("boundary ghost"));
                assert!(reasons[1].contains("expected content, observed placeholder"));
            }
            Verdict::Pass => panic!("mismatch must not pass"),
        }
    }

    #[test]
    fn test_never_placeholder_checks_history() {
        let scenario = Scenario::new("round trip", Expectation::NeverPlaceholder);
        let recovered = vec![report(
            "main",
            vec![BoundaryState::Content, BoundaryState::Placeholder, BoundaryState::Content],
        )];

        let outcome = Outcome::completed(&scenario, recovered, Vec::new(), Vec::new(), 10);
        assert!(!outcome.passed());

        let steady = vec![report("main", vec![BoundaryState::Content])];
        let outcome = Outcome::completed(&scenario, steady, Vec::new(), Vec::new(), 10);
        assert!(outcome.passed());
    }

    #[test]
    fn test_fatal_errors_against_expectation() {
        let expects_failure = Scenario::new("shell", Expectation::ShellRenderError);
        let outcome =
            Outcome::halted(&expects_failure, ResumeError::shell_render("boom"), Vec::new());
        assert!(outcome.passed());

        let outcome =
            Outcome::halted(&expects_failure, ResumeError::scenario_timeout("slow"), Vec::new());
        assert!(!outcome.passed());

        let expects_states =
            Scenario::new("states", Expectation::final_states([("main", BoundaryState::Content)]));
        let outcome =
            Outcome::halted(&expects_states, ResumeError::shell_render("boom"), Vec::new());
        assert!(!outcome.passed());
    }

    #[test]
    fn test_summary_counts() {
        let scenario = Scenario::new("shell", Expectation::ShellRenderError);
        let summary = Summary::from_outcomes(vec![
            Outcome::halted(&scenario, ResumeError::shell_render("boom"), Vec::new()),
            Outcome::halted(&scenario, ResumeError::scenario_timeout("slow"), Vec::new()),
        ]);

        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_passed());
    }
}
