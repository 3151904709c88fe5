use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::deferred::{DeferredSubtree, RenderContext};
use crate::error::ResumeError;
use crate::resume::BoundaryState;
use crate::scheduler::UpdateTrigger;
use crate::tree::{BoundaryNode, ComponentTree, Node};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundarySpec {
    pub id: String,
    /// Falls back to `HarnessConfig::default_client_latency_ms`.
    #[serde(default)]
    pub client_latency_ms: Option<u64>,
    #[serde(default)]
    pub pre_resolved: bool,
    #[serde(default)]
    pub server_rejection: Option<String>,
    #[serde(default)]
    pub content_throws: Option<String>,
    #[serde(default)]
    pub children: Vec<BoundarySpec>,
}

impl BoundarySpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_latency_ms: None,
            pre_resolved: false,
            server_rejection: None,
            content_throws: None,
            children: Vec::new(),
        }
    }

    pub fn client_latency_ms(mut self, latency_ms: u64) -> Self {
        self.client_latency_ms = Some(latency_ms);
        self
    }

    pub fn pre_resolved(mut self) -> Self {
        self.pre_resolved = true;
        self
    }

    pub fn server_rejection(mut self, message: impl Into<String>) -> Self {
        self.server_rejection = Some(message.into());
        self
    }

    pub fn content_throws(mut self, message: impl Into<String>) -> Self {
        self.content_throws = Some(message.into());
        self
    }

    pub fn child(mut self, child: BoundarySpec) -> Self {
        self.children.push(child);
        self
    }

    fn build(&self, config: &HarnessConfig) -> Node {
        let mut content = vec![Node::element("h2", vec![Node::text(self.id.clone())])];
        content.extend(self.children.iter().map(|child| child.build(config)));
        if let Some(message) = &self.content_throws {
            content.push(Node::throw(message.clone()));
        }

        let fallback = Node::element("p", vec![Node::text(format!("Loading {}", self.id))])
            .with_attr("class", "placeholder");
        let content =
            Node::element("section", content).with_attr("data-boundary", self.id.clone());

        let latency = self
            .client_latency_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.default_client_latency());
        let mut boundary =
            BoundaryNode::new(self.id.clone(), fallback, content).with_client_latency(latency);

        if self.pre_resolved {
            boundary = boundary.pre_resolved();
        }

        if let Some(message) = &self.server_rejection {
            boundary = boundary.with_server_subtree(
                DeferredSubtree::new(RenderContext::Server, Duration::ZERO)
                    .rejecting(message.clone()),
            );
        }

        Node::boundary(boundary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    /// Offset from attach at which the interaction starts.
    pub at_ms: u64,
    pub boundary_id: String,
    pub trigger: UpdateTrigger,
}

impl ScenarioStep {
    /// Offset at which the state-changing write lands.
    pub fn write_at_ms(&self) -> Result<u64, ResumeError> {
        self.at_ms.checked_add(self.trigger.write_delay_ms()).ok_or_else(|| {
            ResumeError::validation(format!(
                "Step for '{}' at {}ms overflows after a {}ms delay",
                self.boundary_id,
                self.at_ms,
                self.trigger.write_delay_ms()
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expectation {
    FinalStates(BTreeMap<String, BoundaryState>),
    /// No boundary shows its placeholder at any point.
    NeverPlaceholder,
    ShellRenderError,
}

impl Expectation {
    pub fn final_states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = (S, BoundaryState)>,
        S: Into<String>,
    {
        Self::FinalStates(states.into_iter().map(|(id, state)| (id.into(), state)).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub boundaries: Vec<BoundarySpec>,
    #[serde(default)]
    pub shell_throws: Option<String>,
    /// Falls back to `HarnessConfig::initial_pass_ms`.
    #[serde(default)]
    pub initial_pass_ms: Option<u64>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
    pub observe_at_ms: u64,
    pub expectation: Expectation,
}

impl Scenario {
    pub fn new(name: impl Into<String>, expectation: Expectation) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            boundaries: Vec::new(),
            shell_throws: None,
            initial_pass_ms: None,
            steps: Vec::new(),
            observe_at_ms: 1000,
            expectation,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn boundary(mut self, boundary: BoundarySpec) -> Self {
        self.boundaries.push(boundary);
        self
    }

    pub fn shell_throws(mut self, message: impl Into<String>) -> Self {
        self.shell_throws = Some(message.into());
        self
    }

    pub fn initial_pass_ms(mut self, pass_ms: u64) -> Self {
        self.initial_pass_ms = Some(pass_ms);
        self
    }

    pub fn step(
        mut self,
        at_ms: u64,
        boundary_id: impl Into<String>,
        trigger: UpdateTrigger,
    ) -> Self {
        self.steps.push(ScenarioStep { at_ms, boundary_id: boundary_id.into(), trigger });
        self
    }

    pub fn observe_at(mut self, observe_at_ms: u64) -> Self {
        self.observe_at_ms = observe_at_ms;
        self
    }

    pub fn validate(&self) -> Result<(), ResumeError> {
        if self.name.trim().is_empty() {
            return Err(ResumeError::validation("Scenario name must not be empty"));
        }

        for step in &self.steps {
            let write_at_ms = step.write_at_ms()?;
            if write_at_ms > self.observe_at_ms {
                return Err(ResumeError::validation(format!(
                    "Scenario '{}': step for '{}' writes at {}ms, after observation at {}ms",
                    self.name, step.boundary_id, write_at_ms, self.observe_at_ms
                )));
            }
        }

        Ok(())
    }

    pub fn build_tree(&self, config: &HarnessConfig) -> Result<ComponentTree, ResumeError> {
        let mut children = vec![Node::element("h1", vec![Node::text(self.name.clone())])];
        children.extend(self.boundaries.iter().map(|boundary| boundary.build(config)));
        if let Some(message) = &self.shell_throws {
            children.push(Node::throw(message.clone()));
        }

        ComponentTree::new(Node::element("main", children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SourceKind;

    #[test]
    fn test_build_tree_nests_children() {
        let scenario = Scenario::new("nested", Expectation::NeverPlaceholder).boundary(
            BoundarySpec::new("outer").child(BoundarySpec::new("inner").client_latency_ms(50)),
        );

        let tree = scenario.build_tree(&HarnessConfig::default()).unwrap();
        let entries = tree.boundaries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].parent_id, Some("outer"));
        assert_eq!(entries[0].node.client.latency(), Duration::from_millis(3000));
        assert_eq!(entries[1].node.client.latency(), Duration::from_millis(50));
    }

    #[test]
    fn test_steps_after_observation_rejected() {
        let scenario = Scenario::new("late", Expectation::NeverPlaceholder)
            .boundary(BoundarySpec::new("main"))
            .step(
                990,
                "main",
                UpdateTrigger::deferred(SourceKind::LocalState).after_suspension(20, true),
            )
            .observe_at(1000);

        let error = scenario.validate().unwrap_err();
        assert_eq!(error.code(), "VALIDATION");
        assert!(error.message().contains("writes at 1010ms"));
    }

    #[test]
    fn test_scenario_from_json() {
        let json = r#"{
            "name": "json",
            "boundaries": [{ "id": "main", "clientLatencyMs": 3000 }],
            "steps": [{
                "atMs": 0,
                "boundaryId": "main",
                "trigger": {
                    "classification": "urgent",
                    "valueChanged": true,
                    "sourceKind": "localState",
                    "originTiming": "preResume"
                }
            }],
            "observeAtMs": 1000,
            "expectation": { "finalStates": { "main": "placeholder" } }
        }"#;

        let scenario: Scenario = serde_json::from_str(json).unwrap();

        assert!(scenario.validate().is_ok());
        assert_eq!(scenario.steps[0].trigger, UpdateTrigger::urgent(SourceKind::LocalState));
        assert_eq!(
            scenario.expectation,
            Expectation::final_states([("main", BoundaryState::Placeholder)])
        );
    }

    #[test]
    fn test_overflowing_write_time_is_a_validation_error() {
        let scenario = Scenario::new("overflow", Expectation::NeverPlaceholder)
            .boundary(BoundarySpec::new("main"))
            .step(
                u64::MAX,
                "main",
                UpdateTrigger::deferred(SourceKind::LocalState).after_suspension(5, true),
            )
            .observe_at(u64::MAX);

        let error = scenario.validate().unwrap_err();

        assert_eq!(error.code(), "VALIDATION");
        assert!(error.message().contains("overflows"));
    }

    #[test]
    fn test_duplicate_boundary_ids_fail_tree_build() {
        let scenario = Scenario::new("dupes", Expectation::NeverPlaceholder)
            .boundary(BoundarySpec::new("main"))
            .boundary(BoundarySpec::new("main"));

        assert!(scenario.build_tree(&HarnessConfig::default()).is_err());
    }
}
