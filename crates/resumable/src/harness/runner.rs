use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::deferred::{DeferredContentProvider, SubscriptionStore, TimerProvider, TimerRegistry};
use crate::error::ResumeError;
use crate::resume::ResumeCoordinator;
use crate::scheduler::{SourceKind, UpdateTrigger};
use crate::streaming::{RenderOptions, SerializeOptions, serialize_with};

use super::outcome::{DecisionRecord, Outcome, Summary};
use super::scenario::{Scenario, ScenarioStep};

pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn DeferredContentProvider> + Send + Sync>;

/// Values the scenario's handlers write to. Built fresh for every run.
#[derive(Debug)]
struct SourceState {
    local: i64,
    reducer: i64,
    store: SubscriptionStore,
}

enum ReducerAction {
    Increment,
    Noop,
}

impl SourceState {
    fn new() -> Self {
        Self { local: 0, reducer: 0, store: SubscriptionStore::new(0) }
    }

    /// Performs the write a trigger describes and reports whether the value
    /// actually changed.
    fn write(&mut self, trigger: &UpdateTrigger) -> bool {
        let delta = i64::from(trigger.value_changed);

        match trigger.source_kind {
            SourceKind::LocalState => {
                let next = self.local + delta;
                let changed = next != self.local;
                self.local = next;
                changed
            }
            SourceKind::Reducer => {
                let action = if trigger.value_changed {
                    ReducerAction::Increment
                } else {
                    ReducerAction::Noop
                };
                let next = match action {
                    ReducerAction::Increment => self.reducer + 1,
                    ReducerAction::Noop => self.reducer,
                };
                let changed = next != self.reducer;
                self.reducer = next;
                changed
            }
            SourceKind::SubscriptionStore => self.store.set(self.store.snapshot().value + delta),
            SourceKind::Unrecognized => trigger.value_changed,
        }
    }
}

enum Event<'a> {
    Write(&'a ScenarioStep),
    CompleteInitialPass,
}

/// Runs scenarios on the tokio clock, one fresh set of simulators per run.
#[derive(Clone)]
pub struct Harness {
    config: Config,
    provider_factory: ProviderFactory,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            provider_factory: Arc::new(|| {
                Arc::new(TimerProvider::new()) as Arc<dyn DeferredContentProvider>
            }),
        }
    }

    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one scenario. A shell render failure is reported inside the
    /// returned `Outcome`; a scenario that does not settle in time fails with
    /// `ScenarioTimeout`. A scenario counts as settled once its observation
    /// time is reached; the harness does not wait for pending client loads.
    ///
    /// On return every task the run started is gone: client resolution
    /// timers are shut down and dropping the render stream aborts its driver.
    pub async fn run(&self, scenario: &Scenario) -> Result<Outcome, ResumeError> {
        scenario.validate()?;

        info!("Running scenario '{}'", scenario.name);

        let timers = Arc::new(TimerRegistry::new());
        let limit = self.config.harness.scenario_timeout();
        let result = tokio::time::timeout(limit, self.execute(scenario, Arc::clone(&timers))).await;

        timers.shutdown();

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ResumeError::scenario_timeout(format!(
                "Scenario '{}' did not settle within {}ms",
                scenario.name,
                limit.as_millis()
            ))
            .with_property("scenario", &scenario.name)),
        }
    }

    /// Runs every scenario concurrently. Scenarios that error out are counted
    /// as failures.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Summary {
        let runs = scenarios.iter().map(|scenario| async move {
            match self.run(scenario).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!("Scenario '{}' failed to run: {}", scenario.name, error);
                    Outcome::halted(scenario, error, Vec::new())
                }
            }
        });

        Summary::from_outcomes(futures::future::join_all(runs).await)
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        timers: Arc<TimerRegistry>,
    ) -> Result<Outcome, ResumeError> {
        let provider = (self.provider_factory)();
        let mut sources = SourceState::new();
        let tree = scenario.build_tree(&self.config.harness)?;

        let errors: Arc<Mutex<Vec<ResumeError>>> = Arc::new(Mutex::new(Vec::new()));
        let render_options = RenderOptions {
            chunk_capacity: self.config.render.chunk_channel_capacity,
            on_error: Some({
                let errors = Arc::clone(&errors);
                Arc::new(move |error: &ResumeError| {
                    debug!("Recorded deferred failure: {}", error);
                    errors.lock().push(error.clone());
                })
            }),
        };
        let serialize_options = SerializeOptions {
            title: self.config.render.document_title.clone(),
            include_diagnostic_marker: self.config.render.include_diagnostic_marker,
        };

        let document =
            match serialize_with(&tree, &serialize_options, render_options, Arc::clone(&provider))
                .await
            {
                Ok(document) => document,
                Err(error) if error.is_fatal() => {
                    info!("Scenario '{}' halted: {}", scenario.name, error);
                    let recorded = errors.lock().clone();
                    return Ok(Outcome::halted(scenario, error, recorded));
                }
                Err(error) => return Err(error),
            };

        let coordinator = ResumeCoordinator::attach(&document, &tree, provider, timers)?;
        let origin = Instant::now();

        let pass_ms = scenario.initial_pass_ms.unwrap_or(self.config.harness.initial_pass_ms);
        let mut events: Vec<(u64, u8, Event<'_>)> = scenario
            .steps
            .iter()
            .map(|step| Ok((step.write_at_ms()?, 0, Event::Write(step))))
            .collect::<Result<_, ResumeError>>()?;
        events.push((pass_ms, 1, Event::CompleteInitialPass));
        events.sort_by_key(|(at_ms, rank, _)| (*at_ms, *rank));

        let mut decisions = Vec::new();

        for (at_ms, _, event) in events {
            tokio::time::sleep_until(deadline(origin, at_ms)).await;

            match event {
                Event::CompleteInitialPass => {
                    coordinator.complete_initial_pass();
                }
                Event::Write(step) => {
                    let mut trigger = step.trigger.clone();
                    trigger.value_changed = sources.write(&step.trigger);

                    match coordinator.dispatch(&step.boundary_id, &trigger) {
                        Ok(dispatched) => decisions.push(DecisionRecord {
                            at_ms,
                            boundary_id: step.boundary_id.clone(),
                            phase: dispatched.phase,
                            rule: dispatched.applied.decision.rule,
                            keep_content: dispatched.applied.decision.keep_content,
                            state_after: dispatched.applied.state_after,
                        }),
                        Err(error) => errors.lock().push(error),
                    }
                }
            }
        }

        tokio::time::sleep_until(deadline(origin, scenario.observe_at_ms)).await;

        let mut recorded = errors.lock().clone();
        recorded.extend(coordinator.errors());

        let outcome =
            Outcome::completed(scenario, coordinator.snapshot(), decisions, recorded, document.len());

        debug!(
            "Scenario '{}' observed at {}ms: {:?}",
            scenario.name, scenario.observe_at_ms, outcome.verdict
        );

        Ok(outcome)
    }
}

/// `origin + at_ms`, saturating far in the future.
fn deadline(origin: Instant, at_ms: u64) -> Instant {
    origin
        .checked_add(Duration::from_millis(at_ms))
        .unwrap_or_else(|| origin + Duration::from_secs(86_400 * 365 * 30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::scenario::{BoundarySpec, Expectation};
    use crate::resume::BoundaryState;
    use crate::scheduler::DecisionRule;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::deferred::DeferredSubtree;

    fn single(name: &str, expectation: Expectation) -> Scenario {
        Scenario::new(name, expectation).boundary(BoundarySpec::new("main").client_latency_ms(3000))
    }

    #[test]
    fn test_source_writes_follow_trigger() {
        let mut sources = SourceState::new();

        assert!(sources.write(&UpdateTrigger::urgent(SourceKind::LocalState)));
        assert!(!sources.write(&UpdateTrigger::urgent(SourceKind::LocalState).unchanged()));
        assert!(sources.write(&UpdateTrigger::deferred(SourceKind::Reducer)));
        assert!(sources.write(&UpdateTrigger::urgent(SourceKind::SubscriptionStore)));
        assert!(!sources.write(&UpdateTrigger::urgent(SourceKind::SubscriptionStore).unchanged()));

        assert_eq!(sources.local, 1);
        assert_eq!(sources.reducer, 1);
        assert_eq!(sources.store.snapshot().version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_urgent_update_while_resuming() {
        let expectation = Expectation::final_states([("main", BoundaryState::Placeholder)]);
        let scenario = single("urgent", expectation)
            .step(0, "main", UpdateTrigger::urgent(SourceKind::LocalState));

        let outcome = Harness::new(&Config::default()).run(&scenario).await.unwrap();

        assert!(outcome.passed(), "{:?}", outcome.verdict);
        assert_eq!(outcome.decisions[0].rule, DecisionRule::UrgentWhileResuming);
        assert!(outcome.document_len > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_at_pass_boundary_is_still_resuming() {
        let expectation = Expectation::final_states([("main", BoundaryState::Placeholder)]);
        let scenario = single("edge", expectation)
            .initial_pass_ms(16)
            .step(16, "main", UpdateTrigger::urgent(SourceKind::LocalState))
            .step(17, "main", UpdateTrigger::deferred(SourceKind::LocalState));

        let outcome = Harness::new(&Config::default()).run(&scenario).await.unwrap();

        let phases: Vec<_> = outcome.decisions.iter().map(|d| d.phase).collect();
        assert_eq!(
            phases,
            vec![crate::resume::ResumePhase::Resuming, crate::resume::ResumePhase::Resumed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_failure_is_captured_as_fatal() {
        let scenario = single("shell", Expectation::ShellRenderError).shell_throws("layout broke");

        let outcome = Harness::new(&Config::default()).run(&scenario).await.unwrap();

        assert!(outcome.passed());
        assert_eq!(outcome.fatal.as_ref().map(ResumeError::code), Some("SHELL_RENDER_ERROR"));
        assert!(outcome.boundaries.is_empty());
    }

    struct StalledProvider;

    #[async_trait]
    impl DeferredContentProvider for StalledProvider {
        async fn provide(&self, _subtree: Arc<DeferredSubtree>) -> Result<(), ResumeError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_that_never_settles_times_out() {
        let mut config = Config::default();
        config.harness.scenario_timeout_ms = 500;

        let harness = Harness::new(&config).with_provider_factory(Arc::new(|| {
            Arc::new(StalledProvider) as Arc<dyn DeferredContentProvider>
        }));

        let error = harness
            .run(&single("stalled", Expectation::final_states([("main", BoundaryState::Content)])))
            .await
            .unwrap_err();

        assert_eq!(error.code(), "SCENARIO_TIMEOUT");
        assert_eq!(error.get_property("scenario"), Some("stalled"));
    }

    struct SlowServerProvider {
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeferredContentProvider for SlowServerProvider {
        async fn provide(&self, subtree: Arc<DeferredSubtree>) -> Result<(), ResumeError> {
            tokio::time::sleep(Duration::from_secs(20)).await;
            subtree.resolve();
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_in_flight_server_content() {
        let mut config = Config::default();
        config.harness.scenario_timeout_ms = 500;

        let completed = Arc::new(AtomicUsize::new(0));
        let harness = Harness::new(&config).with_provider_factory({
            let completed = Arc::clone(&completed);
            Arc::new(move || {
                Arc::new(SlowServerProvider { completed: Arc::clone(&completed) })
                    as Arc<dyn DeferredContentProvider>
            })
        });

        let error = harness
            .run(&single("slow", Expectation::final_states([("main", BoundaryState::Content)])))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "SCENARIO_TIMEOUT");

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_run_gets_a_fresh_provider() {
        let built = Arc::new(AtomicUsize::new(0));
        let harness = Harness::new(&Config::default()).with_provider_factory({
            let built = Arc::clone(&built);
            Arc::new(move || {
                built.fetch_add(1, Ordering::SeqCst);
                Arc::new(TimerProvider::new()) as Arc<dyn DeferredContentProvider>
            })
        });

        let scenario = single("fresh", Expectation::final_states([("main", BoundaryState::Content)]));
        let summary = harness.run_all(&[scenario.clone(), scenario]).await;

        assert_eq!(summary.passed, 2);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_scenario_is_rejected_before_running() {
        let scenario = single("late", Expectation::NeverPlaceholder)
            .step(2000, "main", UpdateTrigger::urgent(SourceKind::LocalState))
            .observe_at(1000);

        let error = Harness::new(&Config::default()).run(&scenario).await.unwrap_err();
        assert_eq!(error.code(), "VALIDATION");
    }
}
