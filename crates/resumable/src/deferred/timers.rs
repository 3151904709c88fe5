use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::debug;

/// Scenario-scoped owner of every simulated resolution timer.
///
/// Shutting the registry down aborts whatever is still pending so nothing
/// leaks into the next scenario.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    tasks: Mutex<JoinSet<()>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self { tasks: Mutex::new(JoinSet::new()) }
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.lock().spawn(task);
    }

    /// Number of timers that have not finished yet.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            debug!("Aborting {} pending timers", tasks.len());
        }
        tasks.abort_all();
    }
}
