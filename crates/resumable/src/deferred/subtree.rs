use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderContext {
    Server,
    Client,
}

impl std::fmt::Display for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderContext::Server => write!(f, "server"),
            RenderContext::Client => write!(f, "client"),
        }
    }
}

/// A unit of asynchronous content whose availability is delayed by a
/// context-specific latency.
///
/// `resolved` moves from `false` to `true` exactly once. Server subtrees
/// never carry a latency.
#[derive(Debug)]
pub struct DeferredSubtree {
    context: RenderContext,
    latency: Duration,
    rejection: Option<String>,
    resolved: AtomicBool,
}

impl DeferredSubtree {
    pub fn new(context: RenderContext, latency: Duration) -> Self {
        let latency = match context {
            RenderContext::Server if !latency.is_zero() => {
                debug!("Ignoring {:?} latency for server subtree", latency);
                Duration::ZERO
            }
            _ => latency,
        };

        Self { context, latency, rejection: None, resolved: AtomicBool::new(false) }
    }

    pub fn pre_resolved(context: RenderContext) -> Self {
        let subtree = Self::new(context, Duration::ZERO);
        subtree.resolve();
        subtree
    }

    /// Makes the provider reject this subtree once its latency elapses.
    pub fn rejecting(mut self, message: impl Into<String>) -> Self {
        self.rejection = Some(message.into());
        self
    }

    /// A fresh, unresolved instance with the same context, latency and
    /// rejection.
    pub fn renewed(&self) -> Self {
        Self::new(self.context, self.latency).with_rejection(self.rejection.clone())
    }

    fn with_rejection(mut self, rejection: Option<String>) -> Self {
        self.rejection = rejection;
        self
    }

    pub fn context(&self) -> RenderContext {
        self.context
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that performed the transition.
    pub fn resolve(&self) -> bool {
        self.resolved.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }
}
