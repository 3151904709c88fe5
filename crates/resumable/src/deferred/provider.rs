use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::ResumeError;

use super::subtree::DeferredSubtree;

/// Supplies the content behind a deferred subtree.
///
/// Implementations resolve a subtree at most once and report a rejection as
/// a `DeferredContent` error.
#[async_trait]
pub trait DeferredContentProvider: Send + Sync {
    async fn provide(&self, subtree: Arc<DeferredSubtree>) -> Result<(), ResumeError>;
}

/// Resolves subtrees after their latency on the tokio clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerProvider;

impl TimerProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeferredContentProvider for TimerProvider {
    async fn provide(&self, subtree: Arc<DeferredSubtree>) -> Result<(), ResumeError> {
        if subtree.is_resolved() {
            return Ok(());
        }

        if !subtree.latency().is_zero() {
            tokio::time::sleep(subtree.latency()).await;
        }

        if let Some(message) = subtree.rejection() {
            return Err(ResumeError::deferred_content(message)
                .with_property("context", &subtree.context().to_string()));
        }

        if !subtree.resolve() {
            debug!("{} subtree was resolved by another waiter", subtree.context());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::RenderContext;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_timer_provider_waits_for_latency() {
        let provider = TimerProvider::new();
        let subtree =
            Arc::new(DeferredSubtree::new(RenderContext::Client, Duration::from_millis(3000)));

        let started = Instant::now();
        provider.provide(Arc::clone(&subtree)).await.unwrap();

        assert!(subtree.is_resolved());
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_provider_reports_rejection() {
        let provider = TimerProvider::new();
        let subtree = Arc::new(
            DeferredSubtree::new(RenderContext::Server, Duration::ZERO).rejecting("upstream 500"),
        );

        let error = provider.provide(Arc::clone(&subtree)).await.unwrap_err();

        assert_eq!(error.code(), "DEFERRED_CONTENT_ERROR");
        assert_eq!(error.get_property("context"), Some("server"));
        assert!(!subtree.is_resolved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_resolved_subtree_skips_latency() {
        let provider = TimerProvider::new();
        let subtree = Arc::new(DeferredSubtree::pre_resolved(RenderContext::Client));

        let started = Instant::now();
        provider.provide(subtree).await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
