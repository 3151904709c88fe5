use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateClassification {
    Urgent,
    /// Wrapped in a transition.
    Deferred,
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    LocalState,
    Reducer,
    /// Read through an external-store subscription; never deferrable.
    SubscriptionStore,
    #[serde(other)]
    Unrecognized,
}

/// Where the value-changing write sits relative to the handler's
/// asynchronous suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginTiming {
    /// Written before any suspension point.
    PreResume,
    /// Written after the handler yielded.
    PostResume,
}

/// One simulated interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrigger {
    pub classification: UpdateClassification,
    pub value_changed: bool,
    pub source_kind: SourceKind,
    pub origin_timing: OriginTiming,
    /// The deferral wrapper used after the suspension point is the
    /// module-level one rather than one taken from a hook.
    #[serde(default)]
    pub async_context_preserved: bool,
    /// The same render pass also renders an unwrapped pending indicator
    /// into the boundary's subtree.
    #[serde(default)]
    pub pending_indicator: bool,
    /// Length of the simulated gap before a post-suspension write lands.
    #[serde(default)]
    pub suspend_ms: u64,
}

impl UpdateTrigger {
    pub fn new(classification: UpdateClassification, source_kind: SourceKind) -> Self {
        Self {
            classification,
            value_changed: true,
            source_kind,
            origin_timing: OriginTiming::PreResume,
            async_context_preserved: false,
            pending_indicator: false,
            suspend_ms: 0,
        }
    }

    pub fn urgent(source_kind: SourceKind) -> Self {
        Self::new(UpdateClassification::Urgent, source_kind)
    }

    pub fn deferred(source_kind: SourceKind) -> Self {
        Self::new(UpdateClassification::Deferred, source_kind)
    }

    pub fn unchanged(mut self) -> Self {
        self.value_changed = false;
        self
    }

    pub fn after_suspension(mut self, suspend_ms: u64, async_context_preserved: bool) -> Self {
        self.origin_timing = OriginTiming::PostResume;
        self.suspend_ms = suspend_ms;
        self.async_context_preserved = async_context_preserved;
        self
    }

    pub fn with_pending_indicator(mut self) -> Self {
        self.pending_indicator = true;
        self
    }

    /// Delay between the interaction and the state-changing write.
    pub fn write_delay_ms(&self) -> u64 {
        match self.origin_timing {
            OriginTiming::PreResume => 0,
            OriginTiming::PostResume => self.suspend_ms,
        }
    }
}

/// Which rule settled a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionRule {
    UnchangedValue,
    SubscriptionStore,
    Unrecognized,
    UrgentWhileResuming,
    DeferredBeforeSuspension,
    DeferredContextPreserved,
    DeferredContextLost,
    PendingIndicatorCoUpdate,
    DeferredAfterResume,
    UrgentAfterResume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub keep_content: bool,
    pub rule: DecisionRule,
}

impl Decision {
    pub fn keep(rule: DecisionRule) -> Self {
        Self { keep_content: true, rule }
    }

    pub fn fallback(rule: DecisionRule) -> Self {
        Self { keep_content: false, rule }
    }
}
