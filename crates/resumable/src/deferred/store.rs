use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub value: i64,
    pub version: u64,
}

/// External store read through a subscription accessor. Each scenario
/// builds its own instance.
#[derive(Debug)]
pub struct SubscriptionStore {
    sender: watch::Sender<StoreSnapshot>,
}

impl SubscriptionStore {
    pub fn new(initial: i64) -> Self {
        let (sender, _) = watch::channel(StoreSnapshot { value: initial, version: 0 });
        Self { sender }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        *self.sender.borrow()
    }

    /// Writes `value` and bumps the version when it differs from the
    /// current one. Returns whether the value changed.
    pub fn set(&self, value: i64) -> bool {
        self.sender.send_if_modified(|snapshot| {
            if snapshot.value == value {
                return false;
            }
            snapshot.value = value;
            snapshot.version += 1;
            true
        })
    }
}
