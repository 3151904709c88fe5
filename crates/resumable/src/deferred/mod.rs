pub mod provider;
pub mod store;
pub mod subtree;
pub mod timers;

pub use provider::{DeferredContentProvider, TimerProvider};
pub use store::{StoreSnapshot, SubscriptionStore};
pub use subtree::{DeferredSubtree, RenderContext};
pub use timers::TimerRegistry;
