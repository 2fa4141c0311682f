pub mod reconciler;
pub mod subscription;

pub use reconciler::{DropReason, LiveOutcome, LoadFailure, LoadOutcome, Phase, Reconciler};
pub use subscription::{FeedEvent, ManagerSettings, SubscriptionManager, WatchEntry};
