pub mod bonus_unlocks;
pub mod builds;
pub mod subscriptions;
pub mod usage;
