pub mod subscriptions;
pub mod usage_events;
