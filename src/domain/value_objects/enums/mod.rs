pub mod build_types;
pub mod subscription_statuses;
