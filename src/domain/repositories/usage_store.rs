use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::build_types::BuildType,
    subscriptions::{NewSubscription, SubscriptionChangeset, SubscriptionModel},
    usage::{BonusUnlockEventModel, BuildUsageEventModel},
};

/// Returned by `create_subscription` when the user already has a
/// non-canceled subscription. Carried inside the `anyhow::Error` so callers
/// can downcast and map it to a typed domain error.
#[derive(Debug, Error)]
#[error("user already has a subscription")]
pub struct DuplicateSubscription;

/// Durable counters for builds and bonus unlocks, plus subscription records.
/// Implementations must enforce at most one non-canceled subscription per
/// user and are expected to fail fast rather than retry.
#[async_trait]
#[automock]
pub trait UsageStore {
    async fn get_subscription_by_user_id(&self, user_id: Uuid)
    -> Result<Option<SubscriptionModel>>;

    async fn create_subscription(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<SubscriptionModel>;

    async fn update_subscription(
        &self,
        subscription_id: Uuid,
        changes: SubscriptionChangeset,
    ) -> Result<SubscriptionModel>;

    async fn record_build_usage(
        &self,
        user_id: Uuid,
        build_type: BuildType,
    ) -> Result<BuildUsageEventModel>;

    async fn get_build_count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64>;

    async fn record_bonus_unlock(
        &self,
        user_id: Uuid,
        mvp_id: Option<Uuid>,
        unlocked_feature: String,
    ) -> Result<BonusUnlockEventModel>;

    async fn get_bonus_unlocks_count_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64>;
}
