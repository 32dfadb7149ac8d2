use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    repositories::usage_store::{DuplicateSubscription, UsageStore},
    value_objects::{
        enums::{build_types::BuildType, subscription_statuses::SubscriptionStatus},
        subscriptions::{NewSubscription, SubscriptionChangeset, SubscriptionModel},
        usage::{BonusUnlockEventModel, BuildUsageEventModel},
    },
};

/// In-memory [`UsageStore`] double. Enforces the same one-non-canceled-
/// subscription-per-user rule as the Postgres adapter so quota tests run
/// against the production semantics.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    subscriptions: Mutex<Vec<SubscriptionModel>>,
    build_events: Mutex<Vec<BuildUsageEventModel>>,
    bonus_events: Mutex<Vec<BonusUnlockEventModel>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
        mutex.lock().map_err(|_| anyhow!("usage store mutex poisoned"))
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get_subscription_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionModel>> {
        let subscriptions = Self::lock(&self.subscriptions)?;

        Ok(subscriptions
            .iter()
            .filter(|subscription| subscription.user_id == user_id)
            .max_by_key(|subscription| subscription.created_at)
            .cloned())
    }

    async fn create_subscription(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<SubscriptionModel> {
        let mut subscriptions = Self::lock(&self.subscriptions)?;

        let already_subscribed = subscriptions.iter().any(|subscription| {
            subscription.user_id == new_subscription.user_id
                && subscription.status != SubscriptionStatus::Canceled
        });
        if already_subscribed {
            return Err(anyhow::Error::new(DuplicateSubscription));
        }

        let subscription = SubscriptionModel {
            id: Uuid::new_v4(),
            user_id: new_subscription.user_id,
            external_customer_ref: new_subscription.external_customer_ref,
            external_subscription_ref: new_subscription.external_subscription_ref,
            plan_id: new_subscription.plan_id,
            status: new_subscription.status,
            current_period_start: new_subscription.current_period_start,
            current_period_end: new_subscription.current_period_end,
            trial_end: new_subscription.trial_end,
            cancel_at_period_end: false,
            created_at: Utc::now(),
        };
        subscriptions.push(subscription.clone());

        Ok(subscription)
    }

    async fn update_subscription(
        &self,
        subscription_id: Uuid,
        changes: SubscriptionChangeset,
    ) -> Result<SubscriptionModel> {
        let mut subscriptions = Self::lock(&self.subscriptions)?;

        let subscription = subscriptions
            .iter_mut()
            .find(|subscription| subscription.id == subscription_id)
            .ok_or_else(|| anyhow!("subscription not found: {}", subscription_id))?;

        if let Some(plan_id) = changes.plan_id {
            subscription.plan_id = plan_id;
        }
        if let Some(status) = changes.status {
            subscription.status = status;
        }
        if let Some(current_period_start) = changes.current_period_start {
            subscription.current_period_start = current_period_start;
        }
        if let Some(current_period_end) = changes.current_period_end {
            subscription.current_period_end = current_period_end;
        }
        if let Some(trial_end) = changes.trial_end {
            subscription.trial_end = trial_end;
        }
        if let Some(external_subscription_ref) = changes.external_subscription_ref {
            subscription.external_subscription_ref = external_subscription_ref;
        }
        if let Some(cancel_at_period_end) = changes.cancel_at_period_end {
            subscription.cancel_at_period_end = cancel_at_period_end;
        }

        Ok(subscription.clone())
    }

    async fn record_build_usage(
        &self,
        user_id: Uuid,
        build_type: BuildType,
    ) -> Result<BuildUsageEventModel> {
        let mut build_events = Self::lock(&self.build_events)?;

        let event = BuildUsageEventModel {
            id: Uuid::new_v4(),
            user_id,
            build_type,
            occurred_at: Utc::now(),
        };
        build_events.push(event.clone());

        Ok(event)
    }

    async fn get_build_count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let build_events = Self::lock(&self.build_events)?;

        Ok(build_events
            .iter()
            .filter(|event| event.user_id == user_id && event.occurred_at >= since)
            .count() as i64)
    }

    async fn record_bonus_unlock(
        &self,
        user_id: Uuid,
        mvp_id: Option<Uuid>,
        unlocked_feature: String,
    ) -> Result<BonusUnlockEventModel> {
        let mut bonus_events = Self::lock(&self.bonus_events)?;

        let event = BonusUnlockEventModel {
            id: Uuid::new_v4(),
            user_id,
            mvp_id,
            unlocked_feature,
            occurred_at: Utc::now(),
        };
        bonus_events.push(event.clone());

        Ok(event)
    }

    async fn get_bonus_unlocks_count_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let bonus_events = Self::lock(&self.bonus_events)?;

        Ok(bonus_events
            .iter()
            .filter(|event| event.user_id == user_id && event.occurred_at >= since)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_subscription(user_id: Uuid) -> NewSubscription {
        let now = Utc::now();
        NewSubscription {
            user_id,
            external_customer_ref: None,
            external_subscription_ref: None,
            plan_id: "basic".to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + Duration::days(30),
            trial_end: None,
        }
    }

    #[tokio::test]
    async fn counts_only_events_inside_window() {
        let store = InMemoryUsageStore::new();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();

        store
            .record_build_usage(user_id, BuildType::Mvp)
            .await
            .unwrap();
        store
            .record_build_usage(other_user, BuildType::Mvp)
            .await
            .unwrap();

        let since_past = Utc::now() - Duration::hours(1);
        assert_eq!(
            store.get_build_count_since(user_id, since_past).await.unwrap(),
            1
        );

        let since_future = Utc::now() + Duration::hours(1);
        assert_eq!(
            store
                .get_build_count_since(user_id, since_future)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn second_subscription_for_user_is_rejected() {
        let store = InMemoryUsageStore::new();
        let user_id = Uuid::new_v4();

        store
            .create_subscription(new_subscription(user_id))
            .await
            .unwrap();
        let err = store
            .create_subscription(new_subscription(user_id))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<DuplicateSubscription>().is_some());
    }

    #[tokio::test]
    async fn canceled_subscription_frees_the_slot() {
        let store = InMemoryUsageStore::new();
        let user_id = Uuid::new_v4();

        let first = store
            .create_subscription(new_subscription(user_id))
            .await
            .unwrap();
        store
            .update_subscription(
                first.id,
                SubscriptionChangeset {
                    status: Some(SubscriptionStatus::Canceled),
                    ..SubscriptionChangeset::default()
                },
            )
            .await
            .unwrap();

        assert!(
            store
                .create_subscription(new_subscription(user_id))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn changeset_clears_nullable_fields() {
        let store = InMemoryUsageStore::new();
        let user_id = Uuid::new_v4();

        let mut seed = new_subscription(user_id);
        seed.trial_end = Some(Utc::now() + Duration::days(7));
        seed.external_subscription_ref = Some("sub_9".to_string());
        let created = store.create_subscription(seed).await.unwrap();

        let updated = store
            .update_subscription(
                created.id,
                SubscriptionChangeset {
                    trial_end: Some(None),
                    external_subscription_ref: Some(None),
                    ..SubscriptionChangeset::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.trial_end, None);
        assert_eq!(updated.external_subscription_ref, None);
    }
}
