use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity, UpdateSubscriptionEntity},
            usage_events::{
                BonusUnlockEventEntity, BuildUsageEventEntity, InsertBonusUnlockEventEntity,
                InsertBuildUsageEventEntity,
            },
        },
        repositories::usage_store::{DuplicateSubscription, UsageStore},
        value_objects::{
            enums::{build_types::BuildType, subscription_statuses::SubscriptionStatus},
            subscriptions::{NewSubscription, SubscriptionChangeset, SubscriptionModel},
            usage::{BonusUnlockEventModel, BuildUsageEventModel},
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{bonus_unlock_events, build_usage_events, subscriptions},
    },
};

pub struct PostgresUsageStore {
    db_pool: Arc<PgPoolSquad>,
}

impl PostgresUsageStore {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    async fn get_subscription_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SubscriptionModel>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .order(subscriptions::created_at.desc())
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        entity.map(SubscriptionModel::try_from).transpose()
    }

    async fn create_subscription(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<SubscriptionModel> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // One non-canceled subscription per user; a partial unique index on
        // (user_id) WHERE status != 'canceled' backs this at the database.
        let existing = subscriptions::table
            .filter(subscriptions::user_id.eq(new_subscription.user_id))
            .filter(subscriptions::status.ne(SubscriptionStatus::Canceled.to_string()))
            .select(subscriptions::id)
            .first::<Uuid>(&mut conn)
            .optional()?;

        if existing.is_some() {
            return Err(anyhow::Error::new(DuplicateSubscription));
        }

        let entity = insert_into(subscriptions::table)
            .values(InsertSubscriptionEntity::from(new_subscription))
            .get_result::<SubscriptionEntity>(&mut conn)
            .map_err(|err| match err {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => anyhow::Error::new(DuplicateSubscription),
                other => anyhow::Error::new(other),
            })?;

        SubscriptionModel::try_from(entity)
    }

    async fn update_subscription(
        &self,
        subscription_id: Uuid,
        changes: SubscriptionChangeset,
    ) -> Result<SubscriptionModel> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = update(subscriptions::table)
            .filter(subscriptions::id.eq(subscription_id))
            .set(UpdateSubscriptionEntity::from(changes))
            .get_result::<SubscriptionEntity>(&mut conn)?;

        SubscriptionModel::try_from(entity)
    }

    async fn record_build_usage(
        &self,
        user_id: Uuid,
        build_type: BuildType,
    ) -> Result<BuildUsageEventModel> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = insert_into(build_usage_events::table)
            .values(InsertBuildUsageEventEntity {
                user_id,
                build_type: build_type.to_string(),
                occurred_at: Utc::now(),
            })
            .get_result::<BuildUsageEventEntity>(&mut conn)?;

        BuildUsageEventModel::try_from(entity)
    }

    async fn get_build_count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = build_usage_events::table
            .filter(build_usage_events::user_id.eq(user_id))
            .filter(build_usage_events::occurred_at.ge(since))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(count)
    }

    async fn record_bonus_unlock(
        &self,
        user_id: Uuid,
        mvp_id: Option<Uuid>,
        unlocked_feature: String,
    ) -> Result<BonusUnlockEventModel> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let entity = insert_into(bonus_unlock_events::table)
            .values(InsertBonusUnlockEventEntity {
                user_id,
                mvp_id,
                unlocked_feature,
                occurred_at: Utc::now(),
            })
            .get_result::<BonusUnlockEventEntity>(&mut conn)?;

        Ok(BonusUnlockEventModel::from(entity))
    }

    async fn get_bonus_unlocks_count_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let count = bonus_unlock_events::table
            .filter(bonus_unlock_events::user_id.eq(user_id))
            .filter(bonus_unlock_events::occurred_at.ge(since))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(count)
    }
}
