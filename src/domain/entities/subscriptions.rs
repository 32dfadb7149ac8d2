use anyhow::anyhow;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus,
    subscriptions::{NewSubscription, SubscriptionChangeset, SubscriptionModel},
};
use crate::infrastructure::postgres::schema::subscriptions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan_id: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: Uuid,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan_id: String,
    pub status: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = subscriptions)]
pub struct UpdateSubscriptionEntity {
    pub plan_id: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<Option<DateTime<Utc>>>,
    pub external_subscription_ref: Option<Option<String>>,
    pub cancel_at_period_end: Option<bool>,
}

impl TryFrom<SubscriptionEntity> for SubscriptionModel {
    type Error = anyhow::Error;

    fn try_from(entity: SubscriptionEntity) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::from_str(&entity.status)
            .ok_or_else(|| anyhow!("unknown subscription status in store: {}", entity.status))?;

        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            external_customer_ref: entity.external_customer_ref,
            external_subscription_ref: entity.external_subscription_ref,
            plan_id: entity.plan_id,
            status,
            current_period_start: entity.current_period_start,
            current_period_end: entity.current_period_end,
            trial_end: entity.trial_end,
            cancel_at_period_end: entity.cancel_at_period_end,
            created_at: entity.created_at,
        })
    }
}

impl From<NewSubscription> for InsertSubscriptionEntity {
    fn from(new_subscription: NewSubscription) -> Self {
        Self {
            user_id: new_subscription.user_id,
            external_customer_ref: new_subscription.external_customer_ref,
            external_subscription_ref: new_subscription.external_subscription_ref,
            plan_id: new_subscription.plan_id,
            status: new_subscription.status.to_string(),
            current_period_start: new_subscription.current_period_start,
            current_period_end: new_subscription.current_period_end,
            trial_end: new_subscription.trial_end,
            cancel_at_period_end: false,
        }
    }
}

impl From<SubscriptionChangeset> for UpdateSubscriptionEntity {
    fn from(changes: SubscriptionChangeset) -> Self {
        Self {
            plan_id: changes.plan_id,
            status: changes.status.map(|status| status.to_string()),
            current_period_start: changes.current_period_start,
            current_period_end: changes.current_period_end,
            trial_end: changes.trial_end,
            external_subscription_ref: changes.external_subscription_ref,
            cancel_at_period_end: changes.cancel_at_period_end,
        }
    }
}
