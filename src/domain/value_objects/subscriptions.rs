use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::domain::value_objects::plans::PlanDefinition;
use crate::domain::value_objects::usage::UNLIMITED;

/// The single current billing record for a user. Never hard-deleted; a
/// subscription only ever transitions to canceled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
}

/// Partial update applied to an existing subscription row. Outer `None`
/// leaves the column untouched; `Some(None)` on a nullable column clears it.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChangeset {
    pub plan_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<Option<DateTime<Utc>>>,
    pub external_subscription_ref: Option<Option<String>>,
    pub cancel_at_period_end: Option<bool>,
}

/// Which subscription statuses may consume build/bonus quota. Resolves the
/// eligibility question the upstream data model leaves open: trialing users
/// consume quota by default, past-due users do not, canceled never does.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub count_trialing: bool,
    pub count_past_due: bool,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            count_trialing: true,
            count_past_due: false,
        }
    }
}

impl QuotaPolicy {
    pub fn allows(&self, status: SubscriptionStatus) -> bool {
        match status {
            SubscriptionStatus::Active => true,
            SubscriptionStatus::Trialing => self.count_trialing,
            SubscriptionStatus::PastDue => self.count_past_due,
            SubscriptionStatus::Canceled => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub user_id: Uuid,
    pub plan_id: Option<String>,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeSubscriptionRequest {
    pub user_id: Uuid,
    pub plan_id: String,
    pub external_subscription_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BillingStatusRequest {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
}

#[derive(Debug, Serialize)]
pub struct TrialUpgradeDueResponse {
    pub due: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanDto {
    pub plan_id: String,
    pub name: String,
    pub monthly_price_minor: i64,
    pub builds_per_month: i64,
    pub bonus_prize_unlocks_per_month: i64,
    pub auto_upgrade_price_minor: Option<i64>,
}

impl From<&PlanDefinition> for PlanDto {
    fn from(plan: &PlanDefinition) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            name: plan.display_name.clone(),
            monthly_price_minor: plan.monthly_price_minor,
            builds_per_month: plan.builds_per_month.limit().unwrap_or(UNLIMITED),
            bonus_prize_unlocks_per_month: plan.bonus_prize_unlocks_per_month,
            auto_upgrade_price_minor: plan.auto_upgrade_price_minor,
        }
    }
}
