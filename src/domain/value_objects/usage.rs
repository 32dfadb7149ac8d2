use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::domain::value_objects::enums::{
    build_types::BuildType, subscription_statuses::SubscriptionStatus,
};

/// Sentinel for "no cap" in decision and snapshot payloads.
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoSubscription,
    InvalidPlan,
    SubscriptionInactive,
    LimitExceeded,
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            DenyReason::NoSubscription => "no_subscription",
            DenyReason::InvalidPlan => "invalid_plan",
            DenyReason::SubscriptionInactive => "subscription_inactive",
            DenyReason::LimitExceeded => "limit_exceeded",
        };
        write!(f, "{}", reason)
    }
}

/// Allow/deny verdict for one billable action. `remaining == -1` means the
/// plan is uncapped and no counting was performed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i64>,
}

impl UsageDecision {
    pub fn allow_unlimited() -> Self {
        Self {
            allowed: true,
            reason: None,
            used: None,
            limit: None,
            remaining: Some(UNLIMITED),
        }
    }

    pub fn allow_within(used: i64, limit: i64) -> Self {
        Self {
            allowed: true,
            reason: None,
            used: Some(used),
            limit: Some(limit),
            remaining: Some(limit - used),
        }
    }

    pub fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            used: None,
            limit: None,
            remaining: None,
        }
    }

    pub fn deny_exceeded(used: i64, limit: i64) -> Self {
        Self {
            allowed: false,
            reason: Some(DenyReason::LimitExceeded),
            used: Some(used),
            limit: Some(limit),
            remaining: Some(0),
        }
    }
}

/// Point-in-time usage aggregate for the current billing period. Derived,
/// never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSnapshot {
    pub plan_id: String,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub is_unlimited: bool,
    pub builds_used: i64,
    pub builds_limit: i64,
    pub builds_remaining: i64,
    pub bonus_unlocks_used: i64,
    pub bonus_unlocks_limit: i64,
    pub bonus_unlocks_remaining: i64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Append-only record of one billable build.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BuildUsageEventModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub build_type: BuildType,
    pub occurred_at: DateTime<Utc>,
}

/// Append-only record of one redeemed gamified reward.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BonusUnlockEventModel {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mvp_id: Option<Uuid>,
    pub unlocked_feature: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordBuildRequest {
    pub user_id: Uuid,
    pub build_type: BuildType,
}

#[derive(Debug, Deserialize)]
pub struct RecordBonusUnlockRequest {
    pub user_id: Uuid,
    pub mvp_id: Option<Uuid>,
    pub feature: String,
}
