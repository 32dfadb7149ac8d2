use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{
    repositories::usage_store::{DuplicateSubscription, UsageStore},
    value_objects::{
        enums::{build_types::BuildType, subscription_statuses::SubscriptionStatus},
        plans::{PAID_PERIOD_DAYS, PlanCatalog, PlanDefinition, TRIAL_PERIOD_DAYS, TRIAL_PLAN_ID},
        subscriptions::{
            NewSubscription, QuotaPolicy, SubscriptionChangeset, SubscriptionModel,
        },
        usage::{DenyReason, UNLIMITED, UsageDecision, UsageSnapshot},
    },
};

#[derive(Debug, Error)]
pub enum MeteringError {
    #[error("no subscription for user")]
    NoSubscription,
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("user already has a subscription")]
    DuplicateSubscription,
    #[error("build limit reached")]
    BuildNotAllowed(UsageDecision),
    #[error("bonus unlock limit reached")]
    BonusNotAllowed(UsageDecision),
    #[error("invalid subscription status transition: {from} -> {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MeteringError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            MeteringError::NoSubscription => StatusCode::NOT_FOUND,
            MeteringError::BuildNotAllowed(_) | MeteringError::BonusNotAllowed(_) => {
                StatusCode::FORBIDDEN
            }
            MeteringError::DuplicateSubscription | MeteringError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            // A referenced plan missing from the catalog is a configuration
            // bug, never a user error.
            MeteringError::UnknownPlan(_) | MeteringError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type MeteringResult<T> = std::result::Result<T, MeteringError>;

/// Governs trial creation, plan upgrades, quota enforcement and usage-stat
/// aggregation over a pluggable [`UsageStore`].
///
/// Callers of billable actions must follow the gate protocol: check with
/// `can_perform_build`, perform the side effect, then `record_build` in the
/// same request. The check and the append are separate store calls; two
/// concurrent requests may both pass the check before either records, which
/// bounds over-grant to the burst size. Strict enforcement would need an
/// atomic increment-and-compare at the storage layer.
pub struct SubscriptionManager<S>
where
    S: UsageStore + Send + Sync + 'static,
{
    usage_store: Arc<S>,
    catalog: Arc<PlanCatalog>,
    quota_policy: QuotaPolicy,
}

impl<S> SubscriptionManager<S>
where
    S: UsageStore + Send + Sync + 'static,
{
    pub fn new(usage_store: Arc<S>, catalog: Arc<PlanCatalog>, quota_policy: QuotaPolicy) -> Self {
        Self {
            usage_store,
            catalog,
            quota_policy,
        }
    }

    pub fn list_plans(&self) -> Vec<PlanDefinition> {
        self.catalog.plans().into_iter().cloned().collect()
    }

    pub async fn has_active_subscription(&self, user_id: Uuid) -> MeteringResult<bool> {
        let subscription = self.load_subscription(user_id).await?;

        Ok(subscription.is_some_and(|subscription| {
            self.quota_policy.allows(subscription.status)
                && Utc::now() < subscription.current_period_end
        }))
    }

    pub async fn get_user_plan(&self, user_id: Uuid) -> MeteringResult<Option<String>> {
        let subscription = self.load_subscription(user_id).await?;

        Ok(subscription
            .filter(|subscription| {
                self.quota_policy.allows(subscription.status)
                    && Utc::now() < subscription.current_period_end
            })
            .map(|subscription| subscription.plan_id))
    }

    pub async fn can_perform_build(
        &self,
        user_id: Uuid,
        build_type: BuildType,
    ) -> MeteringResult<UsageDecision> {
        let Some(subscription) = self.load_subscription(user_id).await? else {
            debug!(%user_id, %build_type, "metering: build denied, no subscription");
            return Ok(UsageDecision::deny(DenyReason::NoSubscription));
        };

        if !self.quota_policy.allows(subscription.status) {
            debug!(
                %user_id,
                status = %subscription.status,
                "metering: build denied, subscription not quota-eligible"
            );
            return Ok(UsageDecision::deny(DenyReason::SubscriptionInactive));
        }

        let Some(plan) = self.catalog.get(&subscription.plan_id) else {
            warn!(
                %user_id,
                plan_id = %subscription.plan_id,
                "metering: subscription references a plan missing from the catalog"
            );
            return Ok(UsageDecision::deny(DenyReason::InvalidPlan));
        };

        let Some(limit) = plan.builds_per_month.limit() else {
            return Ok(UsageDecision::allow_unlimited());
        };

        let used = self
            .build_count_this_period(user_id, &subscription)
            .await?;

        if used >= limit {
            debug!(%user_id, used, limit, "metering: build denied, limit exceeded");
            return Ok(UsageDecision::deny_exceeded(used, limit));
        }

        Ok(UsageDecision::allow_within(used, limit))
    }

    /// Re-checks the quota and appends a usage event. Fails without recording
    /// when the check denies; the allowing decision is returned otherwise.
    pub async fn record_build(
        &self,
        user_id: Uuid,
        build_type: BuildType,
    ) -> MeteringResult<UsageDecision> {
        let decision = self.can_perform_build(user_id, build_type).await?;

        if !decision.allowed {
            warn!(
                %user_id,
                %build_type,
                reason = ?decision.reason,
                "metering: refusing to record denied build"
            );
            return Err(MeteringError::BuildNotAllowed(decision));
        }

        self.usage_store
            .record_build_usage(user_id, build_type)
            .await
            .map_err(|err| {
                error!(%user_id, %build_type, store_error = ?err, "metering: failed to record build usage");
                MeteringError::Internal(err)
            })?;

        Ok(decision)
    }

    pub async fn can_unlock_bonus(&self, user_id: Uuid) -> MeteringResult<UsageDecision> {
        let Some(subscription) = self.load_subscription(user_id).await? else {
            return Ok(UsageDecision::deny(DenyReason::NoSubscription));
        };

        if !self.quota_policy.allows(subscription.status) {
            return Ok(UsageDecision::deny(DenyReason::SubscriptionInactive));
        }

        let Some(plan) = self.catalog.get(&subscription.plan_id) else {
            warn!(
                %user_id,
                plan_id = %subscription.plan_id,
                "metering: subscription references a plan missing from the catalog"
            );
            return Ok(UsageDecision::deny(DenyReason::InvalidPlan));
        };

        let limit = plan.bonus_prize_unlocks_per_month;
        let used = self
            .usage_store
            .get_bonus_unlocks_count_since(user_id, subscription.current_period_start)
            .await
            .map_err(MeteringError::Internal)?;

        if used >= limit {
            debug!(%user_id, used, limit, "metering: bonus unlock denied, limit exceeded");
            return Ok(UsageDecision::deny_exceeded(used, limit));
        }

        Ok(UsageDecision::allow_within(used, limit))
    }

    pub async fn record_bonus_unlock(
        &self,
        user_id: Uuid,
        mvp_id: Option<Uuid>,
        unlocked_feature: String,
    ) -> MeteringResult<UsageDecision> {
        let decision = self.can_unlock_bonus(user_id).await?;

        if !decision.allowed {
            warn!(
                %user_id,
                reason = ?decision.reason,
                "metering: refusing to record denied bonus unlock"
            );
            return Err(MeteringError::BonusNotAllowed(decision));
        }

        self.usage_store
            .record_bonus_unlock(user_id, mvp_id, unlocked_feature)
            .await
            .map_err(|err| {
                error!(%user_id, store_error = ?err, "metering: failed to record bonus unlock");
                MeteringError::Internal(err)
            })?;

        Ok(decision)
    }

    pub async fn is_in_trial(&self, user_id: Uuid) -> MeteringResult<bool> {
        let subscription = self.load_subscription(user_id).await?;

        Ok(subscription.is_some_and(|subscription| {
            subscription.plan_id == TRIAL_PLAN_ID
                && subscription.status == SubscriptionStatus::Trialing
                && subscription
                    .trial_end
                    .is_some_and(|trial_end| Utc::now() < trial_end)
        }))
    }

    /// Polled by the external billing job to trigger the trial auto-charge.
    /// Fires on trial expiry regardless of subscription status.
    pub async fn should_upgrade_from_trial(&self, user_id: Uuid) -> MeteringResult<bool> {
        let subscription = self.load_subscription(user_id).await?;

        Ok(subscription.is_some_and(|subscription| {
            subscription.plan_id == TRIAL_PLAN_ID
                && subscription
                    .trial_end
                    .is_some_and(|trial_end| Utc::now() >= trial_end)
        }))
    }

    pub async fn get_usage_stats(&self, user_id: Uuid) -> MeteringResult<Option<UsageSnapshot>> {
        let Some(subscription) = self.load_subscription(user_id).await? else {
            return Ok(None);
        };

        let plan = self
            .catalog
            .get(&subscription.plan_id)
            .ok_or_else(|| MeteringError::UnknownPlan(subscription.plan_id.clone()))?;

        let builds_used = self
            .build_count_this_period(user_id, &subscription)
            .await?;
        let bonus_used = self
            .usage_store
            .get_bonus_unlocks_count_since(user_id, subscription.current_period_start)
            .await
            .map_err(MeteringError::Internal)?;

        let (builds_limit, builds_remaining) = match plan.builds_per_month.limit() {
            Some(limit) => (limit, (limit - builds_used).max(0)),
            None => (UNLIMITED, UNLIMITED),
        };
        let bonus_limit = plan.bonus_prize_unlocks_per_month;

        Ok(Some(UsageSnapshot {
            plan_id: plan.plan_id.clone(),
            plan_name: plan.display_name.clone(),
            status: subscription.status,
            is_unlimited: plan.builds_per_month.is_unlimited(),
            builds_used,
            builds_limit,
            builds_remaining,
            bonus_unlocks_used: bonus_used,
            bonus_unlocks_limit: bonus_limit,
            bonus_unlocks_remaining: (bonus_limit - bonus_used).max(0),
            period_start: subscription.current_period_start,
            period_end: subscription.current_period_end,
        }))
    }

    pub async fn create_trial_subscription(
        &self,
        user_id: Uuid,
        external_customer_ref: Option<String>,
    ) -> MeteringResult<SubscriptionModel> {
        if !self.catalog.contains(TRIAL_PLAN_ID) {
            return Err(MeteringError::UnknownPlan(TRIAL_PLAN_ID.to_string()));
        }

        let now = Utc::now();
        let trial_end = now + Duration::days(TRIAL_PERIOD_DAYS);

        info!(%user_id, "metering: creating trial subscription");
        let subscription = self
            .usage_store
            .create_subscription(NewSubscription {
                user_id,
                external_customer_ref,
                external_subscription_ref: None,
                plan_id: TRIAL_PLAN_ID.to_string(),
                status: SubscriptionStatus::Trialing,
                current_period_start: now,
                current_period_end: trial_end,
                trial_end: Some(trial_end),
            })
            .await
            .map_err(Self::map_create_error)?;

        Ok(subscription)
    }

    pub async fn create_paid_subscription(
        &self,
        user_id: Uuid,
        plan_id: &str,
        external_customer_ref: Option<String>,
        external_subscription_ref: Option<String>,
    ) -> MeteringResult<SubscriptionModel> {
        if !self.catalog.contains(plan_id) {
            return Err(MeteringError::UnknownPlan(plan_id.to_string()));
        }

        let now = Utc::now();

        info!(%user_id, plan_id, "metering: creating paid subscription");
        let subscription = self
            .usage_store
            .create_subscription(NewSubscription {
                user_id,
                external_customer_ref,
                external_subscription_ref,
                plan_id: plan_id.to_string(),
                status: SubscriptionStatus::Active,
                current_period_start: now,
                current_period_end: now + Duration::days(PAID_PERIOD_DAYS),
                trial_end: None,
            })
            .await
            .map_err(Self::map_create_error)?;

        Ok(subscription)
    }

    /// Moves the user onto `new_plan_id` and resets the billing period. The
    /// existing record is mutated in place; plan history is not retained.
    pub async fn upgrade_subscription(
        &self,
        user_id: Uuid,
        new_plan_id: &str,
        external_subscription_ref: Option<String>,
    ) -> MeteringResult<SubscriptionModel> {
        let subscription = self
            .load_subscription(user_id)
            .await?
            .ok_or(MeteringError::NoSubscription)?;

        if !self.catalog.contains(new_plan_id) {
            return Err(MeteringError::UnknownPlan(new_plan_id.to_string()));
        }

        let now = Utc::now();

        info!(
            %user_id,
            from_plan = %subscription.plan_id,
            to_plan = new_plan_id,
            "metering: upgrading subscription"
        );

        let updated = self
            .usage_store
            .update_subscription(
                subscription.id,
                SubscriptionChangeset {
                    plan_id: Some(new_plan_id.to_string()),
                    status: Some(SubscriptionStatus::Active),
                    current_period_start: Some(now),
                    current_period_end: Some(now + Duration::days(PAID_PERIOD_DAYS)),
                    trial_end: Some(None),
                    external_subscription_ref: Some(external_subscription_ref),
                    cancel_at_period_end: None,
                },
            )
            .await
            .map_err(|err| {
                error!(%user_id, store_error = ?err, "metering: failed to upgrade subscription");
                MeteringError::Internal(err)
            })?;

        Ok(updated)
    }

    /// Applies a status reported by the external billing platform, enforcing
    /// the subscription state machine: trialing -> active, active <-> past_due,
    /// anything -> canceled. Canceled is terminal.
    pub async fn apply_billing_status(
        &self,
        user_id: Uuid,
        new_status: SubscriptionStatus,
    ) -> MeteringResult<SubscriptionModel> {
        let subscription = self
            .load_subscription(user_id)
            .await?
            .ok_or(MeteringError::NoSubscription)?;

        let from = subscription.status;
        let transition_allowed = match (from, new_status) {
            (from, to) if from == to => true,
            (SubscriptionStatus::Trialing, SubscriptionStatus::Active) => true,
            (SubscriptionStatus::Active, SubscriptionStatus::PastDue) => true,
            (SubscriptionStatus::PastDue, SubscriptionStatus::Active) => true,
            (from, SubscriptionStatus::Canceled) if !from.is_terminal() => true,
            _ => false,
        };

        if !transition_allowed {
            warn!(
                %user_id,
                from = %from,
                to = %new_status,
                "metering: rejected billing status transition"
            );
            return Err(MeteringError::InvalidTransition {
                from,
                to: new_status,
            });
        }

        info!(%user_id, from = %from, to = %new_status, "metering: applying billing status");

        let updated = self
            .usage_store
            .update_subscription(
                subscription.id,
                SubscriptionChangeset {
                    status: Some(new_status),
                    ..SubscriptionChangeset::default()
                },
            )
            .await
            .map_err(|err| {
                error!(%user_id, store_error = ?err, "metering: failed to apply billing status");
                MeteringError::Internal(err)
            })?;

        Ok(updated)
    }

    async fn load_subscription(
        &self,
        user_id: Uuid,
    ) -> MeteringResult<Option<SubscriptionModel>> {
        self.usage_store
            .get_subscription_by_user_id(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, store_error = ?err, "metering: failed to load subscription");
                MeteringError::Internal(err)
            })
    }

    async fn build_count_this_period(
        &self,
        user_id: Uuid,
        subscription: &SubscriptionModel,
    ) -> MeteringResult<i64> {
        self.usage_store
            .get_build_count_since(user_id, subscription.current_period_start)
            .await
            .map_err(MeteringError::Internal)
    }

    fn map_create_error(err: anyhow::Error) -> MeteringError {
        if err.downcast_ref::<DuplicateSubscription>().is_some() {
            MeteringError::DuplicateSubscription
        } else {
            MeteringError::Internal(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mockall::predicate::eq;

    use crate::domain::repositories::usage_store::MockUsageStore;
    use crate::domain::value_objects::usage::BuildUsageEventModel;
    use crate::infrastructure::memory::usage_store::InMemoryUsageStore;

    const CATALOG: &str = r#"{
        "trial": {
            "name": "Trial",
            "auto_upgrade_price": 2900,
            "features": { "builds_per_month": 5, "bonus_prize_unlocks": 2 }
        },
        "basic": {
            "name": "Basic",
            "price": 2900,
            "features": { "builds_per_month": 4, "bonus_prize_unlocks": 5 }
        },
        "pro": {
            "name": "Pro",
            "price": 7900,
            "features": { "builds_per_month": 50, "bonus_prize_unlocks": 20 }
        },
        "enterprise": {
            "name": "Enterprise",
            "price": 19900,
            "features": { "unlimited_builds": true, "bonus_prize_unlocks": 100 }
        }
    }"#;

    fn catalog() -> Arc<PlanCatalog> {
        Arc::new(PlanCatalog::from_json_str(CATALOG).unwrap())
    }

    fn manager<S>(usage_store: S) -> SubscriptionManager<S>
    where
        S: UsageStore + Send + Sync + 'static,
    {
        SubscriptionManager::new(Arc::new(usage_store), catalog(), QuotaPolicy::default())
    }

    fn sample_subscription(
        user_id: Uuid,
        plan_id: &str,
        status: SubscriptionStatus,
    ) -> SubscriptionModel {
        let now = Utc::now();
        SubscriptionModel {
            id: Uuid::new_v4(),
            user_id,
            external_customer_ref: None,
            external_subscription_ref: None,
            plan_id: plan_id.to_string(),
            status,
            current_period_start: now - Duration::days(1),
            current_period_end: now + Duration::days(29),
            trial_end: None,
            cancel_at_period_end: false,
            created_at: now - Duration::days(1),
        }
    }

    fn expect_subscription(usage_store: &mut MockUsageStore, subscription: SubscriptionModel) {
        let user_id = subscription.user_id;
        usage_store
            .expect_get_subscription_by_user_id()
            .with(eq(user_id))
            .returning(move |_| {
                let subscription = subscription.clone();
                Box::pin(async move { Ok(Some(subscription)) })
            });
    }

    fn expect_build_count(usage_store: &mut MockUsageStore, count: i64) {
        usage_store
            .expect_get_build_count_since()
            .returning(move |_, _| Box::pin(async move { Ok(count) }));
    }

    #[tokio::test]
    async fn unlimited_plan_always_allows_without_counting() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "enterprise", SubscriptionStatus::Active),
        );
        // no expect_get_build_count_since: counting an uncapped plan is a bug

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(UNLIMITED));
        assert_eq!(decision.used, None);
    }

    #[tokio::test]
    async fn denies_when_limit_reached() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::Active),
        );
        expect_build_count(&mut usage_store, 4);

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::LimitExceeded));
        assert_eq!(decision.used, Some(4));
        assert_eq!(decision.limit, Some(4));
    }

    #[tokio::test]
    async fn allows_under_limit_and_reports_remaining() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::Active),
        );
        expect_build_count(&mut usage_store, 1);

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Branding)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(3));
    }

    #[tokio::test]
    async fn denies_without_subscription() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        usage_store
            .expect_get_subscription_by_user_id()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::NoSubscription));
    }

    #[tokio::test]
    async fn past_due_subscription_is_denied_under_default_policy() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::PastDue),
        );

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::SubscriptionInactive));
    }

    #[tokio::test]
    async fn past_due_subscription_consumes_quota_when_policy_allows() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::PastDue),
        );
        expect_build_count(&mut usage_store, 0);

        let manager = SubscriptionManager::new(
            Arc::new(usage_store),
            catalog(),
            QuotaPolicy {
                count_trialing: true,
                count_past_due: true,
            },
        );
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(4));
    }

    #[tokio::test]
    async fn plan_missing_from_catalog_is_denied_as_invalid_plan() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "legacy", SubscriptionStatus::Active),
        );

        let manager = manager(usage_store);
        let decision = manager
            .can_perform_build(user_id, BuildType::Mvp)
            .await
            .unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, Some(DenyReason::InvalidPlan));
    }

    #[tokio::test]
    async fn record_build_on_denied_state_never_appends() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::Active),
        );
        expect_build_count(&mut usage_store, 4);
        usage_store.expect_record_build_usage().times(0);

        let manager = manager(usage_store);
        let result = manager.record_build(user_id, BuildType::Mvp).await;

        match result {
            Err(MeteringError::BuildNotAllowed(decision)) => {
                assert_eq!(decision.reason, Some(DenyReason::LimitExceeded));
                assert_eq!(decision.used, Some(4));
            }
            other => panic!("expected BuildNotAllowed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn record_build_appends_when_allowed() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::Active),
        );
        expect_build_count(&mut usage_store, 2);
        usage_store
            .expect_record_build_usage()
            .with(eq(user_id), eq(BuildType::Marketing))
            .times(1)
            .returning(|user_id, build_type| {
                Box::pin(async move {
                    Ok(BuildUsageEventModel {
                        id: Uuid::new_v4(),
                        user_id,
                        build_type,
                        occurred_at: Utc::now(),
                    })
                })
            });

        let manager = manager(usage_store);
        let decision = manager
            .record_build(user_id, BuildType::Marketing)
            .await
            .unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(2));
    }

    #[tokio::test]
    async fn is_in_trial_before_trial_end() {
        let user_id = Uuid::new_v4();
        let mut subscription =
            sample_subscription(user_id, TRIAL_PLAN_ID, SubscriptionStatus::Trialing);
        subscription.trial_end = Some(Utc::now() + Duration::milliseconds(500));

        let mut usage_store = MockUsageStore::new();
        expect_subscription(&mut usage_store, subscription);

        let manager = manager(usage_store);
        assert!(manager.is_in_trial(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn is_in_trial_false_once_trial_end_passed() {
        let user_id = Uuid::new_v4();
        let mut subscription =
            sample_subscription(user_id, TRIAL_PLAN_ID, SubscriptionStatus::Trialing);
        subscription.trial_end = Some(Utc::now() - Duration::milliseconds(1));

        let mut usage_store = MockUsageStore::new();
        expect_subscription(&mut usage_store, subscription);

        let manager = manager(usage_store);
        assert!(!manager.is_in_trial(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn should_upgrade_from_trial_ignores_status() {
        let user_id = Uuid::new_v4();
        let mut subscription =
            sample_subscription(user_id, TRIAL_PLAN_ID, SubscriptionStatus::PastDue);
        subscription.trial_end = Some(Utc::now() - Duration::seconds(1));

        let mut usage_store = MockUsageStore::new();
        expect_subscription(&mut usage_store, subscription);

        let manager = manager(usage_store);
        assert!(manager.should_upgrade_from_trial(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn should_upgrade_from_trial_false_while_trial_running() {
        let user_id = Uuid::new_v4();
        let mut subscription =
            sample_subscription(user_id, TRIAL_PLAN_ID, SubscriptionStatus::Trialing);
        subscription.trial_end = Some(Utc::now() + Duration::days(3));

        let mut usage_store = MockUsageStore::new();
        expect_subscription(&mut usage_store, subscription);

        let manager = manager(usage_store);
        assert!(!manager.should_upgrade_from_trial(user_id).await.unwrap());
    }

    #[tokio::test]
    async fn usage_stats_is_none_without_subscription() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        usage_store
            .expect_get_subscription_by_user_id()
            .with(eq(user_id))
            .returning(|_| Box::pin(async { Ok(None) }));

        let manager = manager(usage_store);
        assert!(manager.get_usage_stats(user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn usage_stats_reports_unlimited_sentinel() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "enterprise", SubscriptionStatus::Active),
        );
        expect_build_count(&mut usage_store, 17);
        usage_store
            .expect_get_bonus_unlocks_count_since()
            .returning(|_, _| Box::pin(async { Ok(3) }));

        let manager = manager(usage_store);
        let stats = manager.get_usage_stats(user_id).await.unwrap().unwrap();

        assert!(stats.is_unlimited);
        assert_eq!(stats.builds_used, 17);
        assert_eq!(stats.builds_limit, UNLIMITED);
        assert_eq!(stats.builds_remaining, UNLIMITED);
        assert_eq!(stats.bonus_unlocks_remaining, 97);
    }

    #[tokio::test]
    async fn usage_stats_floor_clamps_remaining() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "basic", SubscriptionStatus::Active),
        );
        // over-quota is reachable through the documented check/record race
        expect_build_count(&mut usage_store, 6);
        usage_store
            .expect_get_bonus_unlocks_count_since()
            .returning(|_, _| Box::pin(async { Ok(0) }));

        let manager = manager(usage_store);
        let stats = manager.get_usage_stats(user_id).await.unwrap().unwrap();

        assert_eq!(stats.builds_used, 6);
        assert_eq!(stats.builds_remaining, 0);
    }

    #[tokio::test]
    async fn trial_then_stats_reports_trial_quota() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        let subscription = manager
            .create_trial_subscription(user_id, None)
            .await
            .unwrap();
        assert_eq!(subscription.plan_id, TRIAL_PLAN_ID);
        assert_eq!(subscription.status, SubscriptionStatus::Trialing);
        assert!(subscription.trial_end.is_some());

        let stats = manager.get_usage_stats(user_id).await.unwrap().unwrap();
        assert_eq!(stats.plan_id, TRIAL_PLAN_ID);
        assert_eq!(stats.status, SubscriptionStatus::Trialing);
        assert_eq!(stats.builds_limit, 5);
        assert_eq!(stats.builds_used, 0);
    }

    #[tokio::test]
    async fn upgrade_from_trial_activates_and_clears_trial_end() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_trial_subscription(user_id, None)
            .await
            .unwrap();
        let upgraded = manager
            .upgrade_subscription(user_id, "pro", Some("sub_123".to_string()))
            .await
            .unwrap();

        assert_eq!(upgraded.plan_id, "pro");
        assert_eq!(upgraded.status, SubscriptionStatus::Active);
        assert_eq!(upgraded.trial_end, None);
        assert_eq!(
            upgraded.external_subscription_ref,
            Some("sub_123".to_string())
        );

        let period = upgraded.current_period_end - upgraded.current_period_start;
        assert_eq!(period.num_days(), PAID_PERIOD_DAYS);
    }

    #[tokio::test]
    async fn upgrade_from_active_plan_also_resets() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_paid_subscription(user_id, "basic", None, Some("sub_1".to_string()))
            .await
            .unwrap();
        let upgraded = manager
            .upgrade_subscription(user_id, "pro", Some("sub_2".to_string()))
            .await
            .unwrap();

        assert_eq!(upgraded.status, SubscriptionStatus::Active);
        assert_eq!(upgraded.trial_end, None);
        assert_eq!(upgraded.plan_id, "pro");
    }

    #[tokio::test]
    async fn duplicate_trial_creation_is_rejected() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_trial_subscription(user_id, None)
            .await
            .unwrap();
        let second = manager.create_trial_subscription(user_id, None).await;

        assert!(matches!(second, Err(MeteringError::DuplicateSubscription)));
    }

    #[tokio::test]
    async fn upgrade_without_subscription_fails() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        let result = manager.upgrade_subscription(user_id, "pro", None).await;
        assert!(matches!(result, Err(MeteringError::NoSubscription)));
    }

    #[tokio::test]
    async fn upgrade_to_unknown_plan_fails() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_trial_subscription(user_id, None)
            .await
            .unwrap();
        let result = manager.upgrade_subscription(user_id, "platinum", None).await;

        assert!(matches!(result, Err(MeteringError::UnknownPlan(_))));
    }

    #[tokio::test]
    async fn sequential_exhaustion_stops_at_limit() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_paid_subscription(user_id, "basic", None, None)
            .await
            .unwrap();

        for _ in 0..3 {
            manager.record_build(user_id, BuildType::Mvp).await.unwrap();
        }

        // one build left on the basic plan
        let last_allowed = manager
            .record_build(user_id, BuildType::Branding)
            .await
            .unwrap();
        assert_eq!(last_allowed.remaining, Some(1));

        let denied = manager.record_build(user_id, BuildType::Marketing).await;
        assert!(matches!(denied, Err(MeteringError::BuildNotAllowed(_))));

        let stats = manager.get_usage_stats(user_id).await.unwrap().unwrap();
        assert_eq!(stats.builds_used, 4);
        assert_eq!(stats.builds_remaining, 0);
    }

    #[tokio::test]
    async fn bonus_unlocks_are_metered_separately() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_trial_subscription(user_id, None)
            .await
            .unwrap();

        // trial allows 2 bonus unlocks
        manager
            .record_bonus_unlock(user_id, Some(Uuid::new_v4()), "pdf_export".to_string())
            .await
            .unwrap();
        manager
            .record_bonus_unlock(user_id, None, "premium_template".to_string())
            .await
            .unwrap();

        let denied = manager
            .record_bonus_unlock(user_id, None, "analytics".to_string())
            .await;
        assert!(matches!(denied, Err(MeteringError::BonusNotAllowed(_))));

        let stats = manager.get_usage_stats(user_id).await.unwrap().unwrap();
        assert_eq!(stats.bonus_unlocks_used, 2);
        assert_eq!(stats.builds_used, 0);
    }

    #[tokio::test]
    async fn billing_status_round_trips_between_active_and_past_due() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_paid_subscription(user_id, "pro", None, None)
            .await
            .unwrap();

        let past_due = manager
            .apply_billing_status(user_id, SubscriptionStatus::PastDue)
            .await
            .unwrap();
        assert_eq!(past_due.status, SubscriptionStatus::PastDue);

        let recovered = manager
            .apply_billing_status(user_id, SubscriptionStatus::Active)
            .await
            .unwrap();
        assert_eq!(recovered.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn canceled_subscription_is_terminal() {
        let user_id = Uuid::new_v4();
        let manager = manager(InMemoryUsageStore::new());

        manager
            .create_paid_subscription(user_id, "pro", None, None)
            .await
            .unwrap();
        manager
            .apply_billing_status(user_id, SubscriptionStatus::Canceled)
            .await
            .unwrap();

        let result = manager
            .apply_billing_status(user_id, SubscriptionStatus::Active)
            .await;
        assert!(matches!(
            result,
            Err(MeteringError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn has_active_subscription_honors_period_end() {
        let user_id = Uuid::new_v4();
        let mut expired = sample_subscription(user_id, "pro", SubscriptionStatus::Active);
        expired.current_period_end = Utc::now() - Duration::seconds(1);

        let mut usage_store = MockUsageStore::new();
        expect_subscription(&mut usage_store, expired);

        let manager = manager(usage_store);
        assert!(!manager.has_active_subscription(user_id).await.unwrap());
        assert_eq!(manager.get_user_plan(user_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_user_plan_returns_active_plan() {
        let user_id = Uuid::new_v4();
        let mut usage_store = MockUsageStore::new();
        expect_subscription(
            &mut usage_store,
            sample_subscription(user_id, "pro", SubscriptionStatus::Active),
        );

        let manager = manager(usage_store);
        assert!(manager.has_active_subscription(user_id).await.unwrap());
        assert_eq!(
            manager.get_user_plan(user_id).await.unwrap(),
            Some("pro".to_string())
        );
    }
}
