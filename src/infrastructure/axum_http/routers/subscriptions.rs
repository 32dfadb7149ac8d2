use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    domain::{
        repositories::usage_store::UsageStore,
        value_objects::{
            plans::{PlanCatalog, TRIAL_PLAN_ID},
            subscriptions::{
                BillingStatusRequest, CreateSubscriptionRequest, PlanDto, QuotaPolicy,
                TrialUpgradeDueResponse, UpgradeSubscriptionRequest,
            },
        },
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad, repositories::usage_store::PostgresUsageStore,
    },
    usecases::subscription_manager::{MeteringError, SubscriptionManager},
};

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    catalog: Arc<PlanCatalog>,
    quota_policy: QuotaPolicy,
) -> Router {
    let usage_store = PostgresUsageStore::new(Arc::clone(&db_pool));
    let subscription_manager = SubscriptionManager::new(Arc::new(usage_store), catalog, quota_policy);

    Router::new()
        .route("/", post(create_subscription))
        .route("/upgrade", post(upgrade_subscription))
        .route("/billing-status", post(apply_billing_status))
        .route("/plans", get(list_plans))
        .route("/:user_id/trial-upgrade-due", get(trial_upgrade_due))
        .with_state(Arc::new(subscription_manager))
}

pub async fn create_subscription<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let subscription = match payload.plan_id.as_deref() {
        None | Some(TRIAL_PLAN_ID) => {
            manager
                .create_trial_subscription(payload.user_id, payload.external_customer_ref)
                .await?
        }
        Some(plan_id) => {
            manager
                .create_paid_subscription(
                    payload.user_id,
                    plan_id,
                    payload.external_customer_ref,
                    payload.external_subscription_ref,
                )
                .await?
        }
    };

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn upgrade_subscription<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Json(payload): Json<UpgradeSubscriptionRequest>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let subscription = manager
        .upgrade_subscription(
            payload.user_id,
            &payload.plan_id,
            payload.external_subscription_ref,
        )
        .await?;

    Ok(Json(subscription))
}

pub async fn apply_billing_status<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Json(payload): Json<BillingStatusRequest>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let subscription = manager
        .apply_billing_status(payload.user_id, payload.status)
        .await?;

    Ok(Json(subscription))
}

pub async fn list_plans<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
) -> impl IntoResponse
where
    T: UsageStore + Send + Sync + 'static,
{
    let plans: Vec<PlanDto> = manager.list_plans().iter().map(PlanDto::from).collect();
    Json(plans)
}

pub async fn trial_upgrade_due<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let due = manager.should_upgrade_from_trial(user_id).await?;
    Ok(Json(TrialUpgradeDueResponse { due }))
}
