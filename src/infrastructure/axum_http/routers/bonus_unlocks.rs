use std::sync::Arc;

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};

use crate::{
    domain::{
        repositories::usage_store::UsageStore,
        value_objects::{
            plans::PlanCatalog, subscriptions::QuotaPolicy, usage::RecordBonusUnlockRequest,
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
        .route("/", post(record_bonus_unlock))
        .with_state(Arc::new(subscription_manager))
}

pub async fn record_bonus_unlock<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Json(payload): Json<RecordBonusUnlockRequest>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let decision = manager
        .record_bonus_unlock(payload.user_id, payload.mvp_id, payload.feature)
        .await?;

    Ok(Json(decision))
}
