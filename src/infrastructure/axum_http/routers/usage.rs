use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    domain::{
        repositories::usage_store::UsageStore,
        value_objects::{plans::PlanCatalog, subscriptions::QuotaPolicy},
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
        .route("/:user_id", get(get_usage_stats))
        .with_state(Arc::new(subscription_manager))
}

pub async fn get_usage_stats<T>(
    State(manager): State<Arc<SubscriptionManager<T>>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, MeteringError>
where
    T: UsageStore + Send + Sync + 'static,
{
    let snapshot = manager
        .get_usage_stats(user_id)
        .await?
        .ok_or(MeteringError::NoSubscription)?;

    Ok(Json(snapshot))
}
