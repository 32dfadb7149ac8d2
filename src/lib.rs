pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod usecases;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    domain::value_objects::plans::PlanCatalog,
    infrastructure::{axum_http::http_serve, postgres::postgres_connection},
};

pub async fn run() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let dotenvy_env = config::config_loader::load()?;
    info!("ENV has been loaded");

    let catalog = PlanCatalog::load_from_file(&dotenvy_env.plan_catalog.path)?;
    info!(plan_count = catalog.len(), "Plan catalog has been loaded");

    let postgres_pool = postgres_connection::establish_connection(&dotenvy_env.database.url)?;
    info!("Postgres connection has been established");

    http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        Arc::new(catalog),
    )
    .await?;

    Ok(())
}
