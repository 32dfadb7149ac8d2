use anyhow::{Context, Result};

use crate::domain::value_objects::subscriptions::QuotaPolicy;

use super::config_model::{Database, DotEnvyConfig, PlanCatalogSource, Server};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .context("SERVER_PORT is missing")?
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .context("SERVER_BODY_LIMIT is missing")?
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .context("SERVER_TIMEOUT is missing")?
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is missing")?,
    };

    let plan_catalog = PlanCatalogSource {
        path: std::env::var("PLAN_CATALOG_PATH").unwrap_or_else(|_| "plans.json".to_string()),
    };

    let quota_policy = QuotaPolicy {
        count_trialing: env_flag("QUOTA_COUNT_TRIALING", true)?,
        count_past_due: env_flag("QUOTA_COUNT_PAST_DUE", false)?,
    };

    Ok(DotEnvyConfig {
        server,
        database,
        plan_catalog,
        quota_policy,
    })
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be true or false", name)),
        Err(_) => Ok(default),
    }
}
