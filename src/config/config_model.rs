use crate::domain::value_objects::subscriptions::QuotaPolicy;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub plan_catalog: PlanCatalogSource,
    pub quota_policy: QuotaPolicy,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PlanCatalogSource {
    pub path: String,
}
