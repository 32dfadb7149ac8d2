use std::collections::HashMap;

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

/// Plan id every trial subscription is created under.
pub const TRIAL_PLAN_ID: &str = "trial";

pub const TRIAL_PERIOD_DAYS: i64 = 7;
pub const PAID_PERIOD_DAYS: i64 = 30;

/// Monthly build allowance of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildQuota {
    Limited(i64),
    Unlimited,
}

impl BuildQuota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, BuildQuota::Unlimited)
    }

    pub fn limit(&self) -> Option<i64> {
        match self {
            BuildQuota::Limited(limit) => Some(*limit),
            BuildQuota::Unlimited => None,
        }
    }
}

/// Immutable quota/pricing definition for one plan. Prices are minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDefinition {
    pub plan_id: String,
    pub display_name: String,
    pub monthly_price_minor: i64,
    pub builds_per_month: BuildQuota,
    pub bonus_prize_unlocks_per_month: i64,
    pub auto_upgrade_price_minor: Option<i64>,
}

/// Static plan configuration, loaded once at startup and injected into the
/// subscription manager. Lookups for a plan id absent from the catalog are a
/// configuration bug, not a user error.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<String, PlanDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawPlanFeatures {
    #[serde(default)]
    builds_per_month: Option<i64>,
    #[serde(default)]
    unlimited_builds: bool,
    bonus_prize_unlocks: i64,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    name: String,
    #[serde(default)]
    price: Option<i64>,
    #[serde(default)]
    auto_upgrade_price: Option<i64>,
    features: RawPlanFeatures,
}

impl PlanCatalog {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan catalog at {}", path))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let raw_plans: HashMap<String, RawPlan> =
            serde_json::from_str(raw).context("plan catalog is not valid JSON")?;

        let mut plans = HashMap::with_capacity(raw_plans.len());
        for (plan_id, raw_plan) in raw_plans {
            let plan = Self::validate_plan(&plan_id, raw_plan)?;
            plans.insert(plan_id, plan);
        }

        ensure!(
            plans.contains_key(TRIAL_PLAN_ID),
            "plan catalog must define the \"{}\" plan",
            TRIAL_PLAN_ID
        );

        Ok(Self { plans })
    }

    fn validate_plan(plan_id: &str, raw: RawPlan) -> Result<PlanDefinition> {
        let builds_per_month = match (raw.features.builds_per_month, raw.features.unlimited_builds)
        {
            (Some(_), true) => {
                bail!("plan {plan_id}: builds_per_month and unlimited_builds are exclusive")
            }
            (None, false) => {
                bail!("plan {plan_id}: one of builds_per_month or unlimited_builds is required")
            }
            (Some(limit), false) => {
                ensure!(limit >= 0, "plan {plan_id}: builds_per_month must be >= 0");
                BuildQuota::Limited(limit)
            }
            (None, true) => BuildQuota::Unlimited,
        };

        ensure!(
            raw.features.bonus_prize_unlocks >= 0,
            "plan {plan_id}: bonus_prize_unlocks must be >= 0"
        );
        ensure!(
            raw.price.is_some() || raw.auto_upgrade_price.is_some(),
            "plan {plan_id}: one of price or auto_upgrade_price is required"
        );

        Ok(PlanDefinition {
            plan_id: plan_id.to_string(),
            display_name: raw.name,
            monthly_price_minor: raw.price.unwrap_or(0),
            builds_per_month,
            bonus_prize_unlocks_per_month: raw.features.bonus_prize_unlocks,
            auto_upgrade_price_minor: raw.auto_upgrade_price,
        })
    }

    pub fn get(&self, plan_id: &str) -> Option<&PlanDefinition> {
        self.plans.get(plan_id)
    }

    pub fn contains(&self, plan_id: &str) -> bool {
        self.plans.contains_key(plan_id)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// All plans, cheapest first; trial sorts ahead of paid plans of equal price.
    pub fn plans(&self) -> Vec<&PlanDefinition> {
        let mut plans: Vec<&PlanDefinition> = self.plans.values().collect();
        plans.sort_by_key(|plan| (plan.monthly_price_minor, plan.plan_id.clone()));
        plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
        "enterprise": {
            "name": "Enterprise",
            "price": 19900,
            "features": { "unlimited_builds": true, "bonus_prize_unlocks": 100 }
        }
    }"#;

    #[test]
    fn parses_limited_and_unlimited_plans() {
        let catalog = PlanCatalog::from_json_str(CATALOG).unwrap();

        let basic = catalog.get("basic").unwrap();
        assert_eq!(basic.display_name, "Basic");
        assert_eq!(basic.builds_per_month, BuildQuota::Limited(4));
        assert_eq!(basic.monthly_price_minor, 2900);
        assert_eq!(basic.auto_upgrade_price_minor, None);

        let enterprise = catalog.get("enterprise").unwrap();
        assert!(enterprise.builds_per_month.is_unlimited());
        assert_eq!(enterprise.builds_per_month.limit(), None);

        let trial = catalog.get(TRIAL_PLAN_ID).unwrap();
        assert_eq!(trial.monthly_price_minor, 0);
        assert_eq!(trial.auto_upgrade_price_minor, Some(2900));
    }

    #[test]
    fn unknown_plan_lookup_returns_none() {
        let catalog = PlanCatalog::from_json_str(CATALOG).unwrap();
        assert!(catalog.get("platinum").is_none());
        assert!(!catalog.contains("platinum"));
    }

    #[test]
    fn rejects_plan_with_both_quota_forms() {
        let raw = r#"{
            "trial": {
                "name": "Trial",
                "auto_upgrade_price": 2900,
                "features": {
                    "builds_per_month": 5,
                    "unlimited_builds": true,
                    "bonus_prize_unlocks": 2
                }
            }
        }"#;
        assert!(PlanCatalog::from_json_str(raw).is_err());
    }

    #[test]
    fn rejects_plan_without_quota() {
        let raw = r#"{
            "trial": {
                "name": "Trial",
                "auto_upgrade_price": 2900,
                "features": { "bonus_prize_unlocks": 2 }
            }
        }"#;
        assert!(PlanCatalog::from_json_str(raw).is_err());
    }

    #[test]
    fn rejects_catalog_without_trial_plan() {
        let raw = r#"{
            "basic": {
                "name": "Basic",
                "price": 2900,
                "features": { "builds_per_month": 4, "bonus_prize_unlocks": 5 }
            }
        }"#;
        assert!(PlanCatalog::from_json_str(raw).is_err());
    }

    #[test]
    fn rejects_plan_without_price() {
        let raw = r#"{
            "trial": {
                "name": "Trial",
                "features": { "builds_per_month": 5, "bonus_prize_unlocks": 2 }
            }
        }"#;
        assert!(PlanCatalog::from_json_str(raw).is_err());
    }

    #[test]
    fn plans_are_sorted_by_price() {
        let catalog = PlanCatalog::from_json_str(CATALOG).unwrap();
        let ids: Vec<&str> = catalog
            .plans()
            .into_iter()
            .map(|plan| plan.plan_id.as_str())
            .collect();
        assert_eq!(ids, vec!["trial", "basic", "enterprise"]);
    }
}
