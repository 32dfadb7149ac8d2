use anyhow::anyhow;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::build_types::BuildType,
    usage::{BonusUnlockEventModel, BuildUsageEventModel},
};
use crate::infrastructure::postgres::schema::{bonus_unlock_events, build_usage_events};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = build_usage_events)]
pub struct BuildUsageEventEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub build_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = build_usage_events)]
pub struct InsertBuildUsageEventEntity {
    pub user_id: Uuid,
    pub build_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = bonus_unlock_events)]
pub struct BonusUnlockEventEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mvp_id: Option<Uuid>,
    pub unlocked_feature: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bonus_unlock_events)]
pub struct InsertBonusUnlockEventEntity {
    pub user_id: Uuid,
    pub mvp_id: Option<Uuid>,
    pub unlocked_feature: String,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<BuildUsageEventEntity> for BuildUsageEventModel {
    type Error = anyhow::Error;

    fn try_from(entity: BuildUsageEventEntity) -> Result<Self, Self::Error> {
        let build_type = BuildType::from_str(&entity.build_type)
            .ok_or_else(|| anyhow!("unknown build type in store: {}", entity.build_type))?;

        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            build_type,
            occurred_at: entity.occurred_at,
        })
    }
}

impl From<BonusUnlockEventEntity> for BonusUnlockEventModel {
    fn from(entity: BonusUnlockEventEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            mvp_id: entity.mvp_id,
            unlocked_feature: entity.unlocked_feature,
            occurred_at: entity.occurred_at,
        }
    }
}
