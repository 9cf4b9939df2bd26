use super::status::ActivityStatus;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon: Option<String>,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::category_subcategory::Entity")]
    CategorySubcategories,
}

impl Related<super::category_subcategory::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CategorySubcategories.def()
    }
}

impl Related<super::subcategory::Entity> for Entity {
    fn to() -> RelationDef {
        super::category_subcategory::Relation::Subcategory.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::category_subcategory::Relation::Category.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
