//! Raw review entity
//!
//! The `embedding` vector column is not mapped here. SeaORM cannot carry
//! pgvector values, so nearest-neighbour queries go through sqlx.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    /// Insertion order; breaks nearest-neighbour distance ties
    #[serde(default)]
    pub seq: i64,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub brand: String,

    #[sea_orm(column_type = "Text")]
    pub product: String,

    /// Star rating, 1-5
    pub rating: i32,

    pub review_date: Date,

    #[sea_orm(column_type = "Text")]
    pub channel: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review_attribute::Entity")]
    Attributes,
}

impl Related<super::review_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Attributes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
