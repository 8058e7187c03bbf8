//! Pre-analyzed review entity: one row per (review, attribute) judgement

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "review_attributes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub review_id: String,

    #[sea_orm(column_type = "Text")]
    pub brand: String,

    #[sea_orm(column_type = "Text")]
    pub product: String,

    #[sea_orm(column_type = "Text")]
    pub channel: String,

    #[sea_orm(column_type = "Text")]
    pub category: String,

    /// Canonical attribute name (texture, scent, moisturizing, ...)
    #[sea_orm(column_type = "Text")]
    pub attribute: String,

    /// positive | negative | neutral
    #[sea_orm(column_type = "Text")]
    pub sentiment: String,

    /// Attribute score on a 0-5 scale
    pub score: f64,

    /// Sentence the judgement was made from
    #[sea_orm(column_type = "Text")]
    pub excerpt: String,

    pub review_date: Date,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::review::Entity",
        from = "Column::ReviewId",
        to = "super::review::Column::Id",
        on_delete = "Cascade"
    )]
    Review,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_positive(&self) -> bool {
        self.sentiment == "positive"
    }
}
