//! SeaORM entity models
//!
//! Read-only views of the review corpus

mod review;
mod review_attribute;

pub use review::{
    Entity as ReviewEntity,
    Model as Review,
    ActiveModel as ReviewActiveModel,
    Column as ReviewColumn,
};

pub use review_attribute::{
    Entity as ReviewAttributeEntity,
    Model as ReviewAttribute,
    ActiveModel as ReviewAttributeActiveModel,
    Column as ReviewAttributeColumn,
};
