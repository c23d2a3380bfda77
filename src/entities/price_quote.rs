//! Price quote entity - Menu pricing per date and slot.
//!
//! Owned by the menu collaborator; the core only reads it to price a booking.
//! No function in this crate mutates these rows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::meal_token::MealSlot;

/// Price quote database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "price_quotes")]
pub struct Model {
    /// Unique identifier for the quote
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Calendar day the quote applies to
    pub date: Date,
    /// Meal slot the quote applies to
    pub slot: MealSlot,
    /// Price in minor currency units
    pub price: i64,
}

/// Price quotes have no outgoing relations
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
