//! Subscription entity - A member's monthly meal plan card.
//!
//! Created once per member on first activation and reused across recharges:
//! credits accumulate and the expiry extends. Never deleted; `is_active`
//! goes false instead.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    /// Unique identifier for the subscription
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Member this plan belongs to; one plan per member
    #[sea_orm(unique)]
    pub member_id: i64,
    /// Remaining meal credits granted by recharges
    pub meal_credits: i32,
    /// Whether the plan is currently active
    pub is_active: bool,
    /// Whether the plan keeps pre-booking meals automatically
    pub auto_booking_enabled: bool,
    /// When the current plan period ends
    pub expires_at: DateTimeUtc,
}

/// Defines relationships between Subscription and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each subscription belongs to one member
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
