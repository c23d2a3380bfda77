//! Meal token entity - One reservation for one member, one date, one slot.
//!
//! Tokens are never deleted; `status` carries the history instead. A composite
//! UNIQUE index on `(member_id, date, slot)` (created in `config::database`)
//! guarantees at most one row per key regardless of status, so concurrent
//! bookings for the same slot cannot both insert.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The three daily meal periods.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum MealSlot {
    /// Morning meal, served until mid-morning
    #[sea_orm(string_value = "breakfast")]
    Breakfast,
    /// Midday meal
    #[sea_orm(string_value = "lunch")]
    Lunch,
    /// Evening meal
    #[sea_orm(string_value = "dinner")]
    Dinner,
}

impl std::fmt::Display for MealSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Breakfast => write!(f, "breakfast"),
            Self::Lunch => write!(f, "lunch"),
            Self::Dinner => write!(f, "dinner"),
        }
    }
}

/// Lifecycle state of a meal token.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TokenStatus {
    /// Paid for and redeemable at the counter
    #[sea_orm(string_value = "booked")]
    Booked,
    /// Cancelled before the deadline; cost refunded
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    /// Consumed at the point of service; terminal
    #[sea_orm(string_value = "redeemed")]
    Redeemed,
    /// Left unredeemed past the end of its slot; terminal
    #[sea_orm(string_value = "expired")]
    Expired,
}

/// Meal token database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meal_tokens")]
pub struct Model {
    /// Unique identifier for the token
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Member who owns this reservation
    pub member_id: i64,
    /// Calendar day the meal is served (slot-independent)
    pub date: Date,
    /// Which of the three daily meals this token reserves
    pub slot: MealSlot,
    /// Current lifecycle state
    pub status: TokenStatus,
    /// Price paid, in minor currency units; refunded on cancellation
    pub cost: i64,
    /// True when a cancelled token was re-activated through the booking path
    pub is_emergency_rebook: bool,
    /// When the token was first created
    pub created_at: DateTimeUtc,
    /// When the token last changed state
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between MealToken and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each token belongs to one member
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
