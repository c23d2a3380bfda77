//! Member entity - One diner with a prepaid wallet.
//!
//! The `balance` column is the wallet: minor currency units, mutated only by
//! the wallet ledger (`core::wallet`) so that every change is paired with an
//! append-only transaction row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "members")]
pub struct Model {
    /// Unique identifier for the member
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name of the member
    pub name: String,
    /// Prepaid wallet balance in minor currency units; never negative
    pub balance: i64,
    /// Whether the member currently holds an active meal plan
    pub is_subscriber: bool,
    /// When the member record was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Member and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One member has many ledger transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
    /// One member has many meal tokens
    #[sea_orm(has_many = "super::meal_token::Entity")]
    MealTokens,
    /// Each member has at most one subscription record
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::meal_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MealTokens.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
