//! Transaction entity - The append-only wallet ledger.
//!
//! One row per balance mutation, created by `core::wallet` inside the same
//! database transaction as the balance change. Rows are never updated or
//! deleted; for every member the sum of `delta` equals the current balance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a ledger entry.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum TxnKind {
    /// Money left the wallet (`delta` is negative)
    #[sea_orm(string_value = "debit")]
    Debit,
    /// Money entered the wallet (`delta` is positive)
    #[sea_orm(string_value = "credit")]
    Credit,
}

/// Ledger transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Member whose balance this entry affected
    pub member_id: i64,
    /// Signed amount in minor currency units (negative for debits)
    pub delta: i64,
    /// Whether this entry is a debit or a credit
    pub kind: TxnKind,
    /// Human-readable description of what the entry paid for or refunded
    pub description: String,
    /// Meal token this entry references, when the mutation concerned one
    pub token_id: Option<i64>,
    /// When the entry was appended
    pub timestamp: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one member
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
