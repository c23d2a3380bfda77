//! Wallet ledger - Atomic debit/credit over the prepaid balance.
//!
//! Every balance mutation appends exactly one row to the append-only
//! `transactions` ledger, inside whatever database transaction the caller is
//! running. The balance change itself is a single conditional UPDATE rather
//! than read-modify-write: a debit applies `balance = balance - amount` only
//! where `balance >= amount`, so two concurrent debits can never overdraw the
//! wallet, and no successful debit ever leaves a negative balance.

use crate::{
    entities::{Member, Transaction, TxnKind, member, transaction},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// Withdraws `amount` from the member's wallet and appends a debit row.
///
/// Fails with [`Error::PaymentRequired`] when the balance cannot cover the
/// amount; the check and the decrement are one atomic statement. The optional
/// `token_id` links the ledger row to the meal token the debit paid for.
///
/// Callers composing a debit with other mutations should pass an open
/// `DatabaseTransaction` so everything commits or rolls back together.
pub async fn debit<C>(
    conn: &C,
    member_id: i64,
    amount: i64,
    description: &str,
    token_id: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    use sea_orm::sea_query::Expr;

    // Conditional decrement: only applies while the balance covers the amount
    let update = Member::update_many()
        .col_expr(
            member::Column::Balance,
            Expr::col(member::Column::Balance).sub(amount),
        )
        .filter(member::Column::Id.eq(member_id))
        .filter(member::Column::Balance.gte(amount))
        .exec(conn)
        .await?;

    if update.rows_affected == 0 {
        // Distinguish a missing member from an underfunded one
        let member = Member::find_by_id(member_id)
            .one(conn)
            .await?
            .ok_or_else(|| Error::NotFound {
                what: format!("member {member_id}"),
            })?;
        return Err(Error::PaymentRequired {
            balance: member.balance,
            required: amount,
        });
    }

    debug!(member_id, amount, description, "debited wallet");

    append_entry(conn, member_id, -amount, TxnKind::Debit, description, token_id).await
}

/// Deposits `amount` into the member's wallet and appends a credit row.
///
/// Always succeeds for an existing member. The optional `token_id` links the
/// ledger row to the meal token the credit refunds.
pub async fn credit<C>(
    conn: &C,
    member_id: i64,
    amount: i64,
    description: &str,
    token_id: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    validate_amount(amount)?;

    use sea_orm::sea_query::Expr;

    let update = Member::update_many()
        .col_expr(
            member::Column::Balance,
            Expr::col(member::Column::Balance).add(amount),
        )
        .filter(member::Column::Id.eq(member_id))
        .exec(conn)
        .await?;

    if update.rows_affected == 0 {
        return Err(Error::NotFound {
            what: format!("member {member_id}"),
        });
    }

    debug!(member_id, amount, description, "credited wallet");

    append_entry(conn, member_id, amount, TxnKind::Credit, description, token_id).await
}

/// The member's current balance in minor currency units.
pub async fn balance_of(db: &DatabaseConnection, member_id: i64) -> Result<i64> {
    Member::find_by_id(member_id)
        .one(db)
        .await?
        .map(|m| m.balance)
        .ok_or_else(|| Error::NotFound {
            what: format!("member {member_id}"),
        })
}

/// All ledger entries for a member, newest first.
pub async fn transactions_for(
    db: &DatabaseConnection,
    member_id: i64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::MemberId.eq(member_id))
        .order_by_desc(transaction::Column::Timestamp)
        .all(db)
        .await
        .map_err(Into::into)
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::InvalidInput {
            message: format!("amount must be positive, got {amount}"),
        });
    }
    Ok(())
}

async fn append_entry<C>(
    conn: &C,
    member_id: i64,
    delta: i64,
    kind: TxnKind,
    description: &str,
    token_id: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    let entry = transaction::ActiveModel {
        member_id: Set(member_id),
        delta: Set(delta),
        kind: Set(kind),
        description: Set(description.to_string()),
        token_id: Set(token_id),
        timestamp: Set(Utc::now()),
        ..Default::default()
    };

    entry.insert(conn).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{create_test_member, setup_test_db};

    #[tokio::test]
    async fn test_debit_decrements_and_logs() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 1000).await?;

        let entry = debit(&db, member.id, 40, "Breakfast booking", None).await?;
        assert_eq!(entry.delta, -40);
        assert_eq!(entry.kind, TxnKind::Debit);
        assert_eq!(balance_of(&db, member.id).await?, 960);

        let log = transactions_for(&db, member.id).await?;
        assert_eq!(log.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_never_overdraws() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 30).await?;

        let result = debit(&db, member.id, 40, "Breakfast booking", None).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PaymentRequired {
                balance: 30,
                required: 40
            }
        ));

        // Balance untouched, no orphan ledger row
        assert_eq!(balance_of(&db, member.id).await?, 30);
        assert!(transactions_for(&db, member.id).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_exact_balance_allowed() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 40).await?;

        debit(&db, member.id, 40, "Breakfast booking", None).await?;
        assert_eq!(balance_of(&db, member.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_credit_increments_and_logs() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 100).await?;

        let entry = credit(&db, member.id, 40, "Refund", Some(7)).await?;
        assert_eq!(entry.delta, 40);
        assert_eq!(entry.kind, TxnKind::Credit);
        assert_eq!(entry.token_id, Some(7));
        assert_eq!(balance_of(&db, member.id).await?, 140);
        Ok(())
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 100).await?;

        for amount in [0, -5] {
            assert!(matches!(
                debit(&db, member.id, amount, "bad", None).await.unwrap_err(),
                Error::InvalidInput { message: _ }
            ));
            assert!(matches!(
                credit(&db, member.id, amount, "bad", None)
                    .await
                    .unwrap_err(),
                Error::InvalidInput { message: _ }
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_member_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            debit(&db, 999, 10, "ghost", None).await.unwrap_err(),
            Error::NotFound { what: _ }
        ));
        assert!(matches!(
            credit(&db, 999, 10, "ghost", None).await.unwrap_err(),
            Error::NotFound { what: _ }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_sum_matches_balance() -> Result<()> {
        let db = setup_test_db().await?;
        let member = create_test_member(&db, "Asha", 500).await?;

        debit(&db, member.id, 40, "Breakfast", None).await?;
        debit(&db, member.id, 60, "Lunch", None).await?;
        credit(&db, member.id, 40, "Refund breakfast", None).await?;
        let _ = debit(&db, member.id, 10_000, "Too big", None).await;

        let balance = balance_of(&db, member.id).await?;
        let ledger_sum: i64 = transactions_for(&db, member.id)
            .await?
            .iter()
            .map(|t| t.delta)
            .sum();
        assert_eq!(balance, 500 + ledger_sum);
        assert_eq!(balance, 440);
        Ok(())
    }
}
