//! Subscription manager - monthly plan activation and recharge.
//!
//! One recharge displaces the member's future individual bookings (their
//! summed cost becomes a refund), charges the fixed plan cost against the
//! refund-adjusted balance, and issues a full block of `BOOKED` tokens for
//! the plan period starting tomorrow. The whole operation is one database
//! transaction: a failure anywhere leaves neither money moved nor tokens
//! issued.

use crate::{
    config::PlanConfig,
    core::calendar::Calendar,
    core::wallet,
    entities::{
        MealSlot, MealToken, Member, Subscription, TokenStatus, meal_token, member, subscription,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Days, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Result of a successful plan activation or recharge.
#[derive(Debug, Clone)]
pub struct RechargeOutcome {
    /// The subscription after the recharge
    pub subscription: subscription::Model,
    /// Number of `BOOKED` tokens issued for the plan period
    pub tokens_issued: u64,
    /// Summed cost of the displaced future bookings, folded into the charge
    pub refunded: i64,
    /// The fixed plan cost debited
    pub charged: i64,
}

/// Activates the member's meal plan, or recharges an existing one.
///
/// Net balance effect is `refund - plan cost`; credits accumulate across
/// recharges and the expiry extends from today. Fails with
/// [`Error::PaymentRequired`] when the refund-adjusted balance cannot cover
/// the plan cost, in which case nothing is changed — including the displaced
/// bookings, which stay `BOOKED`.
pub async fn activate_or_recharge(
    db: &DatabaseConnection,
    calendar: Calendar,
    plan: &PlanConfig,
    member_id: i64,
) -> Result<RechargeOutcome> {
    activate_or_recharge_at(db, calendar, plan, member_id, Utc::now()).await
}

async fn activate_or_recharge_at(
    db: &DatabaseConnection,
    calendar: Calendar,
    plan: &PlanConfig,
    member_id: i64,
    now: DateTime<Utc>,
) -> Result<RechargeOutcome> {
    let anchor = calendar.tomorrow(now);
    let cost = plan.cost();

    let txn = db.begin().await?;

    let member = Member::find_by_id(member_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::NotFound {
            what: format!("member {member_id}"),
        })?;

    // Displace every future individual booking; their value is refunded as
    // part of the recharge rather than per token.
    let displaced = MealToken::find()
        .filter(meal_token::Column::MemberId.eq(member_id))
        .filter(meal_token::Column::Date.gte(anchor))
        .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
        .all(&txn)
        .await?;
    let refund: i64 = displaced.iter().map(|t| t.cost).sum();

    if member.balance + refund < cost {
        return Err(Error::PaymentRequired {
            balance: member.balance + refund,
            required: cost,
        });
    }

    if !displaced.is_empty() {
        let ids: Vec<i64> = displaced.iter().map(|t| t.id).collect();
        MealToken::update_many()
            .set(meal_token::ActiveModel {
                status: Set(TokenStatus::Cancelled),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(meal_token::Column::Id.is_in(ids))
            .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
            .exec(&txn)
            .await?;
    }

    // Credit-then-debit pair keeps the refund and the plan charge as two
    // legible ledger rows while netting to refund - cost.
    if refund > 0 {
        wallet::credit(
            &txn,
            member_id,
            refund,
            "Meal plan recharge: refund for displaced bookings",
            None,
        )
        .await?;
    }
    wallet::debit(&txn, member_id, cost, "Meal plan recharge", None).await?;

    let tokens_issued = issue_plan_tokens(&txn, plan, member_id, anchor, now).await?;
    let subscription = upsert_subscription(&txn, plan, member_id, now).await?;

    Member::update_many()
        .set(member::ActiveModel {
            is_subscriber: Set(true),
            ..Default::default()
        })
        .filter(member::Column::Id.eq(member_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    info!(
        member_id,
        tokens_issued,
        refunded = refund,
        charged = cost,
        "meal plan recharged"
    );

    Ok(RechargeOutcome {
        subscription,
        tokens_issued,
        refunded: refund,
        charged: cost,
    })
}

/// Issues `length_days x 3` `BOOKED` tokens starting at the anchor date.
///
/// Upserts over the `(member_id, date, slot)` key: a retired row already
/// occupying a key is re-activated in place. At this point every pre-existing
/// future-dated row is `CANCELLED` (the displacement above took care of the
/// `BOOKED` ones), so the overwrite cannot clobber a live token.
async fn issue_plan_tokens<C>(
    conn: &C,
    plan: &PlanConfig,
    member_id: i64,
    anchor: chrono::NaiveDate,
    now: DateTime<Utc>,
) -> Result<u64>
where
    C: ConnectionTrait,
{
    let mut tokens = Vec::with_capacity(plan.length_days as usize * 3);
    for day in 0..plan.length_days {
        let date = anchor + Days::new(u64::from(day));
        for slot in [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner] {
            tokens.push(meal_token::ActiveModel {
                member_id: Set(member_id),
                date: Set(date),
                slot: Set(slot),
                status: Set(TokenStatus::Booked),
                cost: Set(plan.slot_price(slot)),
                is_emergency_rebook: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            });
        }
    }
    let issued = tokens.len() as u64;

    MealToken::insert_many(tokens)
        .on_conflict(
            OnConflict::columns([
                meal_token::Column::MemberId,
                meal_token::Column::Date,
                meal_token::Column::Slot,
            ])
            .update_columns([
                meal_token::Column::Status,
                meal_token::Column::Cost,
                meal_token::Column::IsEmergencyRebook,
                meal_token::Column::UpdatedAt,
            ])
            .to_owned(),
        )
        .exec(conn)
        .await?;

    Ok(issued)
}

/// Creates the member's subscription on first activation, or recharges the
/// existing one: credits accumulate, the expiry extends from today.
async fn upsert_subscription<C>(
    conn: &C,
    plan: &PlanConfig,
    member_id: i64,
    now: DateTime<Utc>,
) -> Result<subscription::Model>
where
    C: ConnectionTrait,
{
    let expires_at = now + Days::new(u64::from(plan.length_days));

    let existing = Subscription::find()
        .filter(subscription::Column::MemberId.eq(member_id))
        .one(conn)
        .await?;

    let model = if let Some(subscription) = existing {
        let credits = subscription.meal_credits + plan.meal_allotment();
        let mut active: subscription::ActiveModel = subscription.into();
        active.meal_credits = Set(credits);
        active.is_active = Set(true);
        active.expires_at = Set(expires_at);
        active.update(conn).await?
    } else {
        let active = subscription::ActiveModel {
            member_id: Set(member_id),
            meal_credits: Set(plan.meal_allotment()),
            is_active: Set(true),
            auto_booking_enabled: Set(true),
            expires_at: Set(expires_at),
            ..Default::default()
        };
        active.insert(conn).await?
    };

    Ok(model)
}

/// The member's subscription record, if one was ever created.
pub async fn subscription_of(
    db: &DatabaseConnection,
    member_id: i64,
) -> Result<Option<subscription::Model>> {
    Subscription::find()
        .filter(subscription::Column::MemberId.eq(member_id))
        .one(db)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::wallet::{balance_of, transactions_for};
    use crate::entities::TxnKind;
    use crate::test_utils::{
        create_test_member, insert_test_token, setup_test_db, test_calendar, test_now,
        test_tomorrow,
    };

    /// Two-day plan: cost 2 x (40 + 60 + 60) = 320, allotment 6.
    fn plan() -> PlanConfig {
        PlanConfig {
            length_days: 2,
            breakfast_price: 40,
            lunch_price: 60,
            dinner_price: 60,
        }
    }

    async fn booked_plan_tokens(db: &DatabaseConnection, member_id: i64) -> Result<u64> {
        let count = MealToken::find()
            .filter(meal_token::Column::MemberId.eq(member_id))
            .filter(meal_token::Column::Date.gte(test_tomorrow()))
            .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
            .count(db)
            .await?;
        Ok(count)
    }

    #[tokio::test]
    async fn test_first_activation() -> Result<()> {
        let db = setup_test_db().await?;
        let plan = plan();
        let member = create_test_member(&db, "Asha", 500).await?;

        let outcome =
            activate_or_recharge_at(&db, test_calendar(), &plan, member.id, test_now()).await?;

        assert_eq!(outcome.charged, 320);
        assert_eq!(outcome.refunded, 0);
        assert_eq!(outcome.tokens_issued, 6);
        assert_eq!(outcome.subscription.meal_credits, 6);
        assert!(outcome.subscription.is_active);

        assert_eq!(balance_of(&db, member.id).await?, 180);
        assert_eq!(booked_plan_tokens(&db, member.id).await?, 6);

        // One debit row, no refund row
        let log = transactions_for(&db, member.id).await?;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TxnKind::Debit);
        assert_eq!(log[0].delta, -320);

        let m = Member::find_by_id(member.id).one(&db).await?.unwrap();
        assert!(m.is_subscriber);
        Ok(())
    }

    #[tokio::test]
    async fn test_recharge_refunds_displaced_bookings() -> Result<()> {
        let db = setup_test_db().await?;
        let plan = plan();
        let member = create_test_member(&db, "Asha", 300).await?;

        // Two future individual bookings worth 100 total
        insert_test_token(
            &db,
            member.id,
            test_tomorrow(),
            MealSlot::Lunch,
            TokenStatus::Booked,
            60,
        )
        .await?;
        insert_test_token(
            &db,
            member.id,
            test_tomorrow() + Days::new(1),
            MealSlot::Breakfast,
            TokenStatus::Booked,
            40,
        )
        .await?;

        let outcome =
            activate_or_recharge_at(&db, test_calendar(), &plan, member.id, test_now()).await?;

        assert_eq!(outcome.refunded, 100);
        assert_eq!(outcome.charged, 320);
        // Net effect: 300 + 100 - 320
        assert_eq!(balance_of(&db, member.id).await?, 80);

        // Credit-then-debit pair in the ledger
        let log = transactions_for(&db, member.id).await?;
        assert_eq!(log.len(), 2);
        assert!(log.iter().any(|t| t.kind == TxnKind::Credit && t.delta == 100));
        assert!(log.iter().any(|t| t.kind == TxnKind::Debit && t.delta == -320));

        // The displaced keys were re-issued as plan tokens at plan prices
        assert_eq!(booked_plan_tokens(&db, member.id).await?, 6);
        let reissued = crate::core::token::find_token(
            &db,
            member.id,
            test_tomorrow(),
            MealSlot::Lunch,
        )
        .await?
        .unwrap();
        assert_eq!(reissued.status, TokenStatus::Booked);
        assert!(!reissued.is_emergency_rebook);
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_required_changes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let plan = plan();
        let member = create_test_member(&db, "Asha", 100).await?;
        let token = insert_test_token(
            &db,
            member.id,
            test_tomorrow(),
            MealSlot::Lunch,
            TokenStatus::Booked,
            60,
        )
        .await?;

        let result =
            activate_or_recharge_at(&db, test_calendar(), &plan, member.id, test_now()).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::PaymentRequired {
                balance: 160,
                required: 320
            }
        ));

        // Rolled back: booking still BOOKED, balance and ledger untouched
        let unchanged = crate::core::token::reload(&db, token.id).await?;
        assert_eq!(unchanged.status, TokenStatus::Booked);
        assert_eq!(balance_of(&db, member.id).await?, 100);
        assert!(transactions_for(&db, member.id).await?.is_empty());
        assert!(subscription_of(&db, member.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_recharge_accumulates_credits_and_extends_expiry() -> Result<()> {
        let db = setup_test_db().await?;
        let plan = plan();
        let member = create_test_member(&db, "Asha", 400).await?;

        let first =
            activate_or_recharge_at(&db, test_calendar(), &plan, member.id, test_now()).await?;
        assert_eq!(first.subscription.meal_credits, 6);
        assert_eq!(balance_of(&db, member.id).await?, 80);

        // Second recharge: the first recharge's 6 future tokens are displaced,
        // so the effective balance is 80 + 320 and the net charge is zero.
        let later = test_now() + chrono::Duration::hours(1);
        let second = activate_or_recharge_at(&db, test_calendar(), &plan, member.id, later).await?;
        assert_eq!(second.refunded, 320);
        assert_eq!(second.subscription.meal_credits, 12);
        assert_eq!(second.subscription.id, first.subscription.id);
        assert!(second.subscription.expires_at > first.subscription.expires_at);
        assert_eq!(balance_of(&db, member.id).await?, 80);
        assert_eq!(booked_plan_tokens(&db, member.id).await?, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_member() -> Result<()> {
        let db = setup_test_db().await?;
        let result =
            activate_or_recharge_at(&db, test_calendar(), &plan(), 999, test_now()).await;
        assert!(matches!(result.unwrap_err(), Error::NotFound { what: _ }));
        Ok(())
    }
}
