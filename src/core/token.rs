//! Meal token lifecycle - booking, cancellation, and expiry.
//!
//! A token is one reservation for one `(member, date, slot)` key and moves
//! through `BOOKED -> CANCELLED | REDEEMED | EXPIRED`, with the one backward
//! edge `CANCELLED -> BOOKED` (emergency re-book through the booking path).
//! Every money-plus-state mutation runs inside one database transaction:
//! either the ledger entry and the token land together or neither does.
//! Status transitions are conditional updates (`... WHERE status = ?`) checked
//! via `rows_affected`, so concurrent cancels or scans cannot both win, and
//! fresh inserts ride on the `(member_id, date, slot)` UNIQUE index so
//! concurrent bookings cannot both create a row.

use crate::{
    core::calendar::{Calendar, Direction},
    core::wallet,
    entities::{MealSlot, MealToken, PriceQuote, TokenStatus, meal_token, price_quote},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, Set, TransactionTrait, prelude::*};
use tracing::{debug, info};

/// Result of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// The token after its transition to `CANCELLED`
    pub token: meal_token::Model,
    /// Amount credited back to the wallet, in minor currency units
    pub refunded: i64,
}

/// Books the member's meal for the nearest future date matching `weekday`.
///
/// The slot's current menu price is debited from the wallet and one `BOOKED`
/// token is created, atomically. If a `CANCELLED` token already occupies the
/// key this becomes an emergency re-book: the existing row transitions back to
/// `BOOKED`, flagged and re-priced at the current quote. An existing `BOOKED`
/// or `REDEEMED` token is a conflict, never an overwrite.
pub async fn book_slot(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    weekday: u32,
    slot: MealSlot,
) -> Result<meal_token::Model> {
    book_slot_at(db, calendar, member_id, weekday, slot, Utc::now()).await
}

async fn book_slot_at(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    weekday: u32,
    slot: MealSlot,
    now: DateTime<Utc>,
) -> Result<meal_token::Model> {
    let date = calendar.resolve_weekday(weekday, Direction::Future, now)?;
    if calendar.is_past_deadline(now, date, slot) {
        return Err(Error::DeadlinePassed { slot, date });
    }

    let quote = PriceQuote::find()
        .filter(price_quote::Column::Date.eq(date))
        .filter(price_quote::Column::Slot.eq(slot))
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            what: format!("menu price for {slot} on {date}"),
        })?;

    let txn = db.begin().await?;

    let existing = MealToken::find()
        .filter(meal_token::Column::MemberId.eq(member_id))
        .filter(meal_token::Column::Date.eq(date))
        .filter(meal_token::Column::Slot.eq(slot))
        .one(&txn)
        .await?;

    let token = match existing {
        Some(token) => match token.status {
            TokenStatus::Booked | TokenStatus::Redeemed => {
                return Err(Error::Conflict {
                    message: format!("{slot} on {date} is already booked"),
                });
            }
            TokenStatus::Expired => {
                return Err(Error::Conflict {
                    message: format!("{slot} on {date} has already expired"),
                });
            }
            TokenStatus::Cancelled => {
                rebook_cancelled(&txn, &token, quote.price, now).await?
            }
        },
        None => insert_booked(&txn, member_id, date, slot, quote.price, now).await?,
    };

    let description = if token.is_emergency_rebook {
        format!("Emergency re-book: {slot} on {date}")
    } else {
        format!("Meal booking: {slot} on {date}")
    };
    wallet::debit(&txn, member_id, token.cost, &description, Some(token.id)).await?;

    txn.commit().await?;

    info!(
        member_id,
        token_id = token.id,
        %date,
        %slot,
        cost = token.cost,
        emergency = token.is_emergency_rebook,
        "booked meal"
    );

    Ok(token)
}

/// Re-activates a cancelled token through the booking path.
///
/// Charged at the live current quote rather than the token's original cost;
/// pending product clarification on re-book pricing.
async fn rebook_cancelled<C>(
    conn: &C,
    token: &meal_token::Model,
    current_price: i64,
    now: DateTime<Utc>,
) -> Result<meal_token::Model>
where
    C: ConnectionTrait,
{
    let update = MealToken::update_many()
        .set(meal_token::ActiveModel {
            status: Set(TokenStatus::Booked),
            cost: Set(current_price),
            is_emergency_rebook: Set(true),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(meal_token::Column::Id.eq(token.id))
        .filter(meal_token::Column::Status.eq(TokenStatus::Cancelled))
        .exec(conn)
        .await?;

    if update.rows_affected == 0 {
        return Err(Error::Conflict {
            message: format!("{} on {} is already booked", token.slot, token.date),
        });
    }

    reload(conn, token.id).await
}

async fn insert_booked<C>(
    conn: &C,
    member_id: i64,
    date: NaiveDate,
    slot: MealSlot,
    price: i64,
    now: DateTime<Utc>,
) -> Result<meal_token::Model>
where
    C: ConnectionTrait,
{
    let token = meal_token::ActiveModel {
        member_id: Set(member_id),
        date: Set(date),
        slot: Set(slot),
        status: Set(TokenStatus::Booked),
        cost: Set(price),
        is_emergency_rebook: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    // The UNIQUE index on (member_id, date, slot) makes the loser of a
    // concurrent booking race fail here instead of inserting a duplicate.
    let insert = MealToken::insert(token)
        .on_conflict(
            OnConflict::columns([
                meal_token::Column::MemberId,
                meal_token::Column::Date,
                meal_token::Column::Slot,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(conn)
        .await;

    let token_id = match insert {
        Ok(result) => result.last_insert_id,
        Err(DbErr::RecordNotInserted) => {
            return Err(Error::Conflict {
                message: format!("{slot} on {date} is already booked"),
            });
        }
        Err(e) => return Err(e.into()),
    };

    reload(conn, token_id).await
}

/// Cancels the member's `BOOKED` token for the nearest future date matching
/// `weekday`, refunding its recorded cost.
///
/// The credit and the `BOOKED -> CANCELLED` transition commit together.
pub async fn cancel_slot(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    weekday: u32,
    slot: MealSlot,
) -> Result<CancelOutcome> {
    cancel_slot_at(db, calendar, member_id, weekday, slot, Utc::now()).await
}

async fn cancel_slot_at(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    weekday: u32,
    slot: MealSlot,
    now: DateTime<Utc>,
) -> Result<CancelOutcome> {
    let date = calendar.resolve_weekday(weekday, Direction::Future, now)?;
    if calendar.is_past_deadline(now, date, slot) {
        return Err(Error::DeadlinePassed { slot, date });
    }

    let txn = db.begin().await?;

    let token = find_token_on(&txn, member_id, date, slot).await?;
    let token = match token {
        Some(token) if token.status == TokenStatus::Booked => token,
        _ => {
            return Err(Error::NotFound {
                what: format!("booked {slot} on {date}"),
            });
        }
    };

    wallet::credit(
        &txn,
        member_id,
        token.cost,
        &format!("Refund: cancelled {slot} on {date}"),
        Some(token.id),
    )
    .await?;

    let update = MealToken::update_many()
        .set(meal_token::ActiveModel {
            status: Set(TokenStatus::Cancelled),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(meal_token::Column::Id.eq(token.id))
        .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
        .exec(&txn)
        .await?;

    if update.rows_affected == 0 {
        // A concurrent cancel or redemption got there first; roll back the credit
        return Err(Error::Conflict {
            message: format!("{slot} on {date} was modified concurrently"),
        });
    }

    let refunded = token.cost;
    let token = reload(&txn, token.id).await?;
    txn.commit().await?;

    info!(member_id, token_id = token.id, %date, %slot, refunded, "cancelled meal");

    Ok(CancelOutcome { token, refunded })
}

/// Marks every unredeemed `BOOKED` token for exactly this date and slot as
/// `EXPIRED`. Returns how many tokens were expired.
///
/// This is the only timer-facing entry point. The transition is a single
/// conditional update, so the sweep is idempotent and safe to re-run or run
/// concurrently with itself.
pub async fn expire_slot<C>(conn: &C, date: NaiveDate, slot: MealSlot) -> Result<u64>
where
    C: ConnectionTrait,
{
    let update = MealToken::update_many()
        .set(meal_token::ActiveModel {
            status: Set(TokenStatus::Expired),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(meal_token::Column::Date.eq(date))
        .filter(meal_token::Column::Slot.eq(slot))
        .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
        .exec(conn)
        .await?;

    debug!(%date, %slot, expired = update.rows_affected, "expiry sweep");

    Ok(update.rows_affected)
}

/// Looks up the token occupying `(member, date, slot)`, whatever its status.
pub async fn find_token(
    db: &DatabaseConnection,
    member_id: i64,
    date: NaiveDate,
    slot: MealSlot,
) -> Result<Option<meal_token::Model>> {
    find_token_on(db, member_id, date, slot).await
}

pub(crate) async fn find_token_on<C>(
    conn: &C,
    member_id: i64,
    date: NaiveDate,
    slot: MealSlot,
) -> Result<Option<meal_token::Model>>
where
    C: ConnectionTrait,
{
    MealToken::find()
        .filter(meal_token::Column::MemberId.eq(member_id))
        .filter(meal_token::Column::Date.eq(date))
        .filter(meal_token::Column::Slot.eq(slot))
        .one(conn)
        .await
        .map_err(Into::into)
}

pub(crate) async fn reload<C>(conn: &C, token_id: i64) -> Result<meal_token::Model>
where
    C: ConnectionTrait,
{
    MealToken::find_by_id(token_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::Unexpected {
            message: format!("meal token {token_id} vanished mid-transaction"),
        })
}
