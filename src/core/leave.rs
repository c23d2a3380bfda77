//! Bulk leave cancellation - refund a whole date range of bookings at once.
//!
//! Members going on leave cancel every booked meal in `[start, end]` as one
//! batch: a single credit for the summed cost and one bulk
//! `BOOKED -> CANCELLED` transition, committed together. The range must start
//! no earlier than tomorrow (minimum one day's notice).

use crate::{
    core::calendar::Calendar,
    core::wallet,
    entities::{MealToken, TokenStatus, meal_token},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, Set, TransactionTrait, prelude::*};
use tracing::info;

/// Result of a successful bulk cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// How many tokens were cancelled
    pub cancelled: u64,
    /// Total amount credited back, in minor currency units
    pub refunded: i64,
}

/// Cancels all of the member's `BOOKED` tokens dated within `[start, end]`,
/// crediting their summed cost in one ledger entry.
pub async fn cancel_range(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LeaveOutcome> {
    cancel_range_at(db, calendar, member_id, start, end, Utc::now()).await
}

async fn cancel_range_at(
    db: &DatabaseConnection,
    calendar: Calendar,
    member_id: i64,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LeaveOutcome> {
    if start > end {
        return Err(Error::InvalidInput {
            message: format!("leave range {start} to {end} is inverted"),
        });
    }
    if start < calendar.tomorrow(now) {
        return Err(Error::InvalidInput {
            message: "leave must be requested at least one day in advance".to_string(),
        });
    }

    let txn = db.begin().await?;

    let tokens = MealToken::find()
        .filter(meal_token::Column::MemberId.eq(member_id))
        .filter(meal_token::Column::Date.between(start, end))
        .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
        .all(&txn)
        .await?;

    if tokens.is_empty() {
        return Err(Error::NotFound {
            what: format!("booked meals between {start} and {end}"),
        });
    }

    let refunded: i64 = tokens.iter().map(|t| t.cost).sum();
    let cancelled = tokens.len() as u64;

    wallet::credit(
        &txn,
        member_id,
        refunded,
        &format!("Leave refund: {start} to {end}"),
        None,
    )
    .await?;

    let ids: Vec<i64> = tokens.iter().map(|t| t.id).collect();
    let update = MealToken::update_many()
        .set(meal_token::ActiveModel {
            status: Set(TokenStatus::Cancelled),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(meal_token::Column::Id.is_in(ids))
        .filter(meal_token::Column::Status.eq(TokenStatus::Booked))
        .exec(&txn)
        .await?;

    if update.rows_affected != cancelled {
        // A concurrent writer raced us between the select and the update
        return Err(Error::Conflict {
            message: "bookings changed while processing the leave request".to_string(),
        });
    }

    txn.commit().await?;

    info!(member_id, %start, %end, cancelled, refunded, "leave cancellation");

    Ok(LeaveOutcome {
        cancelled,
        refunded,
    })
}
