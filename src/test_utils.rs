//! Shared test utilities for `Messmate`.
//!
//! This module provides common helper functions for setting up test databases,
//! seeding test entities with sensible defaults, and fixed calendar instants
//! so date-dependent tests are deterministic.

#![allow(clippy::unwrap_used)]

use crate::{
    core::calendar::Calendar,
    entities::{MealSlot, TokenStatus, meal_token, member, price_quote},
    errors::Result,
};
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables and indexes
/// initialized. This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // One pooled connection: an in-memory SQLite database is private to its
    // connection, so a larger pool would hand tests empty databases.
    let mut options = sea_orm::ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = sea_orm::Database::connect(options).await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// The facility calendar used by all tests: fixed +05:30 offset.
pub fn test_calendar() -> Calendar {
    Calendar::new(FixedOffset::east_opt(330 * 60).unwrap())
}

/// A fixed reference instant: Monday 2026-08-24, 12:00 facility-local.
///
/// Noon sits inside the lunch service window and past today's breakfast and
/// lunch cutoffs, while every slot of tomorrow is still freely bookable.
pub fn test_now() -> DateTime<Utc> {
    FixedOffset::east_opt(330 * 60)
        .unwrap()
        .with_ymd_and_hms(2026, 8, 24, 12, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// Tomorrow relative to [`test_now`] (Tuesday 2026-08-25).
pub fn test_tomorrow() -> NaiveDate {
    test_calendar().today(test_now()) + Days::new(1)
}

/// The 1-7 weekday index of [`test_tomorrow`], for booking calls.
pub fn test_tomorrow_weekday() -> u32 {
    test_tomorrow().weekday().number_from_monday()
}

/// Creates a test member with the given starting balance.
pub async fn create_test_member(
    db: &DatabaseConnection,
    name: &str,
    balance: i64,
) -> Result<member::Model> {
    let model = member::ActiveModel {
        name: Set(name.to_string()),
        balance: Set(balance),
        is_subscriber: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Seeds a menu price quote for one date and slot.
pub async fn seed_price(
    db: &DatabaseConnection,
    date: NaiveDate,
    slot: MealSlot,
    price: i64,
) -> Result<price_quote::Model> {
    let model = price_quote::ActiveModel {
        date: Set(date),
        slot: Set(slot),
        price: Set(price),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Inserts a meal token directly in the given state, bypassing the booking
/// path. Use this to stage lifecycle scenarios without moving money.
pub async fn insert_test_token(
    db: &DatabaseConnection,
    member_id: i64,
    date: NaiveDate,
    slot: MealSlot,
    status: TokenStatus,
    cost: i64,
) -> Result<meal_token::Model> {
    let now = Utc::now();
    let model = meal_token::ActiveModel {
        member_id: Set(member_id),
        date: Set(date),
        slot: Set(slot),
        status: Set(status),
        cost: Set(cost),
        is_emergency_rebook: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}
