//! Database configuration module for `Messmate`.
//!
//! This module handles `SQLite` database connection and table creation using
//! `SeaORM`. Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs. On top of that the module creates the one piece of schema the
//! entities cannot express: the composite UNIQUE index on
//! `meal_tokens (member_id, date, slot)` that makes double-booking a storage
//! level conflict instead of an application-level race.

use crate::entities::{MealToken, Member, PriceQuote, Subscription, Transaction, meal_token};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Name of the uniqueness index guarding one token per (member, date, slot).
const TOKEN_KEY_INDEX: &str = "idx_meal_tokens_member_date_slot";

/// Establishes a connection to the `SQLite` database using the `DATABASE_URL`
/// environment variable.
///
/// Falls back to a default local `SQLite` file if no environment variable is
/// set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/messmate.sqlite".to_string());

    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all necessary database tables and indexes from the entity
/// definitions.
///
/// The meal-token uniqueness index covers the key regardless of token status:
/// retired (cancelled/expired) rows keep occupying their key, which is what
/// forces re-activation to go through the emergency re-book transition rather
/// than a second insert.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let member_table = schema.create_table_from_entity(Member);
    let transaction_table = schema.create_table_from_entity(Transaction);
    let meal_token_table = schema.create_table_from_entity(MealToken);
    let subscription_table = schema.create_table_from_entity(Subscription);
    let price_quote_table = schema.create_table_from_entity(PriceQuote);

    db.execute(builder.build(&member_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;
    db.execute(builder.build(&meal_token_table)).await?;
    db.execute(builder.build(&subscription_table)).await?;
    db.execute(builder.build(&price_quote_table)).await?;

    let token_key_index = Index::create()
        .name(TOKEN_KEY_INDEX)
        .table(meal_token::Entity)
        .col(meal_token::Column::MemberId)
        .col(meal_token::Column::Date)
        .col(meal_token::Column::Slot)
        .unique()
        .to_owned();

    db.execute(builder.build(&token_key_index)).await?;

    Ok(())
}
