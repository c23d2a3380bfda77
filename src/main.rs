//! Expiry-sweeper daemon.
//!
//! Long-running housekeeping process for the reservation engine: once a
//! minute it marks unredeemed tokens for every slot whose service window has
//! ended today as `EXPIRED`. The sweep entry point is idempotent, so calling
//! it on every tick is harmless.

#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use messmate::{
    config,
    core::{calendar::Calendar, token},
    entities::MealSlot,
    errors::Result,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = config::load_default_config()?;
    let calendar = Calendar::new(app_config.facility.offset()?);
    info!("Successfully processed application configuration.");

    // 4. Initialize database
    let db = config::database::create_connection()
        .await
        .inspect(|_| info!("Database connection established."))
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    config::database::create_tables(&db).await?;

    // 5. Sweep once a minute
    info!("Expiry sweeper running.");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;

        let now = chrono::Utc::now();
        let today = calendar.today(now);

        for slot in [MealSlot::Breakfast, MealSlot::Lunch, MealSlot::Dinner] {
            if !calendar.has_service_ended(now, slot) {
                continue;
            }
            match token::expire_slot(&db, today, slot).await {
                Ok(0) => {}
                Ok(expired) => info!(%today, %slot, expired, "expired unredeemed tokens"),
                Err(e) => error!(%today, %slot, "expiry sweep failed: {e}"),
            }
        }
    }
}
