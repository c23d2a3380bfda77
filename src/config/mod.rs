//! Configuration loading for the reservation engine.
//!
//! Settings come from two places, mirroring how the rest of the deployment is
//! wired: structural configuration (facility timezone, plan shape and prices)
//! lives in `config.toml`, while secrets and the database URL come from the
//! environment. The redemption secret is deliberately kept out of the config
//! struct and read only where the verifier is constructed.

/// Database configuration and connection management
pub mod database;

use crate::errors::{Error, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::path::Path;

use crate::entities::MealSlot;

/// Environment variable holding the shared redemption-proof secret.
pub const REDEMPTION_SECRET_VAR: &str = "REDEMPTION_SECRET";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Facility-level settings (timezone)
    pub facility: FacilityConfig,
    /// Monthly meal plan shape and pricing
    pub plan: PlanConfig,
}

/// Facility-level settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FacilityConfig {
    /// Fixed local timezone offset from UTC, in minutes (e.g. 330 for +05:30).
    /// All day-granularity date math uses this offset; no call site hard-codes
    /// a timezone.
    pub utc_offset_minutes: i32,
}

impl FacilityConfig {
    /// The facility's fixed local timezone offset.
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::ServerMisconfiguration {
                message: format!(
                    "utc_offset_minutes {} is out of range",
                    self.utc_offset_minutes
                ),
            }
        })
    }
}

/// Shape and pricing of the monthly meal plan.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlanConfig {
    /// How many consecutive days one recharge covers
    pub length_days: u32,
    /// Plan price of one breakfast, minor currency units
    pub breakfast_price: i64,
    /// Plan price of one lunch, minor currency units
    pub lunch_price: i64,
    /// Plan price of one dinner, minor currency units
    pub dinner_price: i64,
}

impl PlanConfig {
    /// The fixed plan price for one meal in the given slot.
    pub const fn slot_price(&self, slot: MealSlot) -> i64 {
        match slot {
            MealSlot::Breakfast => self.breakfast_price,
            MealSlot::Lunch => self.lunch_price,
            MealSlot::Dinner => self.dinner_price,
        }
    }

    /// Total charge for one recharge. Always equals the summed cost of the
    /// tokens the recharge issues.
    pub const fn cost(&self) -> i64 {
        (self.breakfast_price + self.lunch_price + self.dinner_price) * self.length_days as i64
    }

    /// Meal credits granted per recharge (three slots a day).
    pub const fn meal_allotment(&self) -> i32 {
        self.length_days as i32 * 3
    }
}

/// Loads application configuration from a TOML file
///
/// # Errors
/// Returns [`Error::ServerMisconfiguration`] if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents =
        std::fs::read_to_string(path.as_ref()).map_err(|e| Error::ServerMisconfiguration {
            message: format!("Failed to read config file: {e}"),
        })?;

    toml::from_str(&contents).map_err(|e| Error::ServerMisconfiguration {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads application configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<AppConfig> {
    load_config("config.toml")
}

/// Reads the shared redemption-proof secret from the environment.
///
/// The secret is an out-of-band value shared between the issuing and verifying
/// sides. Its absence is a hard server-configuration error, not a per-request
/// failure.
pub fn redemption_secret() -> Result<Vec<u8>> {
    match std::env::var(REDEMPTION_SECRET_VAR) {
        Ok(value) if !value.trim().is_empty() => Ok(value.into_bytes()),
        _ => Err(Error::ServerMisconfiguration {
            message: format!("{REDEMPTION_SECRET_VAR} is not set"),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_config_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [facility]
            utc_offset_minutes = 330

            [plan]
            length_days = 30
            breakfast_price = 40
            lunch_price = 60
            dinner_price = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.facility.utc_offset_minutes, 330);
        assert_eq!(config.plan.length_days, 30);
        assert_eq!(config.plan.slot_price(MealSlot::Breakfast), 40);
        assert_eq!(config.plan.cost(), 30 * 160);
        assert_eq!(config.plan.meal_allotment(), 90);
    }

    #[test]
    fn test_offset_out_of_range() {
        let facility = FacilityConfig {
            utc_offset_minutes: 100_000,
        };
        assert!(matches!(
            facility.offset().unwrap_err(),
            Error::ServerMisconfiguration { message: _ }
        ));
    }
}
