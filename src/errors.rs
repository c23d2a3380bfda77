//! Unified error taxonomy for the reservation engine.
//!
//! Every public operation returns a classified [`Error`] so the request layer
//! can branch on the failure kind (and render a stable, user-legible message)
//! without string matching. Financial and state mutations never report partial
//! success: on any error the surrounding database transaction is rolled back.

use chrono::NaiveDate;
use thiserror::Error;

use crate::entities::MealSlot;

/// All failure modes surfaced by the core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed caller input (bad weekday index, inverted date
    /// range, non-positive amount, insufficient leave notice).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// No matching record (token, member, subscription, or menu price).
    #[error("{what} not found")]
    NotFound {
        /// The thing that could not be found
        what: String,
    },

    /// The operation lost to an existing record or a concurrent writer
    /// (duplicate booking, double redemption).
    #[error("Conflict: {message}")]
    Conflict {
        /// What the operation conflicted with
        message: String,
    },

    /// The booking/cancellation window for the slot has closed.
    #[error("The {slot} window for {date} has closed")]
    DeadlinePassed {
        /// The slot whose cutoff has passed
        slot: MealSlot,
        /// The calendar date of the attempted operation
        date: NaiveDate,
    },

    /// The member's prepaid balance cannot cover the charge.
    #[error("Insufficient balance: have {balance}, need {required}")]
    PaymentRequired {
        /// Current balance in minor currency units
        balance: i64,
        /// Amount the operation needed
        required: i64,
    },

    /// Ownership or role check failed (including an invalid redemption proof).
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Why the caller is not allowed
        message: String,
    },

    /// The server is missing required configuration (e.g. the redemption
    /// secret). Always an operator problem, never a per-request one.
    #[error("Server misconfiguration: {message}")]
    ServerMisconfiguration {
        /// What is misconfigured
        message: String,
    },

    /// Database error from `SeaORM`
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error (config file reads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Unclassified failure; indicates a bug or an impossible state.
    #[error("Unexpected error: {message}")]
    Unexpected {
        /// Description of the impossible state
        message: String,
    },
}

// Convenience `Result` type
/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
