//! Core business logic for the reservation engine.
//!
//! Framework-agnostic operations over the entities: date and deadline math,
//! the wallet ledger, the meal-token state machine, redemption proofs, plan
//! recharges, and bulk leave cancellation. Everything here takes the database
//! handle and the resolved member identity explicitly; nothing reads ambient
//! globals.

/// Calendar resolution and slot deadline math
pub mod calendar;
/// Bulk cancellation of a date range of bookings
pub mod leave;
/// Rolling HMAC proof generation and verification at the counter
pub mod redemption;
/// Monthly plan activation and recharge
pub mod subscription;
/// Booking, cancellation, and expiry of meal tokens
pub mod token;
/// Atomic debit/credit with an append-only ledger
pub mod wallet;
