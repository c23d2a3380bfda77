//! Calendar resolution and deadline math.
//!
//! All date handling in the crate goes through [`Calendar`]: weekday-index
//! resolution to absolute dates, per-slot booking/cancellation cutoffs, and
//! the wall-clock-to-slot mapping the redemption verifier uses. The facility
//! timezone is a fixed offset injected at construction; comparisons happen at
//! day granularity in that local timezone. Booking, cancellation, and re-book
//! all share the single deadline predicate here, so their accept/reject
//! decisions cannot diverge.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Timelike, Utc};

use crate::entities::MealSlot;
use crate::errors::{Error, Result};

/// Which side of today a weekday index resolves to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// The nearest matching date on or before today
    Past,
    /// The nearest matching date on or after today
    Future,
}

/// Date and deadline arithmetic for one facility.
#[derive(Copy, Clone, Debug)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    /// Creates a calendar for a facility at the given fixed UTC offset.
    pub const fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The current calendar day in facility-local time.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// The next calendar day in facility-local time.
    pub fn tomorrow(&self, now: DateTime<Utc>) -> NaiveDate {
        self.today(now) + Days::new(1)
    }

    /// Resolves a weekday index (1 = Monday .. 7 = Sunday) to the nearest
    /// matching calendar date in the requested direction. A today that already
    /// matches resolves to today in both directions.
    pub fn resolve_weekday(
        &self,
        weekday: u32,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate> {
        if !(1..=7).contains(&weekday) {
            return Err(Error::InvalidInput {
                message: format!("weekday must be 1-7, got {weekday}"),
            });
        }

        let today = self.today(now);
        let today_weekday = today.weekday().number_from_monday();

        let date = match direction {
            Direction::Future => {
                let days_ahead = (weekday + 7 - today_weekday) % 7;
                today + Days::new(u64::from(days_ahead))
            }
            Direction::Past => {
                let days_back = (today_weekday + 7 - weekday) % 7;
                today - Days::new(u64::from(days_back))
            }
        };

        Ok(date)
    }

    /// Local hour after which a slot can no longer be booked or cancelled.
    pub const fn cutoff_hour(slot: MealSlot) -> u32 {
        match slot {
            MealSlot::Breakfast => 7,
            MealSlot::Lunch => 10,
            MealSlot::Dinner => 17,
        }
    }

    /// Local hour at which a slot's service ends; unredeemed tokens expire
    /// once this has passed.
    pub const fn service_end_hour(slot: MealSlot) -> u32 {
        match slot {
            MealSlot::Breakfast => 10,
            MealSlot::Lunch => 16,
            MealSlot::Dinner => 22,
        }
    }

    /// Whether the booking/cancellation window for `date`/`slot` has closed.
    ///
    /// The window closes at the cutoff instant itself: an operation arriving
    /// exactly at the cutoff is rejected, one second earlier is accepted.
    pub fn is_past_deadline(&self, now: DateTime<Utc>, date: NaiveDate, slot: MealSlot) -> bool {
        let local_now = now.with_timezone(&self.offset).naive_local();
        date.and_hms_opt(Self::cutoff_hour(slot), 0, 0)
            .map_or(true, |cutoff| local_now >= cutoff)
    }

    /// Whether the slot's service window for today has already ended.
    ///
    /// The expiry sweeper uses this to decide when a slot's unredeemed
    /// tokens are fair game.
    pub fn has_service_ended(&self, now: DateTime<Utc>, slot: MealSlot) -> bool {
        let hour = now.with_timezone(&self.offset).naive_local().hour();
        hour >= Self::service_end_hour(slot)
    }

    /// The slot currently being served, inferred from the local wall clock.
    ///
    /// Used by the redemption verifier to decide which of today's tokens a
    /// scanned proof applies to.
    pub fn slot_for(&self, now: DateTime<Utc>) -> MealSlot {
        let hour = now.with_timezone(&self.offset).naive_local().hour();
        if hour < Self::service_end_hour(MealSlot::Breakfast) {
            MealSlot::Breakfast
        } else if hour < Self::service_end_hour(MealSlot::Lunch) {
            MealSlot::Lunch
        } else {
            MealSlot::Dinner
        }
    }
}
