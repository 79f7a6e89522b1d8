//! Candidate session start times from preferred times of day.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};

use crate::schedule::{PreferredTimes, StudyPreference};

/// Subject-transition buffer in minutes; always a divisor of the slot grid.
pub const SUBJECT_TRANSITION_BUFFER: u32 = 30;

const MIN_GRANULARITY: u32 = 5;
const MAX_GRANULARITY: u32 = 30;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Slot size in minutes: `gcd(session, break, 30)` clamped to `[5, 30]`.
pub fn slot_granularity(session_minutes: u32, break_minutes: u32) -> u32 {
    let mut g = gcd(gcd(session_minutes, break_minutes), SUBJECT_TRANSITION_BUFFER);
    while g > MAX_GRANULARITY {
        g /= 2;
    }
    g.max(MIN_GRANULARITY)
}

/// Expands preferred times of day into start-time candidates for a date.
pub struct AvailabilitySlotGenerator {
    preferred: PreferredTimes,
    weekend_study: bool,
    granularity: u32,
}

impl AvailabilitySlotGenerator {
    pub fn new(preferred: PreferredTimes, preference: &StudyPreference) -> Self {
        Self {
            preferred,
            weekend_study: preference.weekend_study,
            granularity: slot_granularity(
                preference.preferred_session_length,
                preference.break_duration,
            ),
        }
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    /// Sorted, deduplicated candidate starts for `date`.
    pub fn candidates(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
        if is_weekend && !self.weekend_study {
            return Vec::new();
        }

        let mut starts: Vec<NaiveDateTime> = self
            .preferred
            .enabled()
            .flat_map(|part| part.hours())
            .flat_map(|hour| {
                (0..60)
                    .step_by(self.granularity as usize)
                    .filter_map(move |minute| date.and_hms_opt(hour, minute, 0))
            })
            .collect();

        starts.sort();
        starts.dedup();
        starts
    }
}
