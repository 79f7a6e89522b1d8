//! Read-only study statistics
//!
//! Summaries over stored sessions: planned versus actual time, the
//! productivity rating trend, and missed sessions per subject.

mod adherence;
mod quality;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{StudySession, SubjectId};

pub use adherence::{missed_summary, planned_vs_actual, week_bounds, MissedStats, PlannedVsActual};
pub use quality::{quality_trend, QualityTrend, Trend};

/// Everything `studyplan stats` prints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyStatistics {
    pub this_week: PlannedVsActual,
    pub quality: QualityTrend,
    pub missed: BTreeMap<SubjectId, MissedStats>,
}

impl StudyStatistics {
    /// `week` is the UTC span of the current week.
    pub fn compute(
        sessions: &[StudySession],
        week: (DateTime<Utc>, DateTime<Utc>),
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            this_week: planned_vs_actual(sessions, week.0, week.1),
            quality: quality_trend(sessions, now),
            missed: missed_summary(sessions),
        }
    }
}

/// Format minutes as `2h 30m`, `2h`, `45m` or `0m`.
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    let (hours, mins) = (minutes / 60, minutes % 60);
    match (hours, mins) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
