//! Weekly study schedule generation.
//!
//! The pipeline, per run:
//! - Weights subjects and apportions the user's weekly hours (`weights`, `allocation`)
//! - Expands preferred times of day into candidate starts (`slots`)
//! - Drops candidates that hit busy times, classes or kept sessions (`constraints`)
//! - Places urgent task chunks, then regular sessions, day by day (`daily`, `generator`)
//!
//! Everything inside the pipeline works on the user's wall clock; the
//! generator converts results back to UTC.

mod allocation;
mod constraints;
mod daily;
mod generator;
mod ledger;
mod slots;
mod weights;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::{SessionType, SubjectId, TaskId};

pub use allocation::allocate_hours;
pub use constraints::{BlockedInterval, ConstraintFilter, SoftConstraintPolicy};
pub use daily::{DailyScheduleBuilder, DayPlan, LocalSession};
pub use generator::{
    effective_days, GeneratedSchedule, GenerationOptions, PlanningInput, ScheduleGenerator,
};
pub use ledger::RunLedger;
pub use slots::{slot_granularity, AvailabilitySlotGenerator, SUBJECT_TRANSITION_BUFFER};
pub use weights::{deadline_urgency, exam_bonus, WeightCalculator};

/// A session the generator wants created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub subject_id: SubjectId,
    pub task_id: Option<TaskId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub session_type: SessionType,
}

impl SessionDescriptor {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

/// A soft failure reported alongside a generated schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleWarning {
    /// A subject got less than half of the time it needed on a day.
    InsufficientTime {
        subject_id: SubjectId,
        subject_name: String,
        date: NaiveDate,
        needed_hours: f64,
        scheduled_hours: f64,
    },
    /// Hours were allocated to a day that has no usable start times.
    NoAvailableSlots { date: NaiveDate },
    /// Work due in the next day exceeds what the weekly budget covers.
    InsufficientHours {
        urgent_minutes: u32,
        available_minutes: u32,
        recommended_daily_hours: u32,
    },
}

impl ScheduleWarning {
    /// Human-readable description.
    pub fn message(&self) -> String {
        match self {
            ScheduleWarning::InsufficientTime {
                subject_name,
                date,
                needed_hours,
                scheduled_hours,
                ..
            } => format!(
                "{subject_name} on {date}: scheduled {scheduled_hours:.1}h of {needed_hours:.1}h needed"
            ),
            ScheduleWarning::NoAvailableSlots { date } => {
                format!("No available study slots on {date}")
            }
            ScheduleWarning::InsufficientHours {
                urgent_minutes,
                available_minutes,
                recommended_daily_hours,
            } => format!(
                "{urgent_minutes} minutes of work are due soon but only {available_minutes} are \
                 available; consider studying {recommended_daily_hours}h per day"
            ),
        }
    }
}
