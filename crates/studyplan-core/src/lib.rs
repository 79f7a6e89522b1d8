//! # studyplan Core Library
//!
//! This library provides the core logic for the studyplan weekly study
//! planner. Every operation is available through the `studyplan` CLI binary,
//! which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Schedule model**: subjects, tasks, sessions, preferences and recurring
//!   busy times, all owned by one user
//! - **Scheduler**: weighted hour allocation and day-by-day session placement
//!   on the user's wall clock
//! - **Tracking**: missed-session detection and the makeup queue
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`ScheduleGenerator`]: Produces session descriptors for a date range
//! - [`StudyDb`]: Persistence behind the [`SessionStore`] seam
//! - [`planner`]: Regeneration and the missed/makeup jobs
//! - [`Config`]: Application configuration management

pub mod error;
pub mod planner;
pub mod schedule;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod timezone;
pub mod tracking;

pub use error::{ConfigError, CoreError, DatabaseError, ScheduleError, ValidationError};
pub use planner::RegenerationReport;
pub use schedule::{
    ClassBlock, PreferredTimes, SessionRef, SessionStatus, SessionType, StudyPreference,
    StudySession, Subject, Task, TimeOfDay, UserConstraint, UserProfile,
};
pub use scheduler::{
    GeneratedSchedule, GenerationOptions, PlanningInput, ScheduleGenerator, ScheduleWarning,
    SessionDescriptor, SoftConstraintPolicy,
};
pub use stats::StudyStatistics;
pub use storage::{Config, SessionStore, StudyDb};
pub use timezone::UserClock;
pub use tracking::{MakeupEntry, MakeupQueue, MissedSessionTracker};
