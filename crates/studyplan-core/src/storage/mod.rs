mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, MakeupConfig, SchedulerConfig};
pub use database::StudyDb;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{ConfigError, Result};
use crate::schedule::{SessionId, SessionStatus, StudySession, SubjectId, UserId};
use crate::scheduler::{PlanningInput, SessionDescriptor};
use crate::tracking::MakeupEntry;

/// Returns the data directory.
///
/// `STUDYPLAN_HOME` wins when set. Otherwise `~/.config/studyplan[-dev]/`
/// based on `STUDYPLAN_ENV` (set `STUDYPLAN_ENV=dev` for a development
/// directory).
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STUDYPLAN_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir().ok_or(ConfigError::NoDataDir)?.join(".config");
            let env = std::env::var("STUDYPLAN_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("studyplan-dev")
            } else {
                base_dir.join("studyplan")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::SaveFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

/// Persistence seam used by the planner jobs.
///
/// Every method is scoped to one user except expiry cleanup, which is a
/// global sweep.
pub trait SessionStore {
    /// Sessions starting in `[start, end)`, ordered by start time.
    fn sessions_in_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StudySession>>;

    fn sessions_with_status(&self, user_id: UserId, status: SessionStatus)
        -> Result<Vec<StudySession>>;

    /// Apply a lifecycle transition; illegal moves are rejected.
    fn set_status(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<()>;

    /// Atomically drop unlocked planned/missed sessions in `[start, end)` and
    /// insert `sessions`. Returns (removed count, inserted ids).
    fn replace_sessions(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sessions: &[SessionDescriptor],
    ) -> Result<(usize, Vec<SessionId>)>;

    fn mark_makeup_queued(&self, session_ids: &[SessionId]) -> Result<()>;

    /// Add minutes to the subject's live entry or open a new one.
    fn upsert_makeup(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        minutes: u32,
        today: NaiveDate,
        expires_at: NaiveDate,
    ) -> Result<MakeupEntry>;

    /// `upsert_makeup` for every subject plus `mark_makeup_queued`, in one
    /// transaction.
    fn record_makeup(
        &self,
        user_id: UserId,
        minutes: &BTreeMap<SubjectId, u32>,
        session_ids: &[SessionId],
        today: NaiveDate,
        expires_at: NaiveDate,
    ) -> Result<Vec<MakeupEntry>>;

    /// Delete entries with `expires_at < today`.
    fn delete_expired_makeup(&self, today: NaiveDate) -> Result<usize>;

    /// Everything generation needs; `existing_sessions` covers `[start, end)`.
    fn load_planning_input(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PlanningInput>;
}
