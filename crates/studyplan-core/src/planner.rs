//! Store-backed planning operations: schedule generation and the
//! missed-session jobs.
//!
//! Everything here goes through [`SessionStore`], so the same code runs
//! against SQLite in the CLI and an in-memory database in tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ScheduleError};
use crate::schedule::{SessionId, SessionStatus, SubjectId, UserId};
use crate::scheduler::{GeneratedSchedule, GenerationOptions, ScheduleGenerator, ScheduleWarning};
use crate::storage::SessionStore;
use crate::tracking::{MakeupQueue, MissedSessionTracker};

/// Outcome of a persisted regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationReport {
    pub schedule: GeneratedSchedule,
    pub inserted: Vec<SessionId>,
    /// Locked or completed sessions left untouched in the range.
    pub preserved: usize,
    pub removed: usize,
}

/// Build a generator for `start..=end`.
///
/// The user's timezone is only known after loading, so existing sessions are
/// loaded for a window padded by a day on each side.
fn prepare<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
    options: GenerationOptions,
) -> Result<ScheduleGenerator> {
    if end < start {
        return Err(ScheduleError::EmptyRange { start, end }.into());
    }
    let padded_start = start.and_time(Default::default()).and_utc() - Duration::days(1);
    let padded_end = end.and_time(Default::default()).and_utc() + Duration::days(2);
    let input = store.load_planning_input(user_id, padded_start, padded_end)?;
    Ok(ScheduleGenerator::new(input, options))
}

fn generate_with_coverage(
    generator: &ScheduleGenerator,
    start: NaiveDate,
    end: NaiveDate,
    now: DateTime<Utc>,
) -> Result<GeneratedSchedule> {
    let mut schedule = generator.generate(start, end, now)?;
    schedule
        .warnings
        .extend(generator.check_urgent_task_coverage(start, end));
    Ok(schedule)
}

/// Generate without writing anything.
pub fn plan_schedule<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
    options: GenerationOptions,
    now: DateTime<Utc>,
) -> Result<GeneratedSchedule> {
    let generator = prepare(store, user_id, start, end, options)?;
    generate_with_coverage(&generator, start, end, now)
}

/// Only the advisory check that work due soon fits the weekly budget.
pub fn check_coverage<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ScheduleWarning>> {
    let generator = prepare(store, user_id, start, end, GenerationOptions::default())?;
    Ok(generator.check_urgent_task_coverage(start, end))
}

/// Regenerate `start..=end` and persist the result.
///
/// Locked and completed sessions are kept and block their time. Unlocked
/// planned or missed sessions in the range are replaced in one transaction.
pub fn regenerate_schedule<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
    options: GenerationOptions,
    now: DateTime<Utc>,
) -> Result<RegenerationReport> {
    let generator = prepare(store, user_id, start, end, options)?;
    let schedule = generate_with_coverage(&generator, start, end, now)?;

    let (range_start, range_end) = generator.clock().range_utc(start, end);
    let preserved = store
        .sessions_in_range(user_id, range_start, range_end)?
        .iter()
        .filter(|s| s.locked || s.status == SessionStatus::Completed)
        .count();
    let (removed, inserted) =
        store.replace_sessions(user_id, range_start, range_end, &schedule.sessions)?;

    info!(
        user = user_id,
        %start,
        %end,
        inserted = inserted.len(),
        removed,
        preserved,
        warnings = schedule.warnings.len(),
        "schedule regenerated"
    );
    Ok(RegenerationReport {
        schedule,
        inserted,
        preserved,
        removed,
    })
}

/// Move overdue planned sessions to `Missed`. Returns how many moved.
pub fn mark_missed<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    grace_minutes: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let planned = store.sessions_with_status(user_id, SessionStatus::Planned)?;
    let tracker = MissedSessionTracker::new(grace_minutes);
    let overdue = tracker.overdue(&planned, now);
    for session in &overdue {
        store.set_status(user_id, session.id, SessionStatus::Missed)?;
    }
    info!(user = user_id, marked = overdue.len(), grace_minutes, "marked missed sessions");
    Ok(overdue.len())
}

/// Add minutes of not-yet-queued missed sessions to the makeup queue.
///
/// Returns the minutes added per subject; empty when nothing was pending.
pub fn queue_makeup<S: SessionStore + ?Sized>(
    store: &S,
    user_id: UserId,
    today: NaiveDate,
    expiry_days: u32,
) -> Result<BTreeMap<SubjectId, u32>> {
    let missed = store.sessions_with_status(user_id, SessionStatus::Missed)?;
    let minutes = MakeupQueue::aggregate(&missed);
    if minutes.is_empty() {
        info!(user = user_id, "no missed sessions to queue");
        return Ok(minutes);
    }

    let session_ids: Vec<SessionId> = missed
        .iter()
        .filter(|s| !s.makeup_queued)
        .map(|s| s.id)
        .collect();
    let expires_at = MakeupQueue::expiry(today, expiry_days);
    store.record_makeup(user_id, &minutes, &session_ids, today, expires_at)?;

    info!(
        user = user_id,
        subjects = minutes.len(),
        sessions = session_ids.len(),
        %expires_at,
        "queued makeup minutes"
    );
    Ok(minutes)
}

/// Delete makeup entries that expired before `today`, for all users.
pub fn cleanup_expired_makeup<S: SessionStore + ?Sized>(store: &S, today: NaiveDate) -> Result<usize> {
    let removed = store.delete_expired_makeup(today)?;
    info!(removed, %today, "cleaned up expired makeup entries");
    Ok(removed)
}
