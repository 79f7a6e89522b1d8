//! Mutable state shared by every day of one generation run.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::schedule::{SubjectId, TaskId};

/// Bookings and counters for a single generation run.
///
/// Slots are keyed by absolute local start time so sessions crossing
/// midnight stay booked on the next day as well.
#[derive(Debug, Clone)]
pub struct RunLedger {
    granularity: i64,
    booked: BTreeSet<NaiveDateTime>,
    placed: BTreeMap<SubjectId, Vec<(NaiveDateTime, NaiveDateTime)>>,
    task_minutes: BTreeMap<TaskId, u32>,
    subject_minutes: BTreeMap<SubjectId, u32>,
    hour_usage: BTreeMap<(SubjectId, u32), u32>,
}

impl RunLedger {
    pub fn new(granularity: u32) -> Self {
        Self {
            granularity: i64::from(granularity.max(1)),
            booked: BTreeSet::new(),
            placed: BTreeMap::new(),
            task_minutes: BTreeMap::new(),
            subject_minutes: BTreeMap::new(),
            hour_usage: BTreeMap::new(),
        }
    }

    fn grid(&self, start: NaiveDateTime, minutes: u32) -> impl Iterator<Item = NaiveDateTime> {
        let end = start + Duration::minutes(i64::from(minutes));
        let step = Duration::minutes(self.granularity);
        std::iter::successors(Some(start), move |t| Some(*t + step)).take_while(move |t| *t < end)
    }

    /// True when no slot of `[start, start + minutes)` is booked.
    pub fn is_free(&self, start: NaiveDateTime, minutes: u32) -> bool {
        self.grid(start, minutes).all(|t| !self.booked.contains(&t))
    }

    /// Whether adding `[start, start + minutes)` keeps the subject's unbroken
    /// run at or under `max_minutes`. Sessions separated by at most
    /// `break_minutes` count as one run.
    pub fn within_consecutive_limit(
        &self,
        subject_id: SubjectId,
        start: NaiveDateTime,
        minutes: u32,
        break_minutes: u32,
        max_minutes: u32,
    ) -> bool {
        let end = start + Duration::minutes(i64::from(minutes));
        let mut intervals: Vec<(NaiveDateTime, NaiveDateTime)> =
            self.placed.get(&subject_id).cloned().unwrap_or_default();
        intervals.push((start, end));
        intervals.sort();

        let max_gap = Duration::minutes(i64::from(break_minutes));
        let mut run_minutes = 0i64;
        let mut run_end: Option<NaiveDateTime> = None;
        let mut contains_candidate = false;
        for (s, e) in intervals {
            let chained = run_end.is_some_and(|prev| s - prev <= max_gap);
            if !chained {
                if contains_candidate {
                    break;
                }
                run_minutes = 0;
            }
            run_minutes += (e - s).num_minutes();
            run_end = Some(run_end.map_or(e, |prev| prev.max(e)));
            if s == start && e == end {
                contains_candidate = true;
            }
        }
        run_minutes <= i64::from(max_minutes)
    }

    /// Record a placed session and block `[start, end + break)`.
    pub fn book(
        &mut self,
        subject_id: SubjectId,
        start: NaiveDateTime,
        minutes: u32,
        break_minutes: u32,
    ) {
        let slots: Vec<NaiveDateTime> = self.grid(start, minutes + break_minutes).collect();
        self.booked.extend(slots);
        self.placed
            .entry(subject_id)
            .or_default()
            .push((start, start + Duration::minutes(i64::from(minutes))));
        *self.subject_minutes.entry(subject_id).or_insert(0) += minutes;
    }

    pub fn task_minutes(&self, task_id: TaskId) -> u32 {
        self.task_minutes.get(&task_id).copied().unwrap_or(0)
    }

    pub fn add_task_minutes(&mut self, task_id: TaskId, minutes: u32) {
        *self.task_minutes.entry(task_id).or_insert(0) += minutes;
    }

    /// Minutes placed for a subject over the whole run.
    pub fn subject_minutes(&self, subject_id: SubjectId) -> u32 {
        self.subject_minutes.get(&subject_id).copied().unwrap_or(0)
    }

    pub fn hour_count(&self, subject_id: SubjectId, start: NaiveDateTime) -> u32 {
        self.hour_usage
            .get(&(subject_id, start.hour()))
            .copied()
            .unwrap_or(0)
    }

    pub fn record_hour(&mut self, subject_id: SubjectId, start: NaiveDateTime) {
        *self.hour_usage.entry((subject_id, start.hour())).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn booking_covers_session_and_break() {
        let mut ledger = RunLedger::new(15);
        ledger.book(1, at(10, 17, 0), 60, 15);

        assert!(!ledger.is_free(at(10, 17, 0), 15));
        assert!(!ledger.is_free(at(10, 18, 0), 15));
        assert!(ledger.is_free(at(10, 18, 15), 60));
        assert!(ledger.is_free(at(10, 16, 0), 60));
        assert!(!ledger.is_free(at(10, 16, 15), 60));
        assert_eq!(ledger.subject_minutes(1), 60);
    }

    #[test]
    fn bookings_cross_midnight() {
        let mut ledger = RunLedger::new(30);
        ledger.book(1, at(10, 23, 30), 60, 0);
        assert!(!ledger.is_free(at(11, 0, 0), 30));
        assert!(ledger.is_free(at(11, 0, 30), 30));
    }

    #[test]
    fn consecutive_runs_chain_across_short_breaks() {
        let mut ledger = RunLedger::new(15);
        ledger.book(1, at(10, 17, 0), 60, 15);
        ledger.book(1, at(10, 18, 15), 60, 15);

        // A third back-to-back hour would make a three hour run
        assert!(!ledger.within_consecutive_limit(1, at(10, 19, 30), 60, 15, 120));
        // After a longer pause the run restarts
        assert!(ledger.within_consecutive_limit(1, at(10, 20, 0), 60, 15, 120));
        // Other subjects are unaffected
        assert!(ledger.within_consecutive_limit(2, at(10, 19, 30), 60, 15, 120));
    }

    #[test]
    fn counters_accumulate() {
        let mut ledger = RunLedger::new(15);
        ledger.add_task_minutes(7, 60);
        ledger.add_task_minutes(7, 30);
        assert_eq!(ledger.task_minutes(7), 90);
        assert_eq!(ledger.task_minutes(8), 0);

        ledger.record_hour(1, at(10, 18, 0));
        ledger.record_hour(1, at(11, 18, 30));
        assert_eq!(ledger.hour_count(1, at(12, 18, 45)), 2);
        assert_eq!(ledger.hour_count(1, at(12, 19, 0)), 0);
    }
}
