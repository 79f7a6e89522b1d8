//! Multi-day schedule generation for one user.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::allocation::allocate_hours;
use super::constraints::{BlockedInterval, ConstraintFilter, SoftConstraintPolicy};
use super::daily::DailyScheduleBuilder;
use super::ledger::RunLedger;
use super::slots::AvailabilitySlotGenerator;
use super::weights::WeightCalculator;
use super::{ScheduleWarning, SessionDescriptor};
use crate::error::ScheduleError;
use crate::schedule::{
    ClassBlock, SessionStatus, StudyPreference, StudySession, Subject, SubjectId, Task,
    UserConstraint, UserProfile,
};
use crate::timezone::UserClock;

/// Subjects unstudied for this many days are visited first.
const STALE_AFTER_DAYS: u32 = 2;

/// Everything the generator reads for one user.
#[derive(Debug, Clone)]
pub struct PlanningInput {
    pub user: UserProfile,
    pub preference: StudyPreference,
    pub subjects: Vec<Subject>,
    pub tasks: Vec<Task>,
    pub constraints: Vec<UserConstraint>,
    pub class_blocks: Vec<ClassBlock>,
    /// Sessions around the range. Those a regeneration keeps block their time.
    pub existing_sessions: Vec<StudySession>,
}

/// Generation switches read from config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Cap each subject's weekly hours at its `workload_hours`.
    pub cap_to_workload: bool,
    pub soft_constraints: SoftConstraintPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedSchedule {
    pub sessions: Vec<SessionDescriptor>,
    pub warnings: Vec<ScheduleWarning>,
}

/// Days the weekly budget is spread over.
pub fn effective_days(range_days: u32, days_per_week: u32) -> u32 {
    let days = if range_days >= 7 {
        days_per_week
    } else {
        days_per_week.min(range_days)
    };
    days.max(1)
}

/// Produces session descriptors for a date range.
pub struct ScheduleGenerator {
    input: PlanningInput,
    options: GenerationOptions,
    clock: UserClock,
}

impl ScheduleGenerator {
    pub fn new(input: PlanningInput, options: GenerationOptions) -> Self {
        let clock = UserClock::parse(&input.user.timezone);
        Self {
            input,
            options,
            clock,
        }
    }

    pub fn clock(&self) -> UserClock {
        self.clock
    }

    fn session_length(&self) -> u32 {
        self.input.preference.preferred_session_length.max(1)
    }

    /// Weekly hours per subject.
    pub fn weekly_allocation(
        &self,
        today: NaiveDate,
    ) -> Result<BTreeMap<SubjectId, u32>, ScheduleError> {
        let weights = WeightCalculator::new(today, self.clock)
            .weights(&self.input.subjects, &self.input.tasks);
        let caps: Option<BTreeMap<SubjectId, f64>> = self.options.cap_to_workload.then(|| {
            self.input
                .subjects
                .iter()
                .filter_map(|s| Some((s.id, f64::from(s.workload_hours?))))
                .collect()
        });
        allocate_hours(&weights, self.input.user.weekly_hours, caps.as_ref())
    }

    /// Existing sessions a regeneration of `start..=end` keeps.
    ///
    /// Unlocked planned or missed sessions starting inside the range are
    /// replaced; everything else that is not canceled stays and blocks,
    /// including sessions just outside the range that a late slot could reach.
    fn blocked_intervals(&self, start: NaiveDate, end: NaiveDate) -> Vec<BlockedInterval> {
        let (range_start, range_end) = self.clock.range_utc(start, end);
        let replaced = |s: &StudySession| {
            !s.locked
                && matches!(s.status, SessionStatus::Planned | SessionStatus::Missed)
                && s.start_time >= range_start
                && s.start_time < range_end
        };
        self.input
            .existing_sessions
            .iter()
            .filter(|s| s.status != SessionStatus::Canceled)
            .filter(|s| !replaced(s))
            .map(|s| {
                BlockedInterval::new(self.clock.to_local(s.start_time), self.clock.to_local(s.end_time))
            })
            .collect()
    }

    /// Generate sessions for local dates `start..=end`.
    ///
    /// Candidates before `now` are never used.
    pub fn generate(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<GeneratedSchedule, ScheduleError> {
        if end < start {
            return Err(ScheduleError::EmptyRange { start, end });
        }
        let range_days = (end - start).num_days() as u32 + 1;
        let today = self.clock.today(now);
        let local_now = self.clock.to_local(now);

        let weekly = self.weekly_allocation(today)?;
        let eff_days = effective_days(range_days, self.input.preference.days_per_week);
        let quota: BTreeMap<SubjectId, f64> = weekly
            .iter()
            .map(|(id, hours)| (*id, (f64::from(*hours) / f64::from(eff_days)).ceil()))
            .collect();

        let slots = AvailabilitySlotGenerator::new(self.input.user.preferred_times, &self.input.preference);
        let granularity = slots.granularity();
        let filter = ConstraintFilter::new(
            &self.input.constraints,
            &self.input.class_blocks,
            self.blocked_intervals(start, end),
            granularity,
            self.options.soft_constraints,
        );

        let mut ledger = RunLedger::new(granularity);
        let mut allocated: BTreeMap<SubjectId, f64> = weekly.keys().map(|id| (*id, 0.0)).collect();
        let mut days_since: BTreeMap<SubjectId, u32> = weekly.keys().map(|id| (*id, 0)).collect();
        let mut schedule = GeneratedSchedule::default();

        for date in start.iter_days().take(range_days as usize) {
            for days in days_since.values_mut() {
                *days += 1;
            }

            let remaining_weekly = |id: &SubjectId| {
                (f64::from(weekly.get(id).copied().unwrap_or(0)) - allocated.get(id).copied().unwrap_or(0.0))
                    .max(0.0)
            };

            let mut today_allocation: BTreeMap<SubjectId, f64> = weekly
                .keys()
                .map(|id| (*id, quota[id].min(remaining_weekly(id))))
                .collect();

            for (id, required) in self.urgent_required_hours(date, &ledger) {
                if let Some(hours) = today_allocation.get_mut(&id) {
                    let boosted = required.min(remaining_weekly(&id));
                    if boosted > *hours {
                        *hours = boosted;
                    }
                }
            }

            let order = self.visit_order(&days_since, &weekly, &allocated);
            let candidates = filter.filter(&slots.candidates(date), granularity);
            let plan = DailyScheduleBuilder::new(
                date,
                &self.input.subjects,
                &self.input.tasks,
                &self.input.preference,
                &filter,
                self.clock,
                granularity,
            )
            .not_before(Some(local_now))
            .build(&candidates, &today_allocation, &order, &mut ledger);

            let mut studied = BTreeSet::new();
            for session in plan.sessions {
                *allocated.entry(session.subject_id).or_insert(0.0) += f64::from(session.minutes()) / 60.0;
                studied.insert(session.subject_id);
                schedule.sessions.push(SessionDescriptor {
                    subject_id: session.subject_id,
                    task_id: session.task_id,
                    start_time: self.clock.to_utc(session.start),
                    end_time: self.clock.to_utc(session.end),
                    session_type: session.session_type,
                });
            }
            for id in studied {
                days_since.insert(id, 0);
            }
            schedule.warnings.extend(plan.warnings);
        }

        for warning in &schedule.warnings {
            tracing::warn!(user = self.input.user.id, "{}", warning.message());
        }
        tracing::info!(
            user = self.input.user.id,
            %start,
            %end,
            sessions = schedule.sessions.len(),
            warnings = schedule.warnings.len(),
            "generated schedule"
        );
        Ok(schedule)
    }

    /// Hours needed for work due on or before `date`, rounded to whole
    /// sessions, per subject.
    fn urgent_required_hours(&self, date: NaiveDate, ledger: &RunLedger) -> BTreeMap<SubjectId, f64> {
        let length = self.session_length();
        let mut minutes: BTreeMap<SubjectId, u32> = BTreeMap::new();
        for task in self.input.tasks.iter().filter(|t| !t.completed) {
            let Some(deadline) = task.deadline else {
                continue;
            };
            if self.clock.to_local(deadline).date() > date {
                continue;
            }
            let remaining = task.estimate_or(length).saturating_sub(ledger.task_minutes(task.id));
            *minutes.entry(task.subject_id).or_insert(0) += remaining;
        }

        minutes
            .into_iter()
            .filter(|(_, m)| *m > 0)
            .map(|(id, m)| {
                let sessions = m.div_ceil(length);
                (id, f64::from(sessions * length / 60))
            })
            .collect()
    }

    /// Stale subjects first (longest gap first), then priority, exam date and id.
    fn visit_order(
        &self,
        days_since: &BTreeMap<SubjectId, u32>,
        weekly: &BTreeMap<SubjectId, u32>,
        allocated: &BTreeMap<SubjectId, f64>,
    ) -> Vec<SubjectId> {
        let stale_days = |s: &Subject| {
            let days = days_since.get(&s.id).copied().unwrap_or(0);
            let left = f64::from(weekly.get(&s.id).copied().unwrap_or(0))
                - allocated.get(&s.id).copied().unwrap_or(0.0);
            (days >= STALE_AFTER_DAYS && left > 0.0).then_some(days)
        };

        let mut subjects: Vec<&Subject> = self.input.subjects.iter().collect();
        subjects.sort_by(|a, b| match (stale_days(a), stale_days(b)) {
            (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b
                .priority
                .cmp(&a.priority)
                .then_with(|| match (a.exam_date, b.exam_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .then_with(|| a.id.cmp(&b.id)),
        });
        subjects.into_iter().map(|s| s.id).collect()
    }

    /// Advisory check that work due by the day after `start` fits the budget.
    pub fn check_urgent_task_coverage(&self, start: NaiveDate, end: NaiveDate) -> Vec<ScheduleWarning> {
        let Some(horizon) = start.succ_opt() else {
            return Vec::new();
        };
        let length = self.session_length();
        let urgent_minutes: u32 = self
            .input
            .tasks
            .iter()
            .filter(|t| !t.completed)
            .filter(|t| t.deadline.is_some_and(|d| self.clock.to_local(d).date() <= horizon))
            .map(|t| t.estimate_or(length))
            .sum();

        let range_days = ((end - start).num_days() + 1).max(1) as u32;
        let eff_days = effective_days(range_days, self.input.preference.days_per_week);
        let available_minutes =
            (2.0 * f64::from(self.input.user.weekly_hours) / f64::from(eff_days) * 60.0).floor() as u32;

        if urgent_minutes <= available_minutes {
            return Vec::new();
        }
        vec![ScheduleWarning::InsufficientHours {
            urgent_minutes,
            available_minutes,
            recommended_daily_hours: urgent_minutes.div_ceil(120),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{PreferredTimes, SessionType};
    use chrono::{Duration, TimeZone, Timelike};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn early_monday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap()
    }

    fn user(weekly_hours: u32) -> UserProfile {
        UserProfile {
            weekly_hours,
            ..UserProfile::new(1, "Ada")
        }
    }

    fn input(subjects: Vec<Subject>, tasks: Vec<Task>) -> PlanningInput {
        PlanningInput {
            user: user(10),
            preference: StudyPreference::default(),
            subjects,
            tasks,
            constraints: Vec::new(),
            class_blocks: Vec::new(),
            existing_sessions: Vec::new(),
        }
    }

    fn assert_disjoint(sessions: &[SessionDescriptor]) {
        let mut sorted = sessions.to_vec();
        sorted.sort_by_key(|s| s.start_time);
        for pair in sorted.windows(2) {
            assert!(pair[0].end_time <= pair[1].start_time, "{:?} / {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn effective_days_examples() {
        assert_eq!(effective_days(7, 5), 5);
        assert_eq!(effective_days(14, 5), 5);
        assert_eq!(effective_days(2, 5), 2);
        assert_eq!(effective_days(3, 0), 1);
    }

    #[test]
    fn urgent_subject_comes_first() {
        let subjects = vec![
            Subject::new(1, 1, "Capstone", 2, 3).unwrap(),
            Subject::new(2, 1, "History", 5, 3).unwrap(),
        ];
        let tasks = vec![
            Task::new(1, 1, 1, "Urgent project")
                .with_deadline(Utc.with_ymd_and_hms(2025, 3, 10, 23, 0, 0).unwrap())
                .with_estimate(120)
                .with_priority(5),
            Task::new(2, 2, 1, "Reading")
                .with_deadline(Utc.with_ymd_and_hms(2025, 3, 13, 12, 0, 0).unwrap())
                .with_estimate(60)
                .with_priority(2),
        ];
        let generator = ScheduleGenerator::new(input(subjects, tasks), GenerationOptions::default());
        let schedule = generator
            .generate(monday(), monday() + Duration::days(1), early_monday())
            .unwrap();

        let first = &schedule.sessions[0];
        assert_eq!(first.subject_id, 1);
        assert_eq!(first.task_id, Some(1));
        assert_eq!(first.session_type, SessionType::Assignment);
        assert_disjoint(&schedule.sessions);
    }

    #[test]
    fn generation_is_deterministic() {
        let subjects = vec![
            Subject::new(1, 1, "Math", 4, 4).unwrap(),
            Subject::new(2, 1, "Art", 2, 1).unwrap(),
            Subject::new(3, 1, "Biology", 3, 3)
                .unwrap()
                .with_exam_date(monday() + Duration::days(4)),
        ];
        let generator = ScheduleGenerator::new(input(subjects, Vec::new()), GenerationOptions::default());
        let a = generator.generate(monday(), monday() + Duration::days(6), early_monday()).unwrap();
        let b = generator.generate(monday(), monday() + Duration::days(6), early_monday()).unwrap();
        assert_eq!(a.sessions, b.sessions);
        assert!(!a.sessions.is_empty());
        assert_disjoint(&a.sessions);
    }

    #[test]
    fn kept_sessions_block_their_time() {
        let subjects = vec![Subject::new(1, 1, "Math", 3, 3).unwrap()];
        let mut planning = input(subjects, Vec::new());
        let locked_start = Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap();
        let mut locked =
            StudySession::planned(1, 1, locked_start, locked_start + Duration::hours(5)).unwrap();
        locked.locked = true;
        planning.existing_sessions = vec![locked.clone()];

        let schedule = ScheduleGenerator::new(planning, GenerationOptions::default())
            .generate(monday(), monday(), early_monday())
            .unwrap();
        assert!(schedule.sessions.iter().all(|s| !locked.overlaps(s.start_time, s.end_time)));
        assert!(schedule
            .warnings
            .iter()
            .any(|w| matches!(w, ScheduleWarning::NoAvailableSlots { .. })));
    }

    #[test]
    fn task_minutes_are_never_planned_twice() {
        let subjects = vec![
            Subject::new(1, 1, "Math", 4, 3).unwrap(),
            Subject::new(2, 1, "History", 3, 3).unwrap(),
        ];
        let tasks = vec![
            Task::new(1, 1, 1, "Problem set").with_estimate(120),
            Task::new(2, 2, 1, "Essay")
                .with_deadline(Utc.with_ymd_and_hms(2025, 3, 13, 12, 0, 0).unwrap())
                .with_estimate(90),
            Task::new(3, 2, 1, "Reading").with_estimate(45),
        ];
        let estimates: BTreeMap<i64, i64> = tasks
            .iter()
            .map(|t| (t.id, i64::from(t.estimated_minutes.unwrap())))
            .collect();

        let schedule = ScheduleGenerator::new(input(subjects, tasks), GenerationOptions::default())
            .generate(monday(), monday() + Duration::days(6), early_monday())
            .unwrap();

        let mut linked: BTreeMap<i64, i64> = BTreeMap::new();
        for s in &schedule.sessions {
            if let Some(task_id) = s.task_id {
                *linked.entry(task_id).or_insert(0) += s.duration_minutes();
            }
        }
        assert!(!linked.is_empty());
        for (task_id, minutes) in &linked {
            assert!(
                *minutes <= estimates[task_id],
                "task {task_id} planned {minutes} of {}",
                estimates[task_id]
            );
        }
        assert_disjoint(&schedule.sessions);
    }

    #[test]
    fn nothing_before_now() {
        let subjects = vec![Subject::new(1, 1, "Math", 3, 3).unwrap()];
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 19, 10, 0).unwrap();
        let schedule = ScheduleGenerator::new(input(subjects, Vec::new()), GenerationOptions::default())
            .generate(monday(), monday(), now)
            .unwrap();
        assert!(schedule.sessions.iter().all(|s| s.start_time >= now));
        assert_eq!(schedule.sessions[0].start_time.hour(), 19);
        assert_eq!(schedule.sessions[0].start_time.minute(), 15);
    }

    #[test]
    fn local_times_follow_user_timezone() {
        let mut planning = input(vec![Subject::new(1, 1, "Math", 3, 3).unwrap()], Vec::new());
        planning.user.timezone = "Asia/Tokyo".to_string();
        planning.user.preferred_times = PreferredTimes::default();

        let generator = ScheduleGenerator::new(planning, GenerationOptions::default());
        let schedule = generator
            .generate(monday(), monday(), Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap())
            .unwrap();
        // Evening in Tokyo is morning UTC
        let local = generator.clock().to_local(schedule.sessions[0].start_time);
        assert_eq!(local.hour(), 17);
        assert_eq!(schedule.sessions[0].start_time.hour(), 8);
    }

    #[test]
    fn workload_caps_limit_weekly_hours() {
        let subjects = vec![
            Subject::new(1, 1, "Math", 5, 5).unwrap().with_workload(1),
            Subject::new(2, 1, "Art", 1, 1).unwrap(),
        ];
        let options = GenerationOptions {
            cap_to_workload: true,
            ..GenerationOptions::default()
        };
        let weekly = ScheduleGenerator::new(input(subjects, Vec::new()), options)
            .weekly_allocation(monday())
            .unwrap();
        assert_eq!(weekly[&1], 1);
        assert_eq!(weekly[&2], 9);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let generator = ScheduleGenerator::new(input(Vec::new(), Vec::new()), GenerationOptions::default());
        let err = generator
            .generate(monday(), monday() - Duration::days(1), early_monday())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::EmptyRange { .. }));
    }

    #[test]
    fn coverage_warns_when_due_work_exceeds_budget() {
        let mut planning = input(
            vec![Subject::new(1, 1, "Math", 3, 3).unwrap()],
            vec![Task::new(1, 1, 1, "Exam prep")
                .with_deadline(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap())
                .with_estimate(240)
                .with_priority(5)],
        );
        planning.user.weekly_hours = 3;
        let generator = ScheduleGenerator::new(planning, GenerationOptions::default());

        let warnings = generator.check_urgent_task_coverage(monday(), monday() + Duration::days(1));
        assert_eq!(
            warnings,
            vec![ScheduleWarning::InsufficientHours {
                urgent_minutes: 240,
                available_minutes: 180,
                recommended_daily_hours: 2,
            }]
        );
    }

    #[test]
    fn coverage_is_quiet_with_enough_hours() {
        let generator = ScheduleGenerator::new(
            input(
                vec![Subject::new(1, 1, "Math", 3, 3).unwrap()],
                vec![Task::new(1, 1, 1, "Quiz")
                    .with_deadline(Utc.with_ymd_and_hms(2025, 3, 11, 12, 0, 0).unwrap())
                    .with_estimate(60)],
            ),
            GenerationOptions::default(),
        );
        assert!(generator
            .check_urgent_task_coverage(monday(), monday() + Duration::days(6))
            .is_empty());
    }
}
