//! Builds one day of sessions: urgent task chunks first, then the
//! subject allocation.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use super::constraints::ConstraintFilter;
use super::ledger::RunLedger;
use super::ScheduleWarning;
use crate::schedule::{SessionType, StudyPreference, Subject, SubjectId, Task, TaskId};
use crate::timezone::UserClock;

/// Chunk length for large urgent tasks.
const LARGE_TASK_CHUNK: u32 = 120;
/// Remaining minutes above which urgent tasks are split into large chunks.
const LARGE_TASK_THRESHOLD: u32 = 200;
/// Urgent chunks of one subject in a row before another subject gets a turn.
const MAX_URGENT_STREAK: u32 = 2;
/// Regular sessions per subject per round-robin pass.
const SESSIONS_PER_PASS: u32 = 2;
/// Regular sessions per (subject, hour of day) across a run.
const MAX_SESSIONS_PER_HOUR: u32 = 2;
/// Fraction of the day's need below which a shortfall is reported.
const SHORTFALL_RATIO: f64 = 0.5;
/// Exams this close turn regular sessions into review.
const REVIEW_WINDOW_DAYS: i64 = 7;

/// A placed session in the user's local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSession {
    pub subject_id: SubjectId,
    pub task_id: Option<TaskId>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub session_type: SessionType,
}

impl LocalSession {
    pub fn minutes(&self) -> u32 {
        (self.end - self.start).num_minutes().max(0) as u32
    }
}

/// Result of building a single day.
#[derive(Debug, Clone, Default)]
pub struct DayPlan {
    /// Sorted by start time.
    pub sessions: Vec<LocalSession>,
    pub warnings: Vec<ScheduleWarning>,
}

fn round_up(minutes: u32, granularity: u32) -> u32 {
    let g = granularity.max(1);
    minutes.div_ceil(g) * g
}

/// Places sessions for one local date.
pub struct DailyScheduleBuilder<'a> {
    date: NaiveDate,
    subjects: &'a [Subject],
    tasks: &'a [Task],
    preference: &'a StudyPreference,
    filter: &'a ConstraintFilter<'a>,
    clock: UserClock,
    granularity: u32,
    not_before: Option<NaiveDateTime>,
}

struct UrgentTask<'t> {
    task: &'t Task,
    remaining: u32,
    score: i64,
}

impl<'a> DailyScheduleBuilder<'a> {
    pub fn new(
        date: NaiveDate,
        subjects: &'a [Subject],
        tasks: &'a [Task],
        preference: &'a StudyPreference,
        filter: &'a ConstraintFilter<'a>,
        clock: UserClock,
        granularity: u32,
    ) -> Self {
        Self {
            date,
            subjects,
            tasks,
            preference,
            filter,
            clock,
            granularity: granularity.max(1),
            not_before: None,
        }
    }

    /// Skip candidates earlier than `instant` (used for the current day).
    pub fn not_before(mut self, instant: Option<NaiveDateTime>) -> Self {
        self.not_before = instant;
        self
    }

    fn session_length(&self) -> u32 {
        self.preference.preferred_session_length.max(1)
    }

    fn max_run_minutes(&self) -> u32 {
        self.preference.max_consecutive_hours.max(1) * 60
    }

    fn task_remaining(&self, task: &Task, ledger: &RunLedger) -> u32 {
        task.estimate_or(self.session_length())
            .saturating_sub(ledger.task_minutes(task.id))
    }

    fn local_due_date(&self, deadline: DateTime<Utc>) -> NaiveDate {
        self.clock.to_local(deadline).date()
    }

    /// Build the day. `allocation` is hours per subject; `order` is the
    /// visiting order for the regular phase.
    pub fn build(
        &self,
        candidates: &[NaiveDateTime],
        allocation: &BTreeMap<SubjectId, f64>,
        order: &[SubjectId],
        ledger: &mut RunLedger,
    ) -> DayPlan {
        let mut plan = DayPlan::default();
        let candidates: Vec<NaiveDateTime> = candidates
            .iter()
            .copied()
            .filter(|start| self.not_before.map_or(true, |nb| *start >= nb))
            .collect();

        let urgent = self.urgent_tasks(ledger);
        let needs_time = allocation.values().any(|h| *h > 0.0) || !urgent.is_empty();
        if candidates.is_empty() {
            if needs_time {
                plan.warnings.push(ScheduleWarning::NoAvailableSlots { date: self.date });
            }
            return plan;
        }

        let mut day_minutes: BTreeMap<SubjectId, u32> = BTreeMap::new();
        self.place_urgent(urgent, &candidates, ledger, &mut day_minutes, &mut plan);
        self.place_regular(&candidates, allocation, order, ledger, &mut day_minutes, &mut plan);

        for subject in order.iter().filter_map(|id| self.subject(*id)) {
            let needed_hours = allocation.get(&subject.id).copied().unwrap_or(0.0);
            if needed_hours <= 0.0 {
                continue;
            }
            let scheduled_hours = f64::from(day_minutes.get(&subject.id).copied().unwrap_or(0)) / 60.0;
            if scheduled_hours < needed_hours * SHORTFALL_RATIO {
                plan.warnings.push(ScheduleWarning::InsufficientTime {
                    subject_id: subject.id,
                    subject_name: subject.name.clone(),
                    date: self.date,
                    needed_hours,
                    scheduled_hours,
                });
            }
        }

        plan.sessions.sort_by_key(|s| (s.start, s.subject_id));
        plan
    }

    fn subject(&self, id: SubjectId) -> Option<&'a Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Incomplete tasks due today or tomorrow with time still unplanned,
    /// best first.
    fn urgent_tasks(&self, ledger: &RunLedger) -> Vec<UrgentTask<'a>> {
        let known = |task: &Task| self.subjects.iter().any(|s| s.id == task.subject_id);
        let mut urgent: Vec<UrgentTask<'a>> = self
            .tasks
            .iter()
            .filter(|t| !t.completed && known(*t))
            .filter_map(|task| {
                let days = (self.local_due_date(task.deadline?) - self.date).num_days();
                if !(0..=1).contains(&days) {
                    return None;
                }
                let remaining = self.task_remaining(task, ledger);
                (remaining > 0).then(|| UrgentTask {
                    task,
                    remaining,
                    score: 100 - 10 * days + 5 * i64::from(task.priority.unwrap_or(3)),
                })
            })
            .collect();

        urgent.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.task.deadline.cmp(&b.task.deadline))
                .then_with(|| a.task.id.cmp(&b.task.id))
        });
        urgent
    }

    fn urgent_chunk(&self, remaining: u32) -> u32 {
        let chunk = if remaining > LARGE_TASK_THRESHOLD {
            LARGE_TASK_CHUNK
        } else {
            remaining
        };
        round_up(chunk.min(self.max_run_minutes()), self.granularity)
    }

    fn place_urgent(
        &self,
        mut pending: Vec<UrgentTask<'a>>,
        candidates: &[NaiveDateTime],
        ledger: &mut RunLedger,
        day_minutes: &mut BTreeMap<SubjectId, u32>,
        plan: &mut DayPlan,
    ) {
        let mut streak: Option<(SubjectId, u32)> = None;

        while !pending.is_empty() {
            let index = match streak {
                Some((subject, count)) if count >= MAX_URGENT_STREAK => pending
                    .iter()
                    .position(|u| u.task.subject_id != subject)
                    .unwrap_or(0),
                _ => 0,
            };

            let subject_id = pending[index].task.subject_id;
            let chunk = self.urgent_chunk(pending[index].remaining);
            let Some(start) = self.find_start(candidates, ledger, subject_id, chunk, false) else {
                tracing::debug!(task = pending[index].task.id, date = %self.date, "no slot for urgent chunk");
                pending.remove(index);
                continue;
            };

            let task_id = pending[index].task.id;
            self.commit(
                plan,
                ledger,
                day_minutes,
                LocalSession {
                    subject_id,
                    task_id: Some(task_id),
                    start,
                    end: start + Duration::minutes(i64::from(chunk)),
                    session_type: SessionType::Assignment,
                },
            );
            ledger.add_task_minutes(task_id, chunk);

            streak = match streak {
                Some((s, count)) if s == subject_id => Some((s, count + 1)),
                _ => Some((subject_id, 1)),
            };

            let entry = &mut pending[index];
            entry.remaining = entry.remaining.saturating_sub(chunk);
            if entry.remaining == 0 {
                pending.remove(index);
            }
        }
    }

    fn place_regular(
        &self,
        candidates: &[NaiveDateTime],
        allocation: &BTreeMap<SubjectId, f64>,
        order: &[SubjectId],
        ledger: &mut RunLedger,
        day_minutes: &mut BTreeMap<SubjectId, u32>,
        plan: &mut DayPlan,
    ) {
        let session_length = self.session_length();
        let mut remaining: BTreeMap<SubjectId, u32> = order
            .iter()
            .filter(|id| self.subject(**id).is_some())
            .map(|id| {
                let need = (allocation.get(id).copied().unwrap_or(0.0).max(0.0) * 60.0).round() as u32;
                let done = day_minutes.get(id).copied().unwrap_or(0);
                (*id, need.saturating_sub(done))
            })
            .collect();

        loop {
            let mut placed_in_pass = false;

            for subject_id in order {
                let Some(subject) = self.subject(*subject_id) else {
                    continue;
                };
                for n in 0..SESSIONS_PER_PASS {
                    let left = remaining.get(subject_id).copied().unwrap_or(0);
                    if left == 0 || (n > 0 && left < session_length) {
                        break;
                    }
                    let linked = self.link_task(subject.id, ledger);
                    let mut block = session_length.min(round_up(left, self.granularity));
                    if let Some((_, task_left)) = linked {
                        block = block.min(round_up(task_left, self.granularity));
                    }
                    let Some(start) = self.find_start(candidates, ledger, subject.id, block, true) else {
                        remaining.insert(subject.id, 0);
                        break;
                    };

                    let task_id = linked.map(|(id, _)| id);
                    if let Some(task_id) = task_id {
                        ledger.add_task_minutes(task_id, block);
                    }
                    self.commit(
                        plan,
                        ledger,
                        day_minutes,
                        LocalSession {
                            subject_id: subject.id,
                            task_id,
                            start,
                            end: start + Duration::minutes(i64::from(block)),
                            session_type: self.regular_type(subject, task_id.is_some()),
                        },
                    );
                    remaining.insert(subject.id, left.saturating_sub(block));
                    placed_in_pass = true;
                }
            }

            if !placed_in_pass {
                break;
            }
        }
    }

    /// Earliest-deadline incomplete task of the subject that still has
    /// unplanned minutes, with those minutes.
    fn link_task(&self, subject_id: SubjectId, ledger: &RunLedger) -> Option<(TaskId, u32)> {
        self.tasks
            .iter()
            .filter(|t| t.subject_id == subject_id && !t.completed)
            .filter(|t| self.task_remaining(t, ledger) > 0)
            .min_by(|a, b| match (a.deadline, b.deadline) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.id.cmp(&b.id),
            })
            .map(|t| (t.id, self.task_remaining(t, ledger)))
    }

    fn regular_type(&self, subject: &Subject, linked: bool) -> SessionType {
        let exam_close = subject
            .exam_date
            .map(|exam| (exam - self.date).num_days())
            .is_some_and(|days| (0..=REVIEW_WINDOW_DAYS).contains(&days));
        if exam_close {
            SessionType::Review
        } else if linked {
            SessionType::Practice
        } else {
            SessionType::Learn
        }
    }

    fn find_start(
        &self,
        candidates: &[NaiveDateTime],
        ledger: &RunLedger,
        subject_id: SubjectId,
        minutes: u32,
        hour_cap: bool,
    ) -> Option<NaiveDateTime> {
        candidates.iter().copied().find(|start| {
            ledger.is_free(*start, minutes)
                && self.clock.spans_exactly(*start, minutes)
                && self.filter.permits(*start, minutes)
                && ledger.within_consecutive_limit(
                    subject_id,
                    *start,
                    minutes,
                    self.preference.break_duration,
                    self.max_run_minutes(),
                )
                && (!hour_cap || ledger.hour_count(subject_id, *start) < MAX_SESSIONS_PER_HOUR)
        })
    }

    fn commit(
        &self,
        plan: &mut DayPlan,
        ledger: &mut RunLedger,
        day_minutes: &mut BTreeMap<SubjectId, u32>,
        session: LocalSession,
    ) {
        let minutes = session.minutes();
        tracing::debug!(
            subject = session.subject_id,
            task = ?session.task_id,
            start = %session.start,
            minutes,
            kind = %session.session_type,
            "placed session"
        );
        ledger.book(session.subject_id, session.start, minutes, self.preference.break_duration);
        ledger.record_hour(session.subject_id, session.start);
        *day_minutes.entry(session.subject_id).or_insert(0) += minutes;
        plan.sessions.push(session);
    }
}
