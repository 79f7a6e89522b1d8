//! Subject weighting by priority, difficulty, exam proximity and task urgency.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::schedule::{Subject, SubjectId, Task};
use crate::timezone::UserClock;

/// Scores subjects for proportional hour allocation.
///
/// `weight = priority*2 + difficulty + exam_bonus + task_urgency_bonus`
pub struct WeightCalculator {
    today: NaiveDate,
    clock: UserClock,
}

impl WeightCalculator {
    pub fn new(today: NaiveDate, clock: UserClock) -> Self {
        Self { today, clock }
    }

    /// Weight per subject. Tasks of unknown subjects are ignored.
    pub fn weights(&self, subjects: &[Subject], tasks: &[Task]) -> BTreeMap<SubjectId, f64> {
        subjects
            .iter()
            .map(|subject| {
                let subject_tasks = tasks.iter().filter(|t| t.subject_id == subject.id);
                (subject.id, self.subject_weight(subject, subject_tasks))
            })
            .collect()
    }

    pub fn subject_weight<'a>(
        &self,
        subject: &Subject,
        tasks: impl Iterator<Item = &'a Task>,
    ) -> f64 {
        let base = f64::from(subject.priority) * 2.0 + f64::from(subject.difficulty);
        base + exam_bonus(subject.exam_date, self.today) + self.task_urgency_bonus(tasks)
    }

    /// Highest scaled urgency across the subject's incomplete tasks.
    fn task_urgency_bonus<'a>(&self, tasks: impl Iterator<Item = &'a Task>) -> f64 {
        tasks
            .filter(|t| !t.completed)
            .filter_map(|t| {
                let deadline = t.deadline?;
                let due = self.clock.to_local(deadline).date();
                let base = deadline_urgency((due - self.today).num_days());
                Some(match t.priority {
                    Some(p) => base * f64::from(p) / 3.0,
                    None => base,
                })
            })
            .fold(0.0, f64::max)
    }
}

/// Bonus for an upcoming exam. Past or same-day exams earn nothing.
pub fn exam_bonus(exam_date: Option<NaiveDate>, today: NaiveDate) -> f64 {
    let Some(exam) = exam_date else {
        return 0.0;
    };
    match (exam - today).num_days() {
        d if d <= 0 => 0.0,
        d if d <= 7 => 10.0,
        d if d <= 14 => 5.0,
        d if d <= 30 => 2.0,
        _ => 0.0,
    }
}

/// Base urgency for a task due in `days_until_due` days.
pub fn deadline_urgency(days_until_due: i64) -> f64 {
    match days_until_due {
        d if d < 0 => 100.0,
        0 => 90.0,
        1 => 50.0,
        d if d <= 3 => 25.0,
        d if d <= 7 => 10.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn calc() -> WeightCalculator {
        WeightCalculator::new(today(), UserClock::utc())
    }

    fn due_in(days: i64) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap() + chrono::Duration::days(days)
    }

    #[test]
    fn base_weight_from_priority_and_difficulty() {
        let subject = Subject::new(1, 1, "History", 3, 2).unwrap();
        let weights = calc().weights(&[subject], &[]);
        assert_eq!(weights[&1], 8.0);
    }

    #[test]
    fn exam_bonus_steps() {
        let t = today();
        let in_days = |d| Some(t + chrono::Duration::days(d));
        assert_eq!(exam_bonus(in_days(0), t), 0.0);
        assert_eq!(exam_bonus(in_days(-3), t), 0.0);
        assert_eq!(exam_bonus(in_days(7), t), 10.0);
        assert_eq!(exam_bonus(in_days(8), t), 5.0);
        assert_eq!(exam_bonus(in_days(14), t), 5.0);
        assert_eq!(exam_bonus(in_days(30), t), 2.0);
        assert_eq!(exam_bonus(in_days(31), t), 0.0);
        assert_eq!(exam_bonus(None, t), 0.0);
    }

    #[test]
    fn urgency_steps() {
        assert_eq!(deadline_urgency(-1), 100.0);
        assert_eq!(deadline_urgency(0), 90.0);
        assert_eq!(deadline_urgency(1), 50.0);
        assert_eq!(deadline_urgency(3), 25.0);
        assert_eq!(deadline_urgency(7), 10.0);
        assert_eq!(deadline_urgency(8), 0.0);
    }

    #[test]
    fn task_bonus_takes_max_and_scales_by_priority() {
        let subject = Subject::new(1, 1, "Math", 1, 1).unwrap();
        let tasks = vec![
            Task::new(1, 1, 1, "Problem set").with_deadline(due_in(1)).with_priority(3),
            Task::new(2, 1, 1, "Quiz prep").with_deadline(due_in(0)).with_priority(1),
            Task::new(3, 1, 1, "Done already").with_deadline(due_in(-1)),
        ];
        let mut tasks = tasks;
        tasks[2].completed = true;

        // max(50 * 3/3, 90 * 1/3) = 50
        let weights = calc().weights(&[subject], &tasks);
        assert_eq!(weights[&1], 3.0 + 50.0);
    }

    #[test]
    fn tasks_of_other_subjects_do_not_leak() {
        let a = Subject::new(1, 1, "A", 1, 1).unwrap();
        let b = Subject::new(2, 1, "B", 1, 1).unwrap();
        let tasks = vec![Task::new(1, 2, 1, "B work").with_deadline(due_in(0))];
        let weights = calc().weights(&[a, b], &tasks);
        assert_eq!(weights[&1], 3.0);
        assert_eq!(weights[&2], 93.0);
    }

    #[test]
    fn weights_are_stable() {
        let subjects = vec![
            Subject::new(1, 1, "A", 4, 2).unwrap().with_exam_date(today() + chrono::Duration::days(5)),
            Subject::new(2, 1, "B", 2, 5).unwrap(),
        ];
        let tasks = vec![Task::new(1, 2, 1, "x").with_deadline(due_in(2)).with_priority(5)];
        assert_eq!(calc().weights(&subjects, &tasks), calc().weights(&subjects, &tasks));
    }
}
