use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{check_scale, SubjectId, TaskId, UserId, DEFAULT_SUBJECT_COLOR};
use crate::error::ValidationError;

/// An academic subject the user is studying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub user_id: UserId,
    pub name: String,
    /// Weekly workload hint in hours.
    pub workload_hours: Option<u32>,
    /// 1-5, higher is more important.
    pub priority: u8,
    /// 1-5, higher is harder.
    pub difficulty: u8,
    pub exam_date: Option<NaiveDate>,
    pub color: String,
}

impl Subject {
    /// Create a subject with validated priority and difficulty.
    pub fn new(
        id: SubjectId,
        user_id: UserId,
        name: impl Into<String>,
        priority: u8,
        difficulty: u8,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::invalid("name", "subject name is empty"));
        }
        Ok(Self {
            id,
            user_id,
            name,
            workload_hours: None,
            priority: check_scale("priority", priority)?,
            difficulty: check_scale("difficulty", difficulty)?,
            exam_date: None,
            color: DEFAULT_SUBJECT_COLOR.to_string(),
        })
    }

    pub fn with_exam_date(mut self, date: NaiveDate) -> Self {
        self.exam_date = Some(date);
        self
    }

    pub fn with_workload(mut self, hours: u32) -> Self {
        self.workload_hours = Some(hours);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

/// A discrete unit of work that sessions can link to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject_id: SubjectId,
    pub user_id: UserId,
    pub title: String,
    pub deadline: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<u32>,
    /// 1-5 when set.
    pub priority: Option<u8>,
    pub completed: bool,
}

impl Task {
    pub fn new(id: TaskId, subject_id: SubjectId, user_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id,
            subject_id,
            user_id,
            title: title.into(),
            deadline: None,
            estimated_minutes: None,
            priority: None,
            completed: false,
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_minutes = Some(minutes);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Estimated minutes, or `fallback` when the user gave no estimate.
    pub fn estimate_or(&self, fallback: u32) -> u32 {
        self.estimated_minutes.unwrap_or(fallback)
    }
}
