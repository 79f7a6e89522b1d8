//! SQLite storage for users, subjects, tasks, busy times and study sessions.
//!
//! All timestamps are stored as RFC 3339 UTC strings (`...Z`, second
//! precision) so range scans can compare them as text. Dates are
//! `YYYY-MM-DD`; weekly clock times are `HH:MM`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{data_dir, migrations, SessionStore};
use crate::error::{DatabaseError, Result, ValidationError};
use crate::schedule::{
    check_day_of_week, check_scale, ClassBlock, PreferredTimes, SessionId, SessionRef,
    SessionStatus, StudyPreference, StudySession, Subject, SubjectId, Task, TaskId,
    UserConstraint, UserId, UserProfile,
};
use crate::scheduler::{PlanningInput, SessionDescriptor};
use crate::timezone::UserClock;
use crate::tracking::MakeupEntry;

// === Helper Functions ===

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn day(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn clock_time(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn get_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn get_opt_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_date(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_clock_time(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| conversion_error(idx, e))
}

const SESSION_COLUMNS: &str = "id, user_id, subject_id, task_id, start_time, end_time, status,
     session_type, locked, actual_minutes, productivity_rating, completed_at, makeup_queued";

fn row_to_session(row: &Row) -> rusqlite::Result<StudySession> {
    let status: String = row.get(6)?;
    let session_type: String = row.get(7)?;
    Ok(StudySession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        task_id: row.get(3)?,
        start_time: get_ts(row, 4)?,
        end_time: get_ts(row, 5)?,
        status: status.parse().map_err(|e| conversion_error(6, e))?,
        session_type: session_type.parse().map_err(|e| conversion_error(7, e))?,
        locked: row.get(8)?,
        actual_minutes: row.get(9)?,
        productivity_rating: row.get(10)?,
        completed_at: get_opt_ts(row, 11)?,
        makeup_queued: row.get(12)?,
    })
}

fn row_to_subject(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        workload_hours: row.get(3)?,
        priority: row.get(4)?,
        difficulty: row.get(5)?,
        exam_date: get_opt_date(row, 6)?,
        color: row.get(7)?,
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        user_id: row.get(2)?,
        title: row.get(3)?,
        deadline: get_opt_ts(row, 4)?,
        estimated_minutes: row.get(5)?,
        priority: row.get(6)?,
        completed: row.get(7)?,
    })
}

fn row_to_makeup(row: &Row) -> rusqlite::Result<MakeupEntry> {
    Ok(MakeupEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subject_id: row.get(2)?,
        minutes: row.get(3)?,
        expires_at: get_date(row, 4)?,
    })
}

fn check_window(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if start >= end {
        return Err(ValidationError::invalid(
            "end_time",
            format!("end ({end}) must be after start ({start})"),
        ));
    }
    Ok(())
}

/// SQLite database for all study-planner data.
pub struct StudyDb {
    conn: Connection,
}

impl StudyDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/studyplan.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("studyplan.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.migrate()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Base tables (v1 schema) first
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                weekly_hours    INTEGER NOT NULL DEFAULT 10,
                timezone        TEXT NOT NULL DEFAULT 'UTC',
                preferred_times TEXT NOT NULL DEFAULT '{\"evening\":true}'
            );

            CREATE TABLE IF NOT EXISTS study_preferences (
                user_id                  INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                max_consecutive_hours    INTEGER NOT NULL DEFAULT 2,
                break_duration           INTEGER NOT NULL DEFAULT 15,
                preferred_session_length INTEGER NOT NULL DEFAULT 60,
                weekend_study            INTEGER NOT NULL DEFAULT 1,
                grace_minutes            INTEGER NOT NULL DEFAULT 30,
                days_per_week            INTEGER NOT NULL DEFAULT 5
            );

            CREATE TABLE IF NOT EXISTS subjects (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id        INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name           TEXT NOT NULL,
                workload_hours INTEGER,
                priority       INTEGER NOT NULL DEFAULT 3,
                difficulty     INTEGER NOT NULL DEFAULT 3,
                exam_date      TEXT,
                color          TEXT NOT NULL DEFAULT '#3498db',
                UNIQUE (user_id, name)
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id        INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                user_id           INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title             TEXT NOT NULL,
                deadline          TEXT,
                estimated_minutes INTEGER,
                priority          INTEGER,
                completed         INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS study_sessions (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                subject_id          INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                task_id             INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
                start_time          TEXT NOT NULL,
                end_time            TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'planned',
                session_type        TEXT NOT NULL DEFAULT 'learn',
                locked              INTEGER NOT NULL DEFAULT 0,
                actual_minutes      INTEGER,
                productivity_rating INTEGER,
                completed_at        TEXT
            );

            CREATE TABLE IF NOT EXISTS user_constraints (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                day_of_week INTEGER NOT NULL,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL,
                is_hard     INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS class_blocks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                day_of_week INTEGER NOT NULL,
                start_time  TEXT NOT NULL,
                end_time    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS makeup_queue (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                subject_id INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                minutes    INTEGER NOT NULL,
                expires_at TEXT NOT NULL
            );",
        )?;

        migrations::migrate(&self.conn)
    }

    // === Users ===

    /// Insert a user (`id <= 0`) or update an existing one. Returns the id.
    pub fn upsert_user(&self, user: &UserProfile) -> Result<UserId> {
        if user.name.trim().is_empty() {
            return Err(ValidationError::invalid("name", "user name is empty").into());
        }
        let times = user.preferred_times.to_json();
        if user.id > 0 {
            self.conn.execute(
                "INSERT INTO users (id, name, weekly_hours, timezone, preferred_times)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    weekly_hours = excluded.weekly_hours,
                    timezone = excluded.timezone,
                    preferred_times = excluded.preferred_times",
                params![user.id, user.name, user.weekly_hours, user.timezone, times],
            )?;
            Ok(user.id)
        } else {
            self.conn.execute(
                "INSERT INTO users (name, weekly_hours, timezone, preferred_times)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user.name, user.weekly_hours, user.timezone, times],
            )?;
            Ok(self.conn.last_insert_rowid())
        }
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, weekly_hours, timezone, preferred_times FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        weekly_hours: row.get(2)?,
                        timezone: row.get(3)?,
                        preferred_times: PreferredTimes::from_json(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Like [`get_user`](Self::get_user) but missing users are an error.
    pub fn require_user(&self, user_id: UserId) -> Result<UserProfile> {
        self.get_user(user_id)?
            .ok_or_else(|| ValidationError::not_found("user", user_id).into())
    }

    /// Stored preferences, or defaults when the user never saved any.
    pub fn get_preference(&self, user_id: UserId) -> Result<StudyPreference> {
        let pref = self
            .conn
            .query_row(
                "SELECT max_consecutive_hours, break_duration, preferred_session_length,
                        weekend_study, grace_minutes, days_per_week
                 FROM study_preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(StudyPreference {
                        max_consecutive_hours: row.get(0)?,
                        break_duration: row.get(1)?,
                        preferred_session_length: row.get(2)?,
                        weekend_study: row.get(3)?,
                        grace_minutes: row.get(4)?,
                        days_per_week: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(pref.unwrap_or_default())
    }

    pub fn set_preference(&self, user_id: UserId, pref: &StudyPreference) -> Result<()> {
        pref.validate()?;
        self.require_user(user_id)?;
        self.conn.execute(
            "INSERT INTO study_preferences (user_id, max_consecutive_hours, break_duration,
                preferred_session_length, weekend_study, grace_minutes, days_per_week)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                max_consecutive_hours = excluded.max_consecutive_hours,
                break_duration = excluded.break_duration,
                preferred_session_length = excluded.preferred_session_length,
                weekend_study = excluded.weekend_study,
                grace_minutes = excluded.grace_minutes,
                days_per_week = excluded.days_per_week",
            params![
                user_id,
                pref.max_consecutive_hours,
                pref.break_duration,
                pref.preferred_session_length,
                pref.weekend_study,
                pref.grace_minutes,
                pref.days_per_week,
            ],
        )?;
        Ok(())
    }

    // === Subjects ===

    pub fn add_subject(&self, subject: &Subject) -> Result<SubjectId> {
        self.require_user(subject.user_id)?;
        check_scale("priority", subject.priority)?;
        check_scale("difficulty", subject.difficulty)?;
        if subject.name.trim().is_empty() {
            return Err(ValidationError::invalid("name", "subject name is empty").into());
        }
        if self.find_subject(subject.user_id, &subject.name)?.is_some() {
            return Err(ValidationError::invalid(
                "name",
                format!("subject '{}' already exists", subject.name),
            )
            .into());
        }

        self.conn.execute(
            "INSERT INTO subjects (user_id, name, workload_hours, priority, difficulty, exam_date, color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                subject.user_id,
                subject.name,
                subject.workload_hours,
                subject.priority,
                subject.difficulty,
                subject.exam_date.as_ref().map(day),
                subject.color,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_subjects(&self, user_id: UserId) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, workload_hours, priority, difficulty, exam_date, color
             FROM subjects WHERE user_id = ?1 ORDER BY id",
        )?;
        let subjects = stmt
            .query_map(params![user_id], row_to_subject)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subjects)
    }

    pub fn get_subject(&self, user_id: UserId, subject_id: SubjectId) -> Result<Subject> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, workload_hours, priority, difficulty, exam_date, color
                 FROM subjects WHERE id = ?1 AND user_id = ?2",
                params![subject_id, user_id],
                row_to_subject,
            )
            .optional()?
            .ok_or_else(|| ValidationError::not_found("subject", subject_id).into())
    }

    pub fn find_subject(&self, user_id: UserId, name: &str) -> Result<Option<Subject>> {
        let subject = self
            .conn
            .query_row(
                "SELECT id, user_id, name, workload_hours, priority, difficulty, exam_date, color
                 FROM subjects WHERE user_id = ?1 AND name = ?2",
                params![user_id, name],
                row_to_subject,
            )
            .optional()?;
        Ok(subject)
    }

    /// Delete a subject together with its tasks, sessions and makeup rows.
    pub fn delete_subject(&self, user_id: UserId, subject_id: SubjectId) -> Result<()> {
        self.get_subject(user_id, subject_id)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM study_sessions WHERE subject_id = ?1", params![subject_id])?;
        tx.execute("DELETE FROM makeup_queue WHERE subject_id = ?1", params![subject_id])?;
        tx.execute("DELETE FROM tasks WHERE subject_id = ?1", params![subject_id])?;
        tx.execute("DELETE FROM subjects WHERE id = ?1", params![subject_id])?;
        tx.commit()?;
        Ok(())
    }

    // === Tasks ===

    pub fn add_task(&self, task: &Task) -> Result<TaskId> {
        self.get_subject(task.user_id, task.subject_id)?;
        if task.title.trim().is_empty() {
            return Err(ValidationError::invalid("title", "task title is empty").into());
        }
        if let Some(priority) = task.priority {
            check_scale("priority", priority)?;
        }

        self.conn.execute(
            "INSERT INTO tasks (subject_id, user_id, title, deadline, estimated_minutes, priority, completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.subject_id,
                task.user_id,
                task.title,
                task.deadline.as_ref().map(ts),
                task.estimated_minutes,
                task.priority,
                task.completed,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_tasks(&self, user_id: UserId, include_completed: bool) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, subject_id, user_id, title, deadline, estimated_minutes, priority, completed
             FROM tasks
             WHERE user_id = ?1 AND (?2 OR completed = 0)
             ORDER BY deadline IS NULL, deadline, id",
        )?;
        let tasks = stmt
            .query_map(params![user_id, include_completed], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn complete_task(&self, user_id: UserId, task_id: TaskId) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE tasks SET completed = 1 WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        if changed == 0 {
            return Err(ValidationError::not_found("task", task_id).into());
        }
        Ok(())
    }

    // === Busy times ===

    pub fn add_constraint(&self, constraint: &UserConstraint) -> Result<i64> {
        self.require_user(constraint.user_id)?;
        check_day_of_week(constraint.day_of_week)?;
        check_window(constraint.start, constraint.end)?;
        self.conn.execute(
            "INSERT INTO user_constraints (user_id, title, day_of_week, start_time, end_time, is_hard)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                constraint.user_id,
                constraint.title,
                constraint.day_of_week,
                clock_time(&constraint.start),
                clock_time(&constraint.end),
                constraint.is_hard,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_constraints(&self, user_id: UserId) -> Result<Vec<UserConstraint>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, title, day_of_week, start_time, end_time, is_hard
             FROM user_constraints WHERE user_id = ?1 ORDER BY day_of_week, start_time, id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(UserConstraint {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    day_of_week: row.get(3)?,
                    start: get_clock_time(row, 4)?,
                    end: get_clock_time(row, 5)?,
                    is_hard: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_constraint(&self, user_id: UserId, id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM user_constraints WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if changed == 0 {
            return Err(ValidationError::not_found("constraint", id).into());
        }
        Ok(())
    }

    pub fn add_class_block(&self, block: &ClassBlock) -> Result<i64> {
        self.require_user(block.user_id)?;
        check_day_of_week(block.day_of_week)?;
        check_window(block.start, block.end)?;
        self.conn.execute(
            "INSERT INTO class_blocks (user_id, name, day_of_week, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.user_id,
                block.name,
                block.day_of_week,
                clock_time(&block.start),
                clock_time(&block.end),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_class_blocks(&self, user_id: UserId) -> Result<Vec<ClassBlock>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, day_of_week, start_time, end_time
             FROM class_blocks WHERE user_id = ?1 ORDER BY day_of_week, start_time, id",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ClassBlock {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    day_of_week: row.get(3)?,
                    start: get_clock_time(row, 4)?,
                    end: get_clock_time(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_class_block(&self, user_id: UserId, id: i64) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM class_blocks WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        if changed == 0 {
            return Err(ValidationError::not_found("class block", id).into());
        }
        Ok(())
    }

    // === Sessions ===

    fn check_overlap(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<SessionId>,
    ) -> Result<()> {
        let clashes: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM study_sessions
             WHERE user_id = ?1 AND status != 'canceled'
               AND start_time < ?3 AND end_time > ?2
               AND id != ?4",
            params![user_id, ts(&start), ts(&end), exclude.unwrap_or(-1)],
            |row| row.get(0),
        )?;
        if clashes > 0 {
            return Err(ValidationError::Overlap { start, end }.into());
        }
        Ok(())
    }

    fn insert_session(&self, session: &StudySession) -> Result<SessionId> {
        self.conn.execute(
            "INSERT INTO study_sessions (user_id, subject_id, task_id, start_time, end_time, status,
                session_type, locked, actual_minutes, productivity_rating, completed_at, makeup_queued)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                session.user_id,
                session.subject_id,
                session.task_id,
                ts(&session.start_time),
                ts(&session.end_time),
                session.status.as_str(),
                session.session_type.as_str(),
                session.locked,
                session.actual_minutes,
                session.productivity_rating,
                session.completed_at.as_ref().map(ts),
                session.makeup_queued,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Add a manual session. It must not overlap any non-canceled session.
    pub fn add_session(&self, session: &StudySession) -> Result<SessionId> {
        if session.end_time <= session.start_time {
            return Err(ValidationError::InvalidTimeRange {
                start: session.start_time,
                end: session.end_time,
            }
            .into());
        }
        self.get_subject(session.user_id, session.subject_id)?;
        if let Some(task_id) = session.task_id {
            let owned: bool = self.conn.query_row(
                "SELECT COUNT(*) > 0 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, session.user_id],
                |row| row.get(0),
            )?;
            if !owned {
                return Err(ValidationError::not_found("task", task_id).into());
            }
        }
        self.check_overlap(session.user_id, session.start_time, session.end_time, None)?;
        let id = self.insert_session(session)?;
        tracing::debug!(session = id, user = session.user_id, "added session");
        Ok(id)
    }

    pub fn get_session(&self, user_id: UserId, session_id: SessionId) -> Result<StudySession> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = ?1 AND user_id = ?2"),
                params![session_id, user_id],
                row_to_session,
            )
            .optional()?
            .ok_or_else(|| ValidationError::not_found("session", session_id).into())
    }

    /// Look a session up by id or by subject name plus local start time.
    pub fn resolve_session(
        &self,
        user_id: UserId,
        reference: &SessionRef,
        clock: &UserClock,
    ) -> Result<StudySession> {
        match reference {
            SessionRef::Id(id) => self.get_session(user_id, *id),
            SessionRef::Composite {
                subject_name,
                local_start,
            } => {
                let subject = self
                    .find_subject(user_id, subject_name)?
                    .ok_or_else(|| ValidationError::not_found("subject", subject_name))?;
                let start = clock.to_utc(*local_start);
                self.conn
                    .query_row(
                        &format!(
                            "SELECT {SESSION_COLUMNS} FROM study_sessions
                             WHERE user_id = ?1 AND subject_id = ?2 AND start_time = ?3
                             ORDER BY id LIMIT 1"
                        ),
                        params![user_id, subject.id, ts(&start)],
                        row_to_session,
                    )
                    .optional()?
                    .ok_or_else(|| {
                        ValidationError::not_found("session", format!("{subject_name}/{local_start}"))
                            .into()
                    })
            }
        }
    }

    /// Mark a planned session completed with optional actuals.
    pub fn complete_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        actual_minutes: Option<u32>,
        productivity_rating: Option<u8>,
        now: DateTime<Utc>,
    ) -> Result<StudySession> {
        if let Some(rating) = productivity_rating {
            check_scale("productivity_rating", rating)?;
        }
        let mut session = self.get_session(user_id, session_id)?;
        session.transition(SessionStatus::Completed)?;
        session.actual_minutes = actual_minutes;
        session.productivity_rating = productivity_rating;
        session.completed_at = Some(now);

        self.conn.execute(
            "UPDATE study_sessions
             SET status = ?1, actual_minutes = ?2, productivity_rating = ?3, completed_at = ?4
             WHERE id = ?5",
            params![
                session.status.as_str(),
                session.actual_minutes,
                session.productivity_rating,
                session.completed_at.as_ref().map(ts),
                session.id,
            ],
        )?;
        Ok(session)
    }

    pub fn cancel_session(&self, user_id: UserId, session_id: SessionId) -> Result<()> {
        self.set_status(user_id, session_id, SessionStatus::Canceled)
    }

    pub fn set_locked(&self, user_id: UserId, session_id: SessionId, locked: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE study_sessions SET locked = ?1 WHERE id = ?2 AND user_id = ?3",
            params![locked, session_id, user_id],
        )?;
        if changed == 0 {
            return Err(ValidationError::not_found("session", session_id).into());
        }
        Ok(())
    }

    /// Move a planned session. The new slot must not overlap another session.
    pub fn reschedule_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<StudySession> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end }.into());
        }
        let mut session = self.get_session(user_id, session_id)?;
        if session.status != SessionStatus::Planned {
            return Err(ValidationError::invalid(
                "status",
                format!("only planned sessions can be rescheduled, this one is {}", session.status),
            )
            .into());
        }
        self.check_overlap(user_id, start, end, Some(session_id))?;

        self.conn.execute(
            "UPDATE study_sessions SET start_time = ?1, end_time = ?2 WHERE id = ?3",
            params![ts(&start), ts(&end), session_id],
        )?;
        session.start_time = start;
        session.end_time = end;
        Ok(session)
    }

    pub fn delete_session(&self, user_id: UserId, session_id: SessionId) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM study_sessions WHERE id = ?1 AND user_id = ?2",
            params![session_id, user_id],
        )?;
        if changed == 0 {
            return Err(ValidationError::not_found("session", session_id).into());
        }
        Ok(())
    }

    /// Sessions of any status that intersect `[start, end)`.
    pub fn sessions_overlapping(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StudySession>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions
             WHERE user_id = ?1 AND start_time < ?3 AND end_time > ?2
             ORDER BY start_time, id"
        ))?;
        let sessions = stmt
            .query_map(params![user_id, ts(&start), ts(&end)], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    // === Makeup queue ===

    pub fn list_makeup(&self, user_id: UserId) -> Result<Vec<MakeupEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, subject_id, minutes, expires_at
             FROM makeup_queue WHERE user_id = ?1 ORDER BY expires_at, subject_id",
        )?;
        let entries = stmt
            .query_map(params![user_id], row_to_makeup)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl SessionStore for StudyDb {
    fn sessions_in_range(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StudySession>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions
             WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3
             ORDER BY start_time, id"
        ))?;
        let sessions = stmt
            .query_map(params![user_id, ts(&start), ts(&end)], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn sessions_with_status(
        &self,
        user_id: UserId,
        status: SessionStatus,
    ) -> Result<Vec<StudySession>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions
             WHERE user_id = ?1 AND status = ?2
             ORDER BY start_time, id"
        ))?;
        let sessions = stmt
            .query_map(params![user_id, status.as_str()], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn set_status(
        &self,
        user_id: UserId,
        session_id: SessionId,
        status: SessionStatus,
    ) -> Result<()> {
        let mut session = self.get_session(user_id, session_id)?;
        session.transition(status)?;
        self.conn.execute(
            "UPDATE study_sessions SET status = ?1 WHERE id = ?2",
            params![session.status.as_str(), session_id],
        )?;
        Ok(())
    }

    fn replace_sessions(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        sessions: &[SessionDescriptor],
    ) -> Result<(usize, Vec<SessionId>)> {
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM study_sessions
             WHERE user_id = ?1 AND start_time >= ?2 AND start_time < ?3
               AND status IN ('planned', 'missed') AND locked = 0",
            params![user_id, ts(&start), ts(&end)],
        )?;

        let mut ids = Vec::with_capacity(sessions.len());
        for descriptor in sessions {
            let mut session = StudySession::planned(
                user_id,
                descriptor.subject_id,
                descriptor.start_time,
                descriptor.end_time,
            )?;
            session.task_id = descriptor.task_id;
            session.session_type = descriptor.session_type;
            ids.push(self.insert_session(&session)?);
        }
        tx.commit()?;
        Ok((removed, ids))
    }

    fn mark_makeup_queued(&self, session_ids: &[SessionId]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE study_sessions SET makeup_queued = 1 WHERE id = ?1")?;
        for id in session_ids {
            stmt.execute(params![id])?;
        }
        Ok(())
    }

    fn upsert_makeup(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
        minutes: u32,
        today: NaiveDate,
        expires_at: NaiveDate,
    ) -> Result<MakeupEntry> {
        let live = self
            .conn
            .query_row(
                "SELECT id, user_id, subject_id, minutes, expires_at FROM makeup_queue
                 WHERE user_id = ?1 AND subject_id = ?2 AND expires_at >= ?3
                 ORDER BY expires_at DESC, id DESC LIMIT 1",
                params![user_id, subject_id, day(&today)],
                row_to_makeup,
            )
            .optional()?;

        let entry = match live {
            Some(mut entry) => {
                entry.minutes += minutes;
                entry.expires_at = entry.expires_at.max(expires_at);
                self.conn.execute(
                    "UPDATE makeup_queue SET minutes = ?1, expires_at = ?2 WHERE id = ?3",
                    params![entry.minutes, day(&entry.expires_at), entry.id],
                )?;
                entry
            }
            None => {
                self.conn.execute(
                    "INSERT INTO makeup_queue (user_id, subject_id, minutes, expires_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, subject_id, minutes, day(&expires_at)],
                )?;
                MakeupEntry {
                    id: self.conn.last_insert_rowid(),
                    user_id,
                    subject_id,
                    minutes,
                    expires_at,
                }
            }
        };
        Ok(entry)
    }

    fn record_makeup(
        &self,
        user_id: UserId,
        minutes: &BTreeMap<SubjectId, u32>,
        session_ids: &[SessionId],
        today: NaiveDate,
        expires_at: NaiveDate,
    ) -> Result<Vec<MakeupEntry>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut entries = Vec::with_capacity(minutes.len());
        for (subject_id, added) in minutes {
            entries.push(self.upsert_makeup(user_id, *subject_id, *added, today, expires_at)?);
        }
        self.mark_makeup_queued(session_ids)?;
        tx.commit()?;
        Ok(entries)
    }

    fn delete_expired_makeup(&self, today: NaiveDate) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM makeup_queue WHERE expires_at < ?1",
            params![day(&today)],
        )?;
        Ok(removed)
    }

    fn load_planning_input(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PlanningInput> {
        Ok(PlanningInput {
            user: self.require_user(user_id)?,
            preference: self.get_preference(user_id)?,
            subjects: self.list_subjects(user_id)?,
            tasks: self.list_tasks(user_id, false)?,
            constraints: self.list_constraints(user_id)?,
            class_blocks: self.list_class_blocks(user_id)?,
            existing_sessions: self.sessions_overlapping(user_id, start, end)?,
        })
    }
}
