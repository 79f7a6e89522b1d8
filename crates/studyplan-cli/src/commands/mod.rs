//! Subcommand implementations and the helpers they share.

pub mod config;
pub mod constraint;
pub mod jobs;
pub mod prefs;
pub mod schedule;
pub mod session;
pub mod stats;
pub mod subject;
pub mod task;
pub mod user;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use studyplan_core::schedule::UserId;
use studyplan_core::{Config, StudyDb, Subject, UserClock, ValidationError};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Per-invocation state: the open database, config and active user.
pub struct Context {
    pub db: StudyDb,
    pub config: Config,
    pub user_id: UserId,
    pub json: bool,
    pub now: DateTime<Utc>,
}

impl Context {
    pub fn open(config: Config, user: Option<UserId>, json: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let db = StudyDb::open()?;
        let user_id = user.unwrap_or(config.active_user);
        tracing::debug!(user = user_id, "database opened");
        Ok(Self {
            db,
            config,
            user_id,
            json,
            now: Utc::now(),
        })
    }

    /// The active user's clock. Fails when the user does not exist yet.
    pub fn clock(&self) -> Result<UserClock, Box<dyn std::error::Error>> {
        let user = self.db.require_user(self.user_id).map_err(|e| {
            format!("{e} (create it with `studyplan user set --name <NAME>`)")
        })?;
        Ok(UserClock::parse(&user.timezone))
    }

    pub fn today(&self) -> Result<NaiveDate, Box<dyn std::error::Error>> {
        Ok(self.clock()?.today(self.now))
    }

    /// Print `value` as JSON with `--json`, otherwise run `human`.
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> CmdResult {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }

    /// Resolve a subject given as an id or a name.
    pub fn subject(&self, reference: &str) -> Result<Subject, Box<dyn std::error::Error>> {
        if let Ok(id) = reference.parse::<i64>() {
            return Ok(self.db.get_subject(self.user_id, id)?);
        }
        self.db
            .find_subject(self.user_id, reference)?
            .ok_or_else(|| ValidationError::not_found("subject", reference).into())
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| ValidationError::invalid("date", format!("'{raw}' is not YYYY-MM-DD: {e}")))
}

pub fn parse_time(raw: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| ValidationError::invalid("time", format!("'{raw}' is not HH:MM: {e}")))
}

/// `YYYY-MM-DD HH:MM` or `YYYY-MM-DDTHH:MM`, on the user's wall clock.
pub fn parse_local_datetime(raw: &str) -> Result<NaiveDateTime, ValidationError> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| ValidationError::invalid("datetime", format!("'{raw}' is not YYYY-MM-DD HH:MM")))
}

/// `0`-`6` or an English weekday name (`mon`, `Tuesday`, ...).
pub fn parse_weekday(raw: &str) -> Result<u8, ValidationError> {
    if let Ok(n) = raw.trim().parse::<u8>() {
        return Ok(n);
    }
    raw.trim()
        .parse::<chrono::Weekday>()
        .map(|day| day.num_days_from_monday() as u8)
        .map_err(|_| ValidationError::invalid("day", format!("'{raw}' is not a weekday")))
}

pub fn weekday_name(day: u8) -> &'static str {
    ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
        .get(usize::from(day))
        .copied()
        .unwrap_or("?")
}
