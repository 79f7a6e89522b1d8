//! Individual session commands.
//!
//! Sessions are addressed by id or by the legacy `Subject/YYYY-MM-DD/HH:MM`
//! reference (local start time).

use chrono::Duration;
use clap::Subcommand;
use studyplan_core::{SessionRef, SessionType, StudySession};

use super::{parse_local_datetime, CmdResult, Context};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Add a manual session
    Add {
        /// Subject id or name
        subject: String,
        /// Local start: "YYYY-MM-DD HH:MM"
        #[arg(long)]
        start: String,
        /// Length in minutes, default the preferred session length
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        task: Option<i64>,
        /// learn, practice, review or assignment
        #[arg(long, default_value = "learn")]
        kind: String,
        /// Keep the session through regeneration
        #[arg(long)]
        locked: bool,
    },
    /// Mark a session completed
    Complete {
        /// Session id or Subject/YYYY-MM-DD/HH:MM
        session: String,
        /// Minutes actually studied
        #[arg(long)]
        minutes: Option<u32>,
        /// Productivity 1-5
        #[arg(long)]
        rating: Option<u8>,
    },
    /// Cancel a planned session
    Cancel { session: String },
    /// Keep a session through regeneration
    Lock { session: String },
    /// Let regeneration replace a session again
    Unlock { session: String },
    /// Move a planned session
    Reschedule {
        session: String,
        /// New local start: "YYYY-MM-DD HH:MM"
        #[arg(long)]
        start: String,
        /// New length in minutes, default unchanged
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Delete a session
    Delete { session: String },
}

fn resolve(ctx: &Context, raw: &str) -> Result<StudySession, Box<dyn std::error::Error>> {
    let reference: SessionRef = raw.parse()?;
    Ok(ctx.db.resolve_session(ctx.user_id, &reference, &ctx.clock()?)?)
}

pub fn run(ctx: &Context, action: SessionAction) -> CmdResult {
    match action {
        SessionAction::Add {
            subject,
            start,
            minutes,
            task,
            kind,
            locked,
        } => {
            let clock = ctx.clock()?;
            let subject = ctx.subject(&subject)?;
            let minutes = match minutes {
                Some(m) => m,
                None => ctx.db.get_preference(ctx.user_id)?.preferred_session_length,
            };
            let start = clock.to_utc(parse_local_datetime(&start)?);
            let end = start + Duration::minutes(i64::from(minutes));

            let mut session = StudySession::planned(ctx.user_id, subject.id, start, end)?;
            session.task_id = task;
            session.session_type = kind.parse::<SessionType>()?;
            session.locked = locked;
            session.id = ctx.db.add_session(&session)?;
            ctx.emit(&session, || {
                println!(
                    "Session created: {} ({} {})",
                    session.id,
                    subject.name,
                    clock.to_local(session.start_time).format("%Y-%m-%d %H:%M")
                )
            })
        }
        SessionAction::Complete {
            session,
            minutes,
            rating,
        } => {
            let session = resolve(ctx, &session)?;
            let done = ctx
                .db
                .complete_session(ctx.user_id, session.id, minutes, rating, ctx.now)?;
            ctx.emit(&done, || println!("Session {} completed", done.id))
        }
        SessionAction::Cancel { session } => {
            let session = resolve(ctx, &session)?;
            ctx.db.cancel_session(ctx.user_id, session.id)?;
            ctx.emit(&session.id, || println!("Session {} canceled", session.id))
        }
        SessionAction::Lock { session } => {
            let session = resolve(ctx, &session)?;
            ctx.db.set_locked(ctx.user_id, session.id, true)?;
            ctx.emit(&session.id, || println!("Session {} locked", session.id))
        }
        SessionAction::Unlock { session } => {
            let session = resolve(ctx, &session)?;
            ctx.db.set_locked(ctx.user_id, session.id, false)?;
            ctx.emit(&session.id, || println!("Session {} unlocked", session.id))
        }
        SessionAction::Reschedule {
            session,
            start,
            minutes,
        } => {
            let clock = ctx.clock()?;
            let session = resolve(ctx, &session)?;
            let length = minutes
                .map(|m| Duration::minutes(i64::from(m)))
                .unwrap_or(session.end_time - session.start_time);
            let start = clock.to_utc(parse_local_datetime(&start)?);
            let moved = ctx
                .db
                .reschedule_session(ctx.user_id, session.id, start, start + length)?;
            ctx.emit(&moved, || {
                println!(
                    "Session {} moved to {}",
                    moved.id,
                    clock.to_local(moved.start_time).format("%Y-%m-%d %H:%M")
                )
            })
        }
        SessionAction::Delete { session } => {
            let session = resolve(ctx, &session)?;
            ctx.db.delete_session(ctx.user_id, session.id)?;
            ctx.emit(&session.id, || println!("Session {} deleted", session.id))
        }
    }
}
