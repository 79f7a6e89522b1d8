//! Maintenance jobs. Each is idempotent and safe to run from cron.

use clap::Subcommand;
use serde::Serialize;
use studyplan_core::planner::{cleanup_expired_makeup, mark_missed, queue_makeup};

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum JobsAction {
    /// Mark planned sessions past their grace period as missed
    MarkMissed,
    /// Queue minutes of missed sessions for makeup
    QueueMakeup,
    /// Delete expired makeup entries (all users)
    CleanupMakeup,
    /// Run all three jobs in order
    Run,
    /// Show the makeup queue
    Makeup,
}

#[derive(Serialize)]
struct JobSummary {
    marked_missed: usize,
    queued_minutes: u32,
    expired_removed: usize,
}

pub fn run(ctx: &Context, action: JobsAction) -> CmdResult {
    let today = ctx.today()?;
    let grace = ctx.db.get_preference(ctx.user_id)?.grace_minutes;
    let expiry_days = ctx.config.makeup.expiry_days;

    match action {
        JobsAction::MarkMissed => {
            let marked = mark_missed(&ctx.db, ctx.user_id, grace, ctx.now)?;
            ctx.emit(&marked, || println!("Marked {marked} sessions missed"))
        }
        JobsAction::QueueMakeup => {
            let queued = queue_makeup(&ctx.db, ctx.user_id, today, expiry_days)?;
            ctx.emit(&queued, || {
                if queued.is_empty() {
                    println!("Nothing to queue");
                }
                for (subject, minutes) in &queued {
                    println!("Queued {minutes} minutes for subject {subject}");
                }
            })
        }
        JobsAction::CleanupMakeup => {
            let removed = cleanup_expired_makeup(&ctx.db, today)?;
            ctx.emit(&removed, || println!("Removed {removed} expired makeup entries"))
        }
        JobsAction::Run => {
            let summary = JobSummary {
                marked_missed: mark_missed(&ctx.db, ctx.user_id, grace, ctx.now)?,
                queued_minutes: queue_makeup(&ctx.db, ctx.user_id, today, expiry_days)?
                    .values()
                    .sum(),
                expired_removed: cleanup_expired_makeup(&ctx.db, today)?,
            };
            ctx.emit(&summary, || {
                println!(
                    "missed: {}  queued: {} min  expired: {}",
                    summary.marked_missed, summary.queued_minutes, summary.expired_removed
                )
            })
        }
        JobsAction::Makeup => {
            let entries = ctx.db.list_makeup(ctx.user_id)?;
            ctx.emit(&entries, || {
                if entries.is_empty() {
                    println!("Makeup queue is empty");
                }
                for e in &entries {
                    println!(
                        "subject {:>4}  {:>4} min  until {}",
                        e.subject_id, e.minutes, e.expires_at
                    );
                }
            })
        }
    }
}
