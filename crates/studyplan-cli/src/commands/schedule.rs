//! Schedule generation and listing.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use clap::Subcommand;
use studyplan_core::planner::{check_coverage, plan_schedule, regenerate_schedule};
use studyplan_core::{
    ScheduleWarning, SessionDescriptor, SessionStore, StudySession, UserClock,
};

use super::{parse_date, CmdResult, Context};

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// Generate sessions, replacing unlocked planned ones in the range
    Generate {
        /// First day (YYYY-MM-DD), default today
        #[arg(long)]
        start: Option<String>,
        /// Number of days, default `scheduler.horizon_days`
        #[arg(long)]
        days: Option<u32>,
        /// Show the result without saving it
        #[arg(long)]
        dry_run: bool,
    },
    /// List stored sessions
    List {
        #[arg(long)]
        start: Option<String>,
        #[arg(long, default_value = "7")]
        days: u32,
    },
    /// Check whether work due soon fits the weekly budget
    Check {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        days: Option<u32>,
    },
}

fn range(ctx: &Context, start: Option<String>, days: u32) -> Result<(NaiveDate, NaiveDate), Box<dyn std::error::Error>> {
    let first = match start {
        Some(raw) => parse_date(&raw)?,
        None => ctx.today()?,
    };
    let last = first + Duration::days(i64::from(days.max(1)) - 1);
    Ok((first, last))
}

fn subject_names(ctx: &Context) -> Result<BTreeMap<i64, String>, Box<dyn std::error::Error>> {
    Ok(ctx
        .db
        .list_subjects(ctx.user_id)?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect())
}

fn print_warnings(warnings: &[ScheduleWarning]) {
    for warning in warnings {
        println!("warning: {}", warning.message());
    }
}

fn print_descriptors(clock: &UserClock, names: &BTreeMap<i64, String>, sessions: &[SessionDescriptor]) {
    let mut current_day = None;
    for s in sessions {
        let start = clock.to_local(s.start_time);
        let end = clock.to_local(s.end_time);
        if current_day != Some(start.date()) {
            current_day = Some(start.date());
            println!("{}", start.format("%A %Y-%m-%d"));
        }
        let name = names.get(&s.subject_id).map(String::as_str).unwrap_or("?");
        println!(
            "  {}-{}  {:<20} {}",
            start.format("%H:%M"),
            end.format("%H:%M"),
            name,
            s.session_type.as_str()
        );
    }
}

fn print_sessions(clock: &UserClock, names: &BTreeMap<i64, String>, sessions: &[StudySession]) {
    let mut current_day = None;
    for s in sessions {
        let start = clock.to_local(s.start_time);
        let end = clock.to_local(s.end_time);
        if current_day != Some(start.date()) {
            current_day = Some(start.date());
            println!("{}", start.format("%A %Y-%m-%d"));
        }
        let name = names.get(&s.subject_id).map(String::as_str).unwrap_or("?");
        let lock = if s.locked { " [locked]" } else { "" };
        println!(
            "  {:>4}  {}-{}  {:<20} {:<10} {}{lock}",
            s.id,
            start.format("%H:%M"),
            end.format("%H:%M"),
            name,
            s.session_type.as_str(),
            s.status
        );
    }
}

pub fn run(ctx: &Context, action: ScheduleAction) -> CmdResult {
    let clock = ctx.clock()?;
    let options = ctx.config.generation_options();

    match action {
        ScheduleAction::Generate {
            start,
            days,
            dry_run,
        } => {
            let (first, last) = range(ctx, start, days.unwrap_or(ctx.config.scheduler.horizon_days))?;
            let names = subject_names(ctx)?;
            if dry_run {
                let plan = plan_schedule(&ctx.db, ctx.user_id, first, last, options, ctx.now)?;
                return ctx.emit(&plan, || {
                    println!("Planned {} sessions ({first} to {last}, not saved)", plan.sessions.len());
                    print_descriptors(&clock, &names, &plan.sessions);
                    print_warnings(&plan.warnings);
                });
            }
            let report = regenerate_schedule(&ctx.db, ctx.user_id, first, last, options, ctx.now)?;
            ctx.emit(&report, || {
                println!(
                    "Scheduled {} sessions ({first} to {last}); replaced {}, kept {}",
                    report.inserted.len(),
                    report.removed,
                    report.preserved
                );
                print_descriptors(&clock, &names, &report.schedule.sessions);
                print_warnings(&report.schedule.warnings);
            })
        }
        ScheduleAction::List { start, days } => {
            let (first, last) = range(ctx, start, days)?;
            let (from, to) = clock.range_utc(first, last);
            let sessions = ctx.db.sessions_in_range(ctx.user_id, from, to)?;
            let names = subject_names(ctx)?;
            ctx.emit(&sessions, || {
                if sessions.is_empty() {
                    println!("No sessions between {first} and {last}");
                }
                print_sessions(&clock, &names, &sessions);
            })
        }
        ScheduleAction::Check { start, days } => {
            let (first, last) = range(ctx, start, days.unwrap_or(ctx.config.scheduler.horizon_days))?;
            let warnings = check_coverage(&ctx.db, ctx.user_id, first, last)?;
            ctx.emit(&warnings, || {
                if warnings.is_empty() {
                    println!("Work due soon fits the weekly budget");
                }
                print_warnings(&warnings);
            })
        }
    }
}
