//! Task management commands for CLI.

use chrono::{DateTime, NaiveTime, Utc};
use clap::Subcommand;
use studyplan_core::Task;

use super::{parse_date, parse_local_datetime, CmdResult, Context};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task to a subject
    Add {
        /// Subject id or name
        subject: String,
        /// Task title
        title: String,
        /// Local deadline: "YYYY-MM-DD HH:MM", or a date for end of day
        #[arg(long)]
        deadline: Option<String>,
        /// Estimated minutes of work
        #[arg(long)]
        estimate: Option<u32>,
        /// 1 (low) to 5 (high)
        #[arg(long)]
        priority: Option<u8>,
    },
    /// List open tasks
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },
    /// Mark a task completed
    Complete {
        /// Task ID
        id: i64,
    },
}

fn parse_deadline(ctx: &Context, raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let local = match parse_local_datetime(raw) {
        Ok(local) => local,
        Err(_) => {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 0).ok_or("invalid end of day")?;
            parse_date(raw)?.and_time(end_of_day)
        }
    };
    Ok(ctx.clock()?.to_utc(local))
}

pub fn run(ctx: &Context, action: TaskAction) -> CmdResult {
    match action {
        TaskAction::Add {
            subject,
            title,
            deadline,
            estimate,
            priority,
        } => {
            let subject = ctx.subject(&subject)?;
            let mut task = Task::new(0, subject.id, ctx.user_id, title);
            task.deadline = deadline.map(|raw| parse_deadline(ctx, &raw)).transpose()?;
            task.estimated_minutes = estimate;
            task.priority = priority;
            task.id = ctx.db.add_task(&task)?;
            ctx.emit(&task, || println!("Task created: {} ({})", task.id, task.title))
        }
        TaskAction::List { all } => {
            let tasks = ctx.db.list_tasks(ctx.user_id, all)?;
            let clock = ctx.clock()?;
            ctx.emit(&tasks, || {
                if tasks.is_empty() {
                    println!("No tasks");
                }
                for t in &tasks {
                    let due = t
                        .deadline
                        .map(|d| clock.to_local(d).format("due %Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "no deadline".into());
                    let done = if t.completed { " [done]" } else { "" };
                    let estimate = t
                        .estimated_minutes
                        .map(|m| format!("  ~{m}m"))
                        .unwrap_or_default();
                    println!("{:>4}  {:<30} {due}{estimate}{done}", t.id, t.title);
                }
            })
        }
        TaskAction::Complete { id } => {
            ctx.db.complete_task(ctx.user_id, id)?;
            ctx.emit(&id, || println!("Task {id} completed"))
        }
    }
}
