//! Subject management commands.

use clap::Subcommand;
use studyplan_core::Subject;

use super::{parse_date, CmdResult, Context};

#[derive(Subcommand)]
pub enum SubjectAction {
    /// Add a subject
    Add {
        name: String,
        /// 1 (low) to 5 (high)
        #[arg(long, default_value = "3")]
        priority: u8,
        /// 1 (easy) to 5 (hard)
        #[arg(long, default_value = "3")]
        difficulty: u8,
        /// Weekly hour cap, used with `scheduler.cap_to_workload`
        #[arg(long)]
        workload: Option<u32>,
        /// YYYY-MM-DD
        #[arg(long)]
        exam_date: Option<String>,
        /// Display color (e.g. "#e74c3c")
        #[arg(long)]
        color: Option<String>,
    },
    /// List subjects
    List,
    /// Delete a subject with its tasks and sessions
    Delete {
        /// Subject id or name
        subject: String,
    },
}

pub fn run(ctx: &Context, action: SubjectAction) -> CmdResult {
    match action {
        SubjectAction::Add {
            name,
            priority,
            difficulty,
            workload,
            exam_date,
            color,
        } => {
            let mut subject = Subject::new(0, ctx.user_id, name, priority, difficulty)?;
            if let Some(hours) = workload {
                subject = subject.with_workload(hours);
            }
            if let Some(raw) = exam_date {
                subject = subject.with_exam_date(parse_date(&raw)?);
            }
            if let Some(color) = color {
                subject = subject.with_color(color);
            }
            subject.id = ctx.db.add_subject(&subject)?;
            ctx.emit(&subject, || println!("Subject created: {} ({})", subject.id, subject.name))
        }
        SubjectAction::List => {
            let subjects = ctx.db.list_subjects(ctx.user_id)?;
            ctx.emit(&subjects, || {
                if subjects.is_empty() {
                    println!("No subjects");
                }
                for s in &subjects {
                    let exam = s
                        .exam_date
                        .map(|d| format!("  exam {d}"))
                        .unwrap_or_default();
                    let workload = s
                        .workload_hours
                        .map(|h| format!("  cap {h}h"))
                        .unwrap_or_default();
                    println!(
                        "{:>4}  {:<20} p{} d{}{exam}{workload}",
                        s.id, s.name, s.priority, s.difficulty
                    );
                }
            })
        }
        SubjectAction::Delete { subject } => {
            let subject = ctx.subject(&subject)?;
            ctx.db.delete_subject(ctx.user_id, subject.id)?;
            ctx.emit(&subject.id, || println!("Subject deleted: {}", subject.name))
        }
    }
}
