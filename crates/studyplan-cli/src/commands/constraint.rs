//! Recurring weekly busy times and class blocks.

use clap::Subcommand;
use serde::Serialize;
use studyplan_core::{ClassBlock, UserConstraint};

use super::{parse_time, parse_weekday, weekday_name, CmdResult, Context};

#[derive(Subcommand)]
pub enum ConstraintAction {
    /// Add a weekly busy time
    AddBusy {
        title: String,
        /// Weekday: 0-6 (Mon-Sun) or a name
        #[arg(long)]
        day: String,
        /// HH:MM
        #[arg(long)]
        start: String,
        /// HH:MM
        #[arg(long)]
        end: String,
        /// Soft busy time; honored unless `scheduler.soft_constraints = "ignore"`
        #[arg(long)]
        soft: bool,
    },
    /// Add a weekly class
    AddClass {
        name: String,
        #[arg(long)]
        day: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    /// List busy times and classes
    List,
    /// Delete a busy time, or a class with --class
    Delete {
        id: i64,
        #[arg(long)]
        class: bool,
    },
}

#[derive(Serialize)]
struct Listing {
    constraints: Vec<UserConstraint>,
    class_blocks: Vec<ClassBlock>,
}

pub fn run(ctx: &Context, action: ConstraintAction) -> CmdResult {
    match action {
        ConstraintAction::AddBusy {
            title,
            day,
            start,
            end,
            soft,
        } => {
            let mut constraint = UserConstraint::new(
                ctx.user_id,
                title,
                parse_weekday(&day)?,
                parse_time(&start)?,
                parse_time(&end)?,
                !soft,
            )?;
            constraint.id = ctx.db.add_constraint(&constraint)?;
            ctx.emit(&constraint, || println!("Busy time created: {}", constraint.id))
        }
        ConstraintAction::AddClass {
            name,
            day,
            start,
            end,
        } => {
            let mut block = ClassBlock::new(
                ctx.user_id,
                name,
                parse_weekday(&day)?,
                parse_time(&start)?,
                parse_time(&end)?,
            )?;
            block.id = ctx.db.add_class_block(&block)?;
            ctx.emit(&block, || println!("Class created: {}", block.id))
        }
        ConstraintAction::List => {
            let listing = Listing {
                constraints: ctx.db.list_constraints(ctx.user_id)?,
                class_blocks: ctx.db.list_class_blocks(ctx.user_id)?,
            };
            ctx.emit(&listing, || {
                println!("Busy times:");
                for c in &listing.constraints {
                    let kind = if c.is_hard { "hard" } else { "soft" };
                    println!(
                        "{:>4}  {} {}-{}  {} ({kind})",
                        c.id,
                        weekday_name(c.day_of_week),
                        c.start.format("%H:%M"),
                        c.end.format("%H:%M"),
                        c.title
                    );
                }
                println!("Classes:");
                for b in &listing.class_blocks {
                    println!(
                        "{:>4}  {} {}-{}  {}",
                        b.id,
                        weekday_name(b.day_of_week),
                        b.start.format("%H:%M"),
                        b.end.format("%H:%M"),
                        b.name
                    );
                }
            })
        }
        ConstraintAction::Delete { id, class } => {
            if class {
                ctx.db.delete_class_block(ctx.user_id, id)?;
            } else {
                ctx.db.delete_constraint(ctx.user_id, id)?;
            }
            ctx.emit(&id, || println!("Deleted {id}"))
        }
    }
}
