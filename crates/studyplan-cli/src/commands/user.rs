//! User profile commands.

use clap::Subcommand;
use studyplan_core::{PreferredTimes, UserClock, UserProfile};

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum UserAction {
    /// Show the active user
    Show,
    /// Create or update the active user
    Set {
        #[arg(long)]
        name: Option<String>,
        /// Hours to study per week
        #[arg(long)]
        weekly_hours: Option<u32>,
        /// IANA timezone (e.g. "Europe/Berlin")
        #[arg(long)]
        timezone: Option<String>,
        /// Comma-separated: morning, afternoon, evening, night
        #[arg(long)]
        preferred_times: Option<String>,
    },
}

pub fn run(ctx: &Context, action: UserAction) -> CmdResult {
    match action {
        UserAction::Show => {
            let user = ctx.db.require_user(ctx.user_id)?;
            ctx.emit(&user, || print_user(&user))
        }
        UserAction::Set {
            name,
            weekly_hours,
            timezone,
            preferred_times,
        } => {
            let mut user = match ctx.db.get_user(ctx.user_id)? {
                Some(user) => user,
                None => UserProfile::new(ctx.user_id, name.clone().unwrap_or_else(|| "student".into())),
            };
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(hours) = weekly_hours {
                user.weekly_hours = hours;
            }
            if let Some(tz) = timezone {
                UserClock::try_parse(&tz)?;
                user.timezone = tz;
            }
            if let Some(list) = preferred_times {
                user.preferred_times = PreferredTimes::parse_list(&list)?;
            }
            ctx.db.upsert_user(&user)?;
            ctx.emit(&user, || {
                println!("User {} saved", user.id);
                print_user(&user);
            })
        }
    }
}

fn print_user(user: &UserProfile) {
    let times: Vec<&str> = user.preferred_times.enabled().map(|t| t.as_str()).collect();
    println!("  name:            {}", user.name);
    println!("  weekly hours:    {}", user.weekly_hours);
    println!("  timezone:        {}", user.timezone);
    println!("  preferred times: {}", times.join(", "));
}
