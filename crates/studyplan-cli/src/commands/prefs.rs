use clap::Subcommand;
use studyplan_core::StudyPreference;

use super::{CmdResult, Context};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Show study preferences
    Show,
    /// Update study preferences; omitted flags keep their value
    Set {
        #[arg(long)]
        max_consecutive_hours: Option<u32>,
        /// Minutes of rest after each session
        #[arg(long)]
        break_duration: Option<u32>,
        /// Minutes per regular session
        #[arg(long)]
        session_length: Option<u32>,
        #[arg(long)]
        weekend_study: Option<bool>,
        /// Minutes after a session ends before it counts as missed
        #[arg(long)]
        grace_minutes: Option<u32>,
        #[arg(long)]
        days_per_week: Option<u32>,
    },
}

pub fn run(ctx: &Context, action: PrefsAction) -> CmdResult {
    let mut pref = ctx.db.get_preference(ctx.user_id)?;
    match action {
        PrefsAction::Show => ctx.emit(&pref, || print_prefs(&pref)),
        PrefsAction::Set {
            max_consecutive_hours,
            break_duration,
            session_length,
            weekend_study,
            grace_minutes,
            days_per_week,
        } => {
            pref.max_consecutive_hours = max_consecutive_hours.unwrap_or(pref.max_consecutive_hours);
            pref.break_duration = break_duration.unwrap_or(pref.break_duration);
            pref.preferred_session_length = session_length.unwrap_or(pref.preferred_session_length);
            pref.weekend_study = weekend_study.unwrap_or(pref.weekend_study);
            pref.grace_minutes = grace_minutes.unwrap_or(pref.grace_minutes);
            pref.days_per_week = days_per_week.unwrap_or(pref.days_per_week);
            ctx.db.set_preference(ctx.user_id, &pref)?;
            ctx.emit(&pref, || {
                println!("Preferences saved");
                print_prefs(&pref);
            })
        }
    }
}

fn print_prefs(pref: &StudyPreference) {
    println!("  session length:        {} min", pref.preferred_session_length);
    println!("  break:                 {} min", pref.break_duration);
    println!("  max consecutive hours: {}", pref.max_consecutive_hours);
    println!("  weekend study:         {}", pref.weekend_study);
    println!("  grace:                 {} min", pref.grace_minutes);
    println!("  days per week:         {}", pref.days_per_week);
}
