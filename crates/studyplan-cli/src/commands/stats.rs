use chrono::Duration;
use studyplan_core::stats::{format_minutes, week_bounds};
use studyplan_core::{SessionStore, StudyStatistics};

use super::{CmdResult, Context};

pub fn run(ctx: &Context) -> CmdResult {
    let clock = ctx.clock()?;
    let (monday, sunday) = week_bounds(clock.today(ctx.now));
    let week = clock.range_utc(monday, sunday);

    // Two weeks back covers the rating trend
    let from = week.0.min(ctx.now - Duration::days(14));
    let sessions = ctx.db.sessions_in_range(ctx.user_id, from, week.1)?;
    let stats = StudyStatistics::compute(&sessions, week, ctx.now);

    let names: std::collections::BTreeMap<i64, String> = ctx
        .db
        .list_subjects(ctx.user_id)?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    ctx.emit(&stats, || {
        let week = &stats.this_week;
        println!("This week ({monday} to {sunday})");
        println!("  planned:   {} in {} sessions", format_minutes(week.planned_minutes), week.planned_sessions);
        println!("  studied:   {} in {} sessions", format_minutes(week.actual_minutes), week.completed_sessions);
        println!("  adherence: {}%", week.adherence_rate);
        println!(
            "Quality (7 days): {:.1} from {} ratings, trend {} ({:+.1})",
            stats.quality.average_rating,
            stats.quality.rated_sessions,
            stats.quality.trend.as_str(),
            stats.quality.trend_value
        );
        if !stats.missed.is_empty() {
            println!("Missed:");
            for (subject, missed) in &stats.missed {
                let name = names.get(subject).map(String::as_str).unwrap_or("?");
                println!("  {name:<20} {} sessions, {}", missed.count, format_minutes(missed.minutes));
            }
        }
    })
}
