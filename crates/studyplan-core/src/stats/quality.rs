//! Productivity rating trend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::StudySession;

/// Changes smaller than this count as stable.
const STABLE_BAND: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
    /// No ratings yet.
    New,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
            Trend::New => "new",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTrend {
    /// Mean rating over the last 7 days, one decimal.
    pub average_rating: f64,
    pub rated_sessions: u32,
    pub trend: Trend,
    /// Difference from the previous 7 days, one decimal.
    pub trend_value: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn mean_rating<'a>(sessions: impl Iterator<Item = &'a StudySession>) -> (f64, u32) {
    let (sum, count) = sessions.fold((0u32, 0u32), |(sum, count), s| {
        (sum + u32::from(s.productivity_rating.unwrap_or(0)), count + 1)
    });
    if count == 0 {
        (0.0, 0)
    } else {
        (f64::from(sum) / f64::from(count), count)
    }
}

/// Average rating of sessions completed in the last 7 days, compared with
/// the 7 days before.
pub fn quality_trend(sessions: &[StudySession], now: DateTime<Utc>) -> QualityTrend {
    let week_ago = now - Duration::days(7);
    let two_weeks_ago = now - Duration::days(14);
    let rated = || {
        sessions
            .iter()
            .filter(|s| s.is_completed() && s.productivity_rating.is_some())
    };

    let (recent, recent_count) = mean_rating(
        rated().filter(|s| s.completed_at.is_some_and(|at| at >= week_ago && at <= now)),
    );
    let (previous, previous_count) = mean_rating(
        rated().filter(|s| s.completed_at.is_some_and(|at| at >= two_weeks_ago && at < week_ago)),
    );

    let (trend, trend_value) = if previous_count > 0 {
        let delta = recent - previous;
        let trend = if delta.abs() < STABLE_BAND {
            Trend::Stable
        } else if delta > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        };
        (trend, delta)
    } else if recent_count > 0 {
        (Trend::Stable, 0.0)
    } else {
        (Trend::New, 0.0)
    };

    QualityTrend {
        average_rating: round1(recent),
        rated_sessions: recent_count,
        trend,
        trend_value: round1(trend_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SessionStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
    }

    fn rated(days_ago: i64, rating: u8) -> StudySession {
        let done = now() - Duration::days(days_ago);
        let mut s = StudySession::planned(1, 1, done - Duration::hours(1), done).unwrap();
        s.status = SessionStatus::Completed;
        s.productivity_rating = Some(rating);
        s.completed_at = Some(done);
        s
    }

    #[test]
    fn no_ratings_is_new() {
        let trend = quality_trend(&[], now());
        assert_eq!(trend.trend, Trend::New);
        assert_eq!(trend.rated_sessions, 0);
    }

    #[test]
    fn first_week_is_stable() {
        let trend = quality_trend(&[rated(1, 4), rated(2, 3)], now());
        assert_eq!(trend.trend, Trend::Stable);
        assert_eq!(trend.average_rating, 3.5);
    }

    #[test]
    fn compares_with_previous_week() {
        let up = quality_trend(&[rated(1, 5), rated(2, 4), rated(9, 3)], now());
        assert_eq!(up.trend, Trend::Up);
        assert_eq!(up.trend_value, 1.5);

        let down = quality_trend(&[rated(1, 2), rated(10, 4)], now());
        assert_eq!(down.trend, Trend::Down);

        let flat = quality_trend(&[rated(1, 4), rated(3, 4), rated(8, 4), rated(20, 1)], now());
        assert_eq!(flat.trend, Trend::Stable);
        assert_eq!(flat.rated_sessions, 2);
    }
}
