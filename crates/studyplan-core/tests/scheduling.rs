//! End-to-end scheduling against an in-memory store.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use studyplan_core::planner::{plan_schedule, regenerate_schedule};
use studyplan_core::{
    GenerationOptions, PreferredTimes, ScheduleWarning, SessionDescriptor, SessionStore,
    SessionType, SoftConstraintPolicy, StudyDb, StudyPreference, StudySession, Subject, Task,
    UserConstraint, UserProfile,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

fn utc(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, h, m, 0).unwrap()
}

fn early_monday() -> DateTime<Utc> {
    utc(10, 6, 0)
}

fn setup(weekly_hours: u32) -> (StudyDb, i64) {
    let db = StudyDb::open_memory().unwrap();
    let mut user = UserProfile::new(0, "Ada");
    user.weekly_hours = weekly_hours;
    let user = db.upsert_user(&user).unwrap();
    (db, user)
}

/// Night-only user with back-to-back 90 minute sessions.
fn night_owl(timezone: &str) -> (StudyDb, i64) {
    let db = StudyDb::open_memory().unwrap();
    let mut user = UserProfile::new(0, "Noor");
    user.weekly_hours = 20;
    user.timezone = timezone.to_string();
    user.preferred_times = PreferredTimes {
        morning: false,
        afternoon: false,
        evening: false,
        night: true,
    };
    let user = db.upsert_user(&user).unwrap();
    let pref = StudyPreference {
        preferred_session_length: 90,
        break_duration: 0,
        ..StudyPreference::default()
    };
    db.set_preference(user, &pref).unwrap();
    (db, user)
}

fn add_subject(db: &StudyDb, user: i64, name: &str, priority: u8) -> i64 {
    db.add_subject(&Subject::new(0, user, name, priority, 3).unwrap())
        .unwrap()
}

fn assert_disjoint(sessions: &[SessionDescriptor]) {
    let mut sorted = sessions.to_vec();
    sorted.sort_by_key(|s| s.start_time);
    for pair in sorted.windows(2) {
        assert!(
            pair[0].end_time <= pair[1].start_time,
            "overlap: {:?} / {:?}",
            pair[0],
            pair[1]
        );
    }
}

// ============================================================================
// Generation
// ============================================================================

#[test]
fn urgent_task_is_scheduled_first() {
    let (db, user) = setup(10);
    let capstone = add_subject(&db, user, "Capstone", 2);
    let history = add_subject(&db, user, "History", 5);
    let urgent = db
        .add_task(
            &Task::new(0, capstone, user, "Final report")
                .with_deadline(utc(10, 23, 0))
                .with_estimate(120)
                .with_priority(5),
        )
        .unwrap();
    db.add_task(
        &Task::new(0, history, user, "Reading")
            .with_deadline(utc(14, 12, 0))
            .with_estimate(60),
    )
    .unwrap();

    let plan = plan_schedule(
        &db,
        user,
        monday(),
        monday() + Duration::days(1),
        GenerationOptions::default(),
        early_monday(),
    )
    .unwrap();

    let first = &plan.sessions[0];
    assert_eq!(first.subject_id, capstone);
    assert_eq!(first.task_id, Some(urgent));
    assert_eq!(first.session_type, SessionType::Assignment);
    assert_disjoint(&plan.sessions);
}

#[test]
fn busy_times_and_manual_sessions_are_avoided() {
    let (db, user) = setup(10);
    let math = add_subject(&db, user, "Math", 4);
    add_subject(&db, user, "Art", 2);
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    db.add_constraint(&UserConstraint::new(user, "Dinner", 0, t(18, 0), t(19, 0), true).unwrap())
        .unwrap();
    let manual = StudySession::planned(user, math, utc(10, 20, 0), utc(10, 21, 0)).unwrap();
    let manual_id = db.add_session(&manual).unwrap();
    db.set_locked(user, manual_id, true).unwrap();

    let report = regenerate_schedule(
        &db,
        user,
        monday(),
        monday() + Duration::days(6),
        GenerationOptions::default(),
        early_monday(),
    )
    .unwrap();

    let dinner = (utc(10, 18, 0), utc(10, 19, 0));
    for s in &report.schedule.sessions {
        assert!(!(s.start_time < dinner.1 && s.end_time > dinner.0), "{s:?} hits dinner");
        assert!(!manual.overlaps(s.start_time, s.end_time), "{s:?} hits locked session");
    }

    let stored = db
        .sessions_in_range(user, utc(10, 0, 0), utc(17, 0, 0))
        .unwrap();
    for pair in stored.windows(2) {
        assert!(pair[0].end_time <= pair[1].start_time);
    }
    assert_eq!(report.preserved, 1);
}

#[test]
fn soft_busy_times_can_be_ignored() {
    let (db, user) = setup(10);
    add_subject(&db, user, "Math", 4);
    let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
    db.add_constraint(&UserConstraint::new(user, "TV", 0, t(17), t(22), false).unwrap())
        .unwrap();

    let blocked = plan_schedule(&db, user, monday(), monday(), GenerationOptions::default(), early_monday())
        .unwrap();
    assert!(blocked.sessions.is_empty());
    assert!(blocked
        .warnings
        .iter()
        .any(|w| matches!(w, ScheduleWarning::NoAvailableSlots { .. })));

    let options = GenerationOptions {
        soft_constraints: SoftConstraintPolicy::Ignore,
        ..GenerationOptions::default()
    };
    let ignored = plan_schedule(&db, user, monday(), monday(), options, early_monday()).unwrap();
    assert!(!ignored.sessions.is_empty());
}

#[test]
fn same_input_same_schedule() {
    let (db, user) = setup(12);
    add_subject(&db, user, "Math", 4);
    add_subject(&db, user, "Art", 1);
    let bio = db
        .add_subject(
            &Subject::new(0, user, "Biology", 3, 4)
                .unwrap()
                .with_exam_date(monday() + Duration::days(3)),
        )
        .unwrap();
    db.add_task(&Task::new(0, bio, user, "Lab write-up").with_deadline(utc(12, 9, 0)))
        .unwrap();

    let options = GenerationOptions::default();
    let end = monday() + Duration::days(6);
    let a = plan_schedule(&db, user, monday(), end, options, early_monday()).unwrap();
    let b = plan_schedule(&db, user, monday(), end, options, early_monday()).unwrap();
    assert_eq!(a.sessions, b.sessions);
    assert_eq!(a.warnings, b.warnings);
    assert_disjoint(&a.sessions);
}

#[test]
fn regeneration_preserves_locked_and_completed() {
    let (db, user) = setup(8);
    add_subject(&db, user, "Math", 4);
    add_subject(&db, user, "Art", 2);
    let options = GenerationOptions::default();
    let end = monday() + Duration::days(2);

    let first = regenerate_schedule(&db, user, monday(), end, options, early_monday()).unwrap();
    assert!(first.inserted.len() >= 2);
    let locked_id = first.inserted[0];
    let done_id = first.inserted[1];
    db.set_locked(user, locked_id, true).unwrap();
    db.complete_session(user, done_id, Some(40), Some(4), early_monday())
        .unwrap();
    let locked = db.get_session(user, locked_id).unwrap();
    let done = db.get_session(user, done_id).unwrap();

    let second = regenerate_schedule(&db, user, monday(), end, options, early_monday()).unwrap();
    assert_eq!(second.preserved, 2);
    assert_eq!(db.get_session(user, locked_id).unwrap(), locked);
    assert_eq!(db.get_session(user, done_id).unwrap(), done);
    for s in &second.schedule.sessions {
        assert!(!locked.overlaps(s.start_time, s.end_time));
        assert!(!done.overlaps(s.start_time, s.end_time));
    }
}

#[test]
fn coverage_warning_is_reported() {
    let (db, user) = setup(3);
    let math = add_subject(&db, user, "Math", 3);
    db.add_task(
        &Task::new(0, math, user, "Exam prep")
            .with_deadline(utc(10, 12, 0))
            .with_estimate(240),
    )
    .unwrap();

    let plan = plan_schedule(
        &db,
        user,
        monday(),
        monday() + Duration::days(1),
        GenerationOptions::default(),
        early_monday(),
    )
    .unwrap();
    assert!(plan.warnings.iter().any(|w| matches!(
        w,
        ScheduleWarning::InsufficientHours {
            urgent_minutes: 240,
            ..
        }
    )));
}

#[test]
fn late_sessions_do_not_run_into_the_next_day() {
    let (db, user) = night_owl("UTC");
    let math = add_subject(&db, user, "Math", 4);
    add_subject(&db, user, "Art", 3);
    let next_day = db
        .add_session(&StudySession::planned(user, math, utc(11, 0, 0), utc(11, 1, 0)).unwrap())
        .unwrap();
    let before = db.get_session(user, next_day).unwrap();

    let report = regenerate_schedule(
        &db,
        user,
        monday(),
        monday(),
        GenerationOptions::default(),
        early_monday(),
    )
    .unwrap();
    assert!(!report.inserted.is_empty());
    assert_eq!(db.get_session(user, next_day).unwrap(), before);

    let stored = db
        .sessions_in_range(user, utc(9, 0, 0), utc(13, 0, 0))
        .unwrap();
    for pair in stored.windows(2) {
        assert!(
            pair[0].end_time <= pair[1].start_time,
            "overlap: {:?} / {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn spring_forward_gap_is_skipped() {
    let (db, user) = night_owl("America/New_York");
    add_subject(&db, user, "Math", 4);
    add_subject(&db, user, "Art", 3);
    let dst_day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
    // 23:00 on the 8th in New York
    let now = Utc.with_ymd_and_hms(2025, 3, 9, 4, 0, 0).unwrap();

    let report = regenerate_schedule(&db, user, dst_day, dst_day, GenerationOptions::default(), now)
        .unwrap();

    assert!(!report.schedule.sessions.is_empty());
    for s in &report.schedule.sessions {
        assert_eq!(s.duration_minutes(), 90, "{s:?}");
    }
    assert_disjoint(&report.schedule.sessions);
    assert_eq!(report.inserted.len(), report.schedule.sessions.len());
}
