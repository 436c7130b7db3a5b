use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use db::{
    models::{Attendance, LeaveStatus, Session},
    Database,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Inclusive window on session start times
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    /// Builds a range from the `start`/`end` query parameters. Filtering only applies when both
    /// bounds are given; a bare date means the whole day.
    pub fn from_query<Tz: TimeZone>(
        start: Option<&str>,
        end: Option<&str>,
        tz: &Tz,
    ) -> Result<Option<Self>, String> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(Self {
                start: parse_bound(start, tz, false)?,
                end: parse_bound(end, tz, true)?,
            })),
            _ => Ok(None),
        }
    }
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date; dates resolve to the first (or, with
/// `end_of_day`, the last) millisecond of that day in `tz`.
pub fn parse_bound<Tz: TimeZone>(
    value: &str,
    tz: &Tz,
    end_of_day: bool,
) -> Result<DateTime<Utc>, String> {
    let value = value.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date: {}", value))?;

    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| format!("Invalid date: {}", value))?;

    Ok(local_to_utc(tz, &time))
}

fn local_to_utc<Tz: TimeZone>(tz: &Tz, time: &NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(time)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(time))
}

fn local_date<Tz: TimeZone>(time: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    time.with_timezone(tz).date_naive()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Minutes to hours, rounded to 2 decimals
pub fn hours(minutes: u64) -> f64 {
    round2(minutes as f64 / 60.0)
}

/// Sum of the durations; sessions still in progress count as zero
pub fn total_minutes<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> u64 {
    sessions.into_iter().map(|s| s.minutes() as u64).sum()
}

fn in_range(range: &Option<DateRange>, session: &Session) -> bool {
    range.map(|r| r.contains(session.start_time)).unwrap_or(true)
}

#[derive(Serialize, Default, Debug, PartialEq)]
pub struct LeaveCounts {
    pub approved: u32,
    pub rejected: u32,
    pub pending: u32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TutorReport {
    pub tutor_id: u32,
    pub name: String,
    pub total_hours: f64,
    pub total_sessions: usize,
    pub leaves: LeaveCounts,
}

/// Hours taught, sessions given and leave decisions, per tutor
pub fn tutor_report(db: &impl Database, range: Option<DateRange>) -> Vec<TutorReport> {
    let (_, tutors) = db.tutor_list(None, None);
    let sessions = db.session_list();

    tutors
        .into_iter()
        .map(|tutor| {
            let own: Vec<&Session> = sessions
                .iter()
                .copied()
                .filter(|s| s.tutor_id == tutor.id && in_range(&range, s))
                .collect();

            let mut leaves = LeaveCounts::default();
            for leave in db.leave_list(Some(tutor.id)) {
                match leave.status {
                    LeaveStatus::Approved => leaves.approved += 1,
                    LeaveStatus::Rejected => leaves.rejected += 1,
                    LeaveStatus::Pending => leaves.pending += 1,
                }
            }

            TutorReport {
                tutor_id: tutor.id,
                name: user_name(db, tutor.user_id),
                total_hours: hours(total_minutes(own.iter().copied())),
                total_sessions: own.len(),
                leaves,
            }
        })
        .collect()
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: u32,
    pub name: String,
    pub total_sessions: usize,
    /// subject -> minutes
    pub subject_wise_time: BTreeMap<String, u64>,
    pub days_active: usize,
}

/// Sessions attended, time per subject and number of distinct days with a session, per student
pub fn student_report<Tz: TimeZone>(
    db: &impl Database,
    range: Option<DateRange>,
    tz: &Tz,
) -> Vec<StudentReport> {
    let (_, students) = db.student_list(None, None);

    students
        .into_iter()
        .map(|student| {
            let sessions: Vec<&Session> = db
                .session_list_by_student(student.id)
                .into_iter()
                .filter(|s| in_range(&range, s))
                .collect();

            let mut subject_wise_time = BTreeMap::new();
            for session in &sessions {
                *subject_wise_time
                    .entry(session.subject.clone())
                    .or_insert(0u64) += session.minutes() as u64;
            }

            let days: HashSet<NaiveDate> = sessions
                .iter()
                .map(|s| local_date(s.start_time, tz))
                .collect();

            StudentReport {
                student_id: student.id,
                name: user_name(db, student.user_id),
                total_sessions: sessions.len(),
                subject_wise_time,
                days_active: days.len(),
            }
        })
        .collect()
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AcademySummary {
    pub date: String,
    pub active_tutors: usize,
    pub total_sessions: usize,
    pub total_teaching_hours: f64,
}

/// Activity of the whole academy on one calendar day of `tz`
pub fn academy_summary<Tz: TimeZone>(
    db: &impl Database,
    date: NaiveDate,
    tz: &Tz,
) -> AcademySummary {
    let sessions: Vec<&Session> = db
        .session_list()
        .into_iter()
        .filter(|s| local_date(s.start_time, tz) == date)
        .collect();

    let tutors: HashSet<u32> = sessions.iter().map(|s| s.tutor_id).collect();

    AcademySummary {
        date: date.format("%Y-%m-%d").to_string(),
        active_tutors: tutors.len(),
        total_sessions: sessions.len(),
        total_teaching_hours: hours(total_minutes(sessions.iter().copied())),
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_tutors: usize,
    pub total_students: usize,
    pub total_sessions: usize,
    pub total_hours: f64,
}

pub fn overall_stats(db: &impl Database) -> OverallStats {
    let sessions = db.session_list();

    OverallStats {
        total_tutors: db.tutor_count(),
        total_students: db.student_count(),
        total_sessions: sessions.len(),
        total_hours: hours(total_minutes(sessions.iter().copied())),
    }
}

/// Sunday to Saturday week containing `today`
pub fn week_of(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today - Duration::days(today.weekday().num_days_from_sunday() as i64);
    (start, start + Duration::days(6))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyProgress {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sessions: usize,
    pub total_duration_minutes: u64,
    pub sessions: Vec<Session>,
}

pub fn weekly_progress<Tz: TimeZone>(
    db: &impl Database,
    student_id: u32,
    today: NaiveDate,
    tz: &Tz,
) -> WeeklyProgress {
    let (start_date, end_date) = week_of(today);

    let sessions: Vec<Session> = db
        .session_list_by_student(student_id)
        .into_iter()
        .filter(|s| {
            let day = local_date(s.start_time, tz);
            start_date <= day && day <= end_date
        })
        .cloned()
        .collect();

    WeeklyProgress {
        start_date,
        end_date,
        total_sessions: sessions.len(),
        total_duration_minutes: total_minutes(&sessions),
        sessions,
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDay {
    pub tutor_id: u32,
    pub date: NaiveDate,
    pub total_minutes: u64,
}

/// Minutes worked per tutor and day, from closed attendance records
pub fn attendance_summary<Tz: TimeZone>(
    records: &[&Attendance],
    range: Option<DateRange>,
    tz: &Tz,
) -> Vec<AttendanceDay> {
    let mut days: BTreeMap<(u32, NaiveDate), u64> = BTreeMap::new();

    for record in records {
        let minutes = match record.duration {
            Some(minutes) => minutes as u64,
            None => continue,
        };

        if !range.map(|r| r.contains(record.login_time)).unwrap_or(true) {
            continue;
        }

        *days
            .entry((record.tutor_id, local_date(record.login_time, tz)))
            .or_insert(0) += minutes;
    }

    days.into_iter()
        .map(|((tutor_id, date), total_minutes)| AttendanceDay {
            tutor_id,
            date,
            total_minutes,
        })
        .collect()
}

fn user_name(db: &impl Database, user_id: u32) -> String {
    db.user_get(user_id)
        .map(|u| u.name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::{Enrolled, JSONDatabase, NewAccount, NewLeave, NewSession};

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn account(email: &str) -> NewAccount {
        NewAccount {
            name: email.split('@').next().unwrap_or("").to_string(),
            email: email.to_string(),
            password_hash: String::new(),
        }
    }

    fn teach(
        db: &mut JSONDatabase,
        tutor: Enrolled,
        student: Enrolled,
        subject: &str,
        from: DateTime<Utc>,
        minutes: i64,
    ) {
        let session = db
            .session_start(
                tutor.user_id,
                NewSession {
                    student_id: student.profile_id,
                    subject: subject.to_string(),
                    topic: "topic".to_string(),
                },
                from,
            )
            .unwrap();
        db.session_end(
            tutor.user_id,
            session.id,
            "https://proof",
            from + Duration::minutes(minutes),
        )
        .unwrap();
    }

    /// Two tutors, two students, four sessions over two days
    fn academy() -> (JSONDatabase, Enrolled, Enrolled, Enrolled, Enrolled) {
        let mut db = JSONDatabase::in_memory();
        let alice = db.tutor_add(account("alice@x.com"), at(1, 8, 0)).unwrap();
        let bob = db.tutor_add(account("bob@x.com"), at(1, 8, 0)).unwrap();
        let sam = db.student_add(account("sam@x.com"), None, at(1, 8, 0)).unwrap();
        let zoe = db.student_add(account("zoe@x.com"), None, at(1, 8, 0)).unwrap();

        teach(&mut db, alice, sam, "Maths", at(4, 9, 0), 50);
        teach(&mut db, alice, sam, "Physics", at(4, 14, 0), 25);
        teach(&mut db, bob, zoe, "Maths", at(4, 10, 0), 45);
        teach(&mut db, alice, sam, "Maths", at(5, 9, 0), 40);

        (db, alice, bob, sam, zoe)
    }

    #[test]
    fn overall_hours_are_total_minutes_over_sixty() {
        let (db, ..) = academy();

        let stats = overall_stats(&db);

        assert_eq!(stats.total_tutors, 2);
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.total_sessions, 4);
        // 160 minutes
        assert_eq!(stats.total_hours, 2.67);
    }

    #[test]
    fn open_sessions_count_as_zero_minutes() {
        let (mut db, _, bob, _, zoe) = academy();
        db.session_start(
            bob.user_id,
            NewSession {
                student_id: zoe.profile_id,
                subject: "Maths".to_string(),
                topic: "open".to_string(),
            },
            at(6, 9, 0),
        )
        .unwrap();

        let stats = overall_stats(&db);
        assert_eq!(stats.total_sessions, 5);
        assert_eq!(stats.total_hours, 2.67);
    }

    #[test]
    fn tutor_report_with_range_and_leaves() {
        let (mut db, alice, ..) = academy();
        let admin = db.admin_ensure(account("admin@x.com"), at(1, 8, 0)).unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2024, 4, d).unwrap();
        for _ in 0..2 {
            db.leave_apply(
                alice.user_id,
                NewLeave {
                    start_date: day(1),
                    end_date: day(2),
                    reason: "rest".to_string(),
                },
                at(1, 8, 0),
            )
            .unwrap();
        }
        db.leave_set_status(1, admin.id, LeaveStatus::Approved, at(1, 9, 0))
            .unwrap();

        let all = tutor_report(&db, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "alice");
        assert_eq!(all[0].total_sessions, 3);
        // 115 minutes
        assert_eq!(all[0].total_hours, 1.92);
        assert_eq!(
            all[0].leaves,
            LeaveCounts {
                approved: 1,
                rejected: 0,
                pending: 1
            }
        );

        let range = DateRange::from_query(Some("2024-03-04"), Some("2024-03-04"), &Utc)
            .unwrap()
            .unwrap();
        let fourth = tutor_report(&db, Some(range));
        assert_eq!(fourth[0].total_sessions, 2);
        assert_eq!(fourth[0].total_hours, 1.25);
        assert_eq!(fourth[1].total_sessions, 1);
    }

    #[test]
    fn student_report_breaks_down_subjects_and_days() {
        let (db, ..) = academy();

        let report = student_report(&db, None, &Utc);
        let sam = &report[0];

        assert_eq!(sam.total_sessions, 3);
        assert_eq!(sam.subject_wise_time.get("Maths"), Some(&90));
        assert_eq!(sam.subject_wise_time.get("Physics"), Some(&25));
        assert_eq!(sam.days_active, 2);
        assert_eq!(report[1].days_active, 1);
    }

    #[test]
    fn academy_summary_for_one_day() {
        let (db, ..) = academy();

        let summary = academy_summary(&db, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(), &Utc);

        assert_eq!(summary.date, "2024-03-04");
        assert_eq!(summary.active_tutors, 2);
        assert_eq!(summary.total_sessions, 3);
        assert_eq!(summary.total_teaching_hours, 2.0);

        let empty = academy_summary(&db, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(), &Utc);
        assert_eq!(empty.total_sessions, 0);
        assert_eq!(empty.total_teaching_hours, 0.0);
    }

    #[test]
    fn only_a_full_range_filters() {
        assert_eq!(DateRange::from_query(Some("2024-03-04"), None, &Utc), Ok(None));
        assert!(DateRange::from_query(Some("yesterday"), Some("2024-03-04"), &Utc).is_err());

        let range = DateRange::from_query(
            Some("2024-03-04T09:30:00Z"),
            Some("2024-03-05"),
            &Utc,
        )
        .unwrap()
        .unwrap();
        assert!(!range.contains(at(4, 9, 0)));
        assert!(range.contains(at(5, 23, 59)));
    }

    #[test]
    fn weeks_start_on_sunday() {
        // 2024-03-06 is a Wednesday
        let (start, end) = week_of(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());

        let (db, _, _, sam, _) = academy();
        let wednesday = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        let progress = weekly_progress(&db, sam.profile_id, wednesday, &Utc);
        assert_eq!(progress.total_sessions, 3);
        assert_eq!(progress.total_duration_minutes, 115);
    }

    #[test]
    fn attendance_is_summed_per_tutor_and_day() {
        let (mut db, alice, bob, ..) = academy();
        db.attendance_login(alice.user_id, at(4, 8, 0)).unwrap();
        db.attendance_logout(alice.user_id, at(4, 12, 0)).unwrap();
        db.attendance_login(alice.user_id, at(4, 13, 0)).unwrap();
        db.attendance_logout(alice.user_id, at(4, 15, 30)).unwrap();
        db.attendance_login(bob.user_id, at(4, 9, 0)).unwrap();

        let records = db.attendance_list(None);
        let summary = attendance_summary(&records, None, &Utc);

        assert_eq!(
            summary,
            vec![AttendanceDay {
                tutor_id: alice.profile_id,
                date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                total_minutes: 390,
            }]
        );
    }
}
