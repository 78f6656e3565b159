//! Attendance statistics and the CSV export. Percentages count a session
//! as attended only when its record is `present`; `late` is shown in the
//! breakdowns but does not count towards the rate.

use std::cmp::Ordering;

use chrono::NaiveDate;
use db::models::user;
use db::models::{
    attendance_record::{self, AttendanceStatus},
    attendance_session, course, enrollment,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait,
};
use serde::Serialize;

use crate::error::AppError;
use crate::policy::{find_owned_course, require_student};

/// One student's line in a course report.
#[derive(Debug, Clone, Serialize)]
pub struct StudentReportRow {
    pub student_id: i64,
    pub username: String,
    pub email: String,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub total_sessions: u64,
    pub attendance_percentage: f64,
}

/// Headline numbers for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: i64,
    pub date: NaiveDate,
    pub present_count: u64,
    pub enrolled_count: u64,
    pub attendance_rate: f64,
}

/// One course as it appears on a student's own overview.
#[derive(Debug, Clone, Serialize)]
pub struct CourseAttendance {
    pub course: course::Model,
    pub attendance_percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentOverview {
    pub courses: Vec<CourseAttendance>,
    pub average_percentage: f64,
}

/// Percentage of a course's sessions this student was marked present for,
/// rounded to two decimals. A course with no sessions yet reports 0.0.
pub async fn attendance_percentage(
    db: &DatabaseConnection,
    course_id: i64,
    student_id: i64,
) -> Result<f64, AppError> {
    let total = attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course_id))
        .count(db)
        .await?;
    if total == 0 {
        return Ok(0.0);
    }

    let present = attendance_record::Entity::find()
        .filter(attendance_record::Column::StudentId.eq(student_id))
        .filter(attendance_record::Column::Status.eq(AttendanceStatus::Present))
        .filter(attendance_record::Column::SessionId.in_subquery(course_session_ids(course_id)))
        .count(db)
        .await?;

    Ok(round2(present as f64 * 100.0 / total as f64))
}

/// Per-student attendance breakdown for an owned course, best rate first.
pub async fn course_report(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<Vec<StudentReportRow>, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    let total_sessions = attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course.id))
        .count(db)
        .await?;

    let enrollments = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course.id))
        .order_by_asc(enrollment::Column::Id)
        .all(db)
        .await?;

    let mut rows = Vec::with_capacity(enrollments.len());
    for e in enrollments {
        let Some(student) = user::Entity::find_by_id(e.student_id).one(db).await? else {
            continue;
        };

        let records = attendance_record::Entity::find()
            .filter(attendance_record::Column::StudentId.eq(student.id))
            .filter(attendance_record::Column::SessionId.in_subquery(course_session_ids(course.id)))
            .all(db)
            .await?;

        let count_of = |status: AttendanceStatus| {
            records.iter().filter(|r| r.status == status).count() as u64
        };

        let present = count_of(AttendanceStatus::Present);
        let attendance_percentage = if total_sessions == 0 {
            0.0
        } else {
            round1(present as f64 * 100.0 / total_sessions as f64)
        };

        rows.push(StudentReportRow {
            student_id: student.id,
            username: student.username,
            email: student.email,
            present,
            absent: count_of(AttendanceStatus::Absent),
            late: count_of(AttendanceStatus::Late),
            total_sessions,
            attendance_percentage,
        });
    }

    rows.sort_by(|a, b| {
        b.attendance_percentage
            .partial_cmp(&a.attendance_percentage)
            .unwrap_or(Ordering::Equal)
    });
    Ok(rows)
}

/// Present/enrolled counts for every session of an owned course, oldest
/// first.
pub async fn session_summaries(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<Vec<SessionSummary>, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    let enrolled_count = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course.id))
        .count(db)
        .await?;

    let sessions = attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course.id))
        .order_by_asc(attendance_session::Column::Date)
        .all(db)
        .await?;

    let mut summaries = Vec::with_capacity(sessions.len());
    for s in sessions {
        let present_count = attendance_record::Entity::find()
            .filter(attendance_record::Column::SessionId.eq(s.id))
            .filter(attendance_record::Column::Status.eq(AttendanceStatus::Present))
            .count(db)
            .await?;

        let attendance_rate = if enrolled_count == 0 {
            0.0
        } else {
            round1(present_count as f64 * 100.0 / enrolled_count as f64)
        };

        summaries.push(SessionSummary {
            session_id: s.id,
            date: s.date,
            present_count,
            enrolled_count,
            attendance_rate,
        });
    }

    Ok(summaries)
}

/// A student's attendance across all their courses, with the plain average
/// of the per-course percentages.
pub async fn student_overview(
    db: &DatabaseConnection,
    student: &user::Model,
) -> Result<StudentOverview, AppError> {
    require_student(student)?;

    let enrollments = enrollment::Entity::find()
        .filter(enrollment::Column::StudentId.eq(student.id))
        .order_by_asc(enrollment::Column::Id)
        .all(db)
        .await?;

    let mut courses = Vec::with_capacity(enrollments.len());
    for e in enrollments {
        let Some(course) = course::Entity::find_by_id(e.course_id).one(db).await? else {
            continue;
        };
        let pct = attendance_percentage(db, course.id, student.id).await?;
        courses.push(CourseAttendance {
            course,
            attendance_percentage: pct,
        });
    }

    let average_percentage = if courses.is_empty() {
        0.0
    } else {
        round1(
            courses.iter().map(|c| c.attendance_percentage).sum::<f64>() / courses.len() as f64,
        )
    };

    Ok(StudentOverview {
        courses,
        average_percentage,
    })
}

/// Render the full course attendance matrix as CSV text: one row per
/// student, one column per session date, then the totals. Students missing
/// a record for a session (enrolled after it ran) show `N/A`.
pub async fn export_course_csv(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<String, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    let sessions = attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course.id))
        .order_by_asc(attendance_session::Column::Date)
        .all(db)
        .await?;

    let rows = course_report(db, teacher, course_id).await?;

    let mut header = vec![
        "Student ID".to_string(),
        "Student Name".to_string(),
        "Email".to_string(),
    ];
    for s in &sessions {
        header.push(format!("Session {}", s.date));
    }
    header.extend([
        "Present".to_string(),
        "Absent".to_string(),
        "Late".to_string(),
        "Attendance %".to_string(),
    ]);

    let mut csv = String::new();
    csv.push_str(&header.iter().map(|h| esc(h)).collect::<Vec<_>>().join(","));
    csv.push('\n');

    for row in &rows {
        let mut cells = vec![
            row.student_id.to_string(),
            esc(&row.username),
            esc(&row.email),
        ];

        for s in &sessions {
            let record = attendance_record::Entity::find_by_id((s.id, row.student_id))
                .one(db)
                .await?;
            cells.push(match record {
                Some(r) => r.status.to_string(),
                None => "N/A".to_string(),
            });
        }

        cells.push(row.present.to_string());
        cells.push(row.absent.to_string());
        cells.push(row.late.to_string());
        cells.push(format!("{:.1}%", row.attendance_percentage));

        csv.push_str(&cells.join(","));
        csv.push('\n');
    }

    Ok(csv)
}

fn course_session_ids(course_id: i64) -> sea_orm::sea_query::SelectStatement {
    attendance_session::Entity::find()
        .select_only()
        .column(attendance_session::Column::Id)
        .filter(attendance_session::Column::CourseId.eq(course_id))
        .into_query()
}

fn esc(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
