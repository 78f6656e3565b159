use chrono::{NaiveDate, Utc};
use db::models::user;
use db::models::{
    attendance_record::{self, AttendanceStatus, MarkSource},
    attendance_session, enrollment,
};
use face::{FaceDetector, FeatureVector, compare_faces, extract_feature};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;

use crate::error::{AppError, is_unique_violation};
use crate::policy::{find_owned_course, is_enrolled};

pub use db::models::attendance_record::Model as AttendanceRecord;
pub use db::models::attendance_session::Model as AttendanceSession;

/// One roster row of a session: the student plus their current record.
#[derive(Debug, Clone, Serialize)]
pub struct RosterEntry {
    pub student_id: i64,
    pub username: String,
    pub email: String,
    pub status: AttendanceStatus,
    pub marked_by: MarkSource,
}

/// Open an attendance session for one course day.
///
/// Every currently enrolled student gets an `absent` record up front, so the
/// roster is complete from the first moment and marking is always an update.
/// At most one session may exist per (course, date).
pub async fn create_session(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
    date: NaiveDate,
) -> Result<AttendanceSession, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    // Fast path; the unique (course, date) index is the real guard.
    let existing = attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course.id))
        .filter(attendance_session::Column::Date.eq(date))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::DuplicateSession);
    }

    let enrollments = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course.id))
        .all(db)
        .await?;

    let txn = db.begin().await?;

    let session = attendance_session::ActiveModel {
        course_id: Set(course.id),
        date: Set(date),
        start_time: Set(Utc::now().time()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::DuplicateSession
        } else {
            AppError::from(e)
        }
    })?;

    for e in &enrollments {
        attendance_record::ActiveModel {
            session_id: Set(session.id),
            student_id: Set(e.student_id),
            status: Set(AttendanceStatus::Absent),
            marked_by: Set(MarkSource::System),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;

    log::info!(
        "Session {} opened for course {} on {} ({} students seeded absent)",
        session.id,
        course.code,
        date,
        enrollments.len()
    );
    Ok(session)
}

/// Teacher manually sets a student's status for an owned session.
pub async fn mark_attendance(
    db: &DatabaseConnection,
    teacher: &user::Model,
    session_id: i64,
    student_id: i64,
    status: AttendanceStatus,
) -> Result<AttendanceRecord, AppError> {
    let session = find_owned_session(db, teacher, session_id).await?;
    mark_for_session(db, &session, student_id, status, MarkSource::Manual).await
}

/// Identify a student from a transmitted image and mark them present.
///
/// The probe is compared against the registered faces of the session's
/// enrolled students in enrollment order; the first match within `tolerance`
/// wins. Nothing is written when extraction or matching fails.
pub async fn mark_via_face_match<D>(
    db: &DatabaseConnection,
    teacher: &user::Model,
    detector: &mut D,
    session_id: i64,
    image_data: &str,
    tolerance: f64,
) -> Result<(AttendanceRecord, user::Model), AppError>
where
    D: FaceDetector + ?Sized,
{
    let session = find_owned_session(db, teacher, session_id).await?;

    let probe = extract_feature(detector, image_data).ok_or(AppError::NoFaceDetected)?;

    let enrollments = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(session.course_id))
        .order_by_asc(enrollment::Column::Id)
        .all(db)
        .await?;

    for e in enrollments {
        let Some(student) = user::Entity::find_by_id(e.student_id).one(db).await? else {
            continue;
        };
        let known = student.face_encoding_vec().map(FeatureVector::from);

        if compare_faces(known.as_ref(), Some(&probe), tolerance) {
            let record = mark_for_session(
                db,
                &session,
                student.id,
                AttendanceStatus::Present,
                MarkSource::System,
            )
            .await?;
            log::info!(
                "Face match: student {} marked present in session {}",
                student.id,
                session.id
            );
            return Ok((record, student));
        }
    }

    Err(AppError::NoMatchFound)
}

/// Close a session by stamping its end time. Idempotent.
pub async fn close_session(
    db: &DatabaseConnection,
    teacher: &user::Model,
    session_id: i64,
) -> Result<AttendanceSession, AppError> {
    let session = find_owned_session(db, teacher, session_id).await?;
    if !session.is_open() {
        return Ok(session);
    }

    let mut active: attendance_session::ActiveModel = session.into();
    active.end_time = Set(Some(Utc::now().time()));
    Ok(active.update(db).await?)
}

/// Sessions of an owned course, newest date first.
pub async fn course_sessions(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<Vec<AttendanceSession>, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    Ok(attendance_session::Entity::find()
        .filter(attendance_session::Column::CourseId.eq(course.id))
        .order_by_desc(attendance_session::Column::Date)
        .all(db)
        .await?)
}

/// Full roster of a session with each student's current status.
pub async fn session_roster(
    db: &DatabaseConnection,
    teacher: &user::Model,
    session_id: i64,
) -> Result<Vec<RosterEntry>, AppError> {
    let session = find_owned_session(db, teacher, session_id).await?;

    let records = attendance_record::Entity::find()
        .filter(attendance_record::Column::SessionId.eq(session.id))
        .order_by_asc(attendance_record::Column::StudentId)
        .all(db)
        .await?;

    let mut roster = Vec::with_capacity(records.len());
    for r in records {
        let Some(student) = user::Entity::find_by_id(r.student_id).one(db).await? else {
            continue;
        };
        roster.push(RosterEntry {
            student_id: student.id,
            username: student.username,
            email: student.email,
            status: r.status,
            marked_by: r.marked_by,
        });
    }

    Ok(roster)
}

/// Upsert one student's record in a session. Enrollment is checked so a
/// session never accumulates records for outsiders; students enrolled after
/// the session opened get their record created here.
async fn mark_for_session(
    db: &DatabaseConnection,
    session: &AttendanceSession,
    student_id: i64,
    status: AttendanceStatus,
    source: MarkSource,
) -> Result<AttendanceRecord, AppError> {
    if !is_enrolled(db, session.course_id, student_id).await? {
        return Err(AppError::NotEnrolled);
    }

    let existing = attendance_record::Entity::find_by_id((session.id, student_id))
        .one(db)
        .await?;

    let record = match existing {
        Some(found) => {
            let mut active: attendance_record::ActiveModel = found.into();
            active.status = Set(status);
            active.marked_by = Set(source);
            active.marked_at = Set(Utc::now());
            active.update(db).await?
        }
        None => {
            attendance_record::ActiveModel {
                session_id: Set(session.id),
                student_id: Set(student_id),
                status: Set(status),
                marked_by: Set(source),
                ..Default::default()
            }
            .insert(db)
            .await?
        }
    };

    Ok(record)
}

async fn find_owned_session(
    db: &DatabaseConnection,
    teacher: &user::Model,
    session_id: i64,
) -> Result<AttendanceSession, AppError> {
    let session = attendance_session::Entity::find_by_id(session_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("attendance session"))?;

    find_owned_course(db, teacher, session.course_id).await?;
    Ok(session)
}
