use chrono::{DateTime, Utc};
use db::models::{course, enrollment, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::error::{AppError, is_unique_violation};
use crate::policy::{find_owned_course, require_student};
use crate::report;

pub use db::models::enrollment::Model as Enrollment;

/// One enrolled student as a teacher sees them on the course roster.
#[derive(Debug, Clone, Serialize)]
pub struct CourseStudent {
    pub student_id: i64,
    pub username: String,
    pub email: String,
    pub enrolled_at: DateTime<Utc>,
    pub attendance_percentage: f64,
    pub face_registered: bool,
}

/// Student self-enrollment. Duplicate enrollment is rejected; the unique
/// (student, course) index backs the check.
pub async fn enroll(
    db: &DatabaseConnection,
    student: &user::Model,
    course_id: i64,
) -> Result<Enrollment, AppError> {
    require_student(student)?;

    course::Entity::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("course"))?;

    if crate::policy::is_enrolled(db, course_id, student.id).await? {
        return Err(AppError::ConstraintViolation(
            "already enrolled in this course".into(),
        ));
    }

    let new_enrollment = enrollment::ActiveModel {
        student_id: Set(student.id),
        course_id: Set(course_id),
        ..Default::default()
    };

    new_enrollment.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::ConstraintViolation("already enrolled in this course".into())
        } else {
            AppError::from(e)
        }
    })
}

/// Student leaves a course on their own.
pub async fn unenroll(
    db: &DatabaseConnection,
    student: &user::Model,
    course_id: i64,
) -> Result<(), AppError> {
    require_student(student)?;
    delete_enrollment(db, course_id, student.id).await
}

/// Teacher removes a student from an owned course.
pub async fn remove_student(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
    student_id: i64,
) -> Result<(), AppError> {
    find_owned_course(db, teacher, course_id).await?;
    delete_enrollment(db, course_id, student_id).await
}

async fn delete_enrollment(
    db: &DatabaseConnection,
    course_id: i64,
    student_id: i64,
) -> Result<(), AppError> {
    let found = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::StudentId.eq(student_id))
        .one(db)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    enrollment::Entity::delete_by_id(found.id).exec(db).await?;
    Ok(())
}

/// Courses the student can still enroll in.
pub async fn available_courses(
    db: &DatabaseConnection,
    student: &user::Model,
) -> Result<Vec<course::Model>, AppError> {
    require_student(student)?;

    let enrolled_ids: Vec<i64> = enrollment::Entity::find()
        .filter(enrollment::Column::StudentId.eq(student.id))
        .all(db)
        .await?
        .into_iter()
        .map(|e| e.course_id)
        .collect();

    let mut query = course::Entity::find();
    if !enrolled_ids.is_empty() {
        query = query.filter(course::Column::Id.is_not_in(enrolled_ids));
    }

    Ok(query.all(db).await?)
}

/// Roster of an owned course: per student, enrollment date, attendance
/// percentage and whether a face is registered.
pub async fn course_students(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<Vec<CourseStudent>, AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    let enrollments = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course.id))
        .order_by_asc(enrollment::Column::Id)
        .all(db)
        .await?;

    let mut students = Vec::with_capacity(enrollments.len());
    for e in enrollments {
        let Some(student) = user::Entity::find_by_id(e.student_id).one(db).await? else {
            continue;
        };

        let attendance_percentage =
            report::attendance_percentage(db, course.id, student.id).await?;

        students.push(CourseStudent {
            student_id: student.id,
            username: student.username,
            email: student.email,
            enrolled_at: e.enrolled_at,
            attendance_percentage,
            face_registered: student.face_encoding.is_some(),
        });
    }

    Ok(students)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::create_course;
    use db::models::user::{Model as UserModel, Role};
    use db::test_utils::setup_test_db;

    async fn seed(db: &DatabaseConnection) -> (UserModel, UserModel, course::Model) {
        let t = UserModel::create(db, "t1", "t1@test.com", "pw", Role::Teacher)
            .await
            .unwrap();
        let s = UserModel::create(db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();
        let c = create_course(db, &t, "Programming", "CS101", None)
            .await
            .unwrap();
        (t, s, c)
    }

    #[tokio::test]
    async fn test_enroll_and_double_enroll() {
        let db = setup_test_db().await;
        let (_t, s, c) = seed(&db).await;

        let e = enroll(&db, &s, c.id).await.unwrap();
        assert_eq!(e.student_id, s.id);
        assert_eq!(e.course_id, c.id);

        let dup = enroll(&db, &s, c.id).await;
        assert!(matches!(dup, Err(AppError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_available_courses_excludes_enrolled() {
        let db = setup_test_db().await;
        let (t, s, c) = seed(&db).await;
        let other = create_course(&db, &t, "Databases", "CS204", None)
            .await
            .unwrap();

        assert_eq!(available_courses(&db, &s).await.unwrap().len(), 2);

        enroll(&db, &s, c.id).await.unwrap();

        let available = available_courses(&db, &s).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, other.id);
    }

    #[tokio::test]
    async fn test_remove_student_requires_ownership() {
        let db = setup_test_db().await;
        let (t, s, c) = seed(&db).await;
        let intruder = UserModel::create(&db, "t2", "t2@test.com", "pw", Role::Teacher)
            .await
            .unwrap();

        enroll(&db, &s, c.id).await.unwrap();

        let denied = remove_student(&db, &intruder, c.id, s.id).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        remove_student(&db, &t, c.id, s.id).await.unwrap();
        assert!(!crate::policy::is_enrolled(&db, c.id, s.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unenroll_missing_enrollment_is_not_found() {
        let db = setup_test_db().await;
        let (_t, s, c) = seed(&db).await;

        let missing = unenroll(&db, &s, c.id).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_course_students_reports_roster() {
        let db = setup_test_db().await;
        let (t, s, c) = seed(&db).await;
        enroll(&db, &s, c.id).await.unwrap();

        let roster = course_students(&db, &t, c.id).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].username, "s1");
        assert_eq!(roster[0].attendance_percentage, 0.0);
        assert!(!roster[0].face_registered);
    }
}
