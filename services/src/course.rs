use chrono::Utc;
use db::models::{attendance_session, course, enrollment, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::Serialize;

use crate::error::{AppError, is_unique_violation};
use crate::policy::{find_owned_course, require_teacher};

pub use db::models::course::Model as Course;

/// A teacher's course with its headline counts.
#[derive(Debug, Clone, Serialize)]
pub struct CourseSummary {
    pub course: Course,
    pub enrollment_count: u64,
    pub session_count: u64,
}

pub async fn create_course(
    db: &DatabaseConnection,
    teacher: &user::Model,
    name: &str,
    code: &str,
    description: Option<&str>,
) -> Result<Course, AppError> {
    require_teacher(teacher)?;

    // Fast path; the unique index on `code` is the real guard.
    if find_by_code(db, code).await?.is_some() {
        return Err(AppError::ConstraintViolation(
            "course code already exists".into(),
        ));
    }

    let new_course = course::ActiveModel {
        name: Set(name.to_owned()),
        code: Set(code.to_owned()),
        description: Set(description.map(|s| s.to_owned())),
        teacher_id: Set(teacher.id),
        ..Default::default()
    };

    let created = new_course.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::ConstraintViolation("course code already exists".into())
        } else {
            AppError::from(e)
        }
    })?;

    log::info!("Course {} created by teacher {}", created.code, teacher.id);
    Ok(created)
}

pub async fn edit_course(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
    name: &str,
    code: &str,
    description: Option<&str>,
) -> Result<Course, AppError> {
    let existing = find_owned_course(db, teacher, course_id).await?;

    if let Some(other) = find_by_code(db, code).await? {
        if other.id != course_id {
            return Err(AppError::ConstraintViolation(
                "course code already exists".into(),
            ));
        }
    }

    let mut active: course::ActiveModel = existing.into();
    active.name = Set(name.to_owned());
    active.code = Set(code.to_owned());
    active.description = Set(description.map(|s| s.to_owned()));
    active.updated_at = Set(Utc::now());

    active.update(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::ConstraintViolation("course code already exists".into())
        } else {
            AppError::from(e)
        }
    })
}

/// Deletes the course; enrollments and sessions go with it via the
/// cascading foreign keys.
pub async fn delete_course(
    db: &DatabaseConnection,
    teacher: &user::Model,
    course_id: i64,
) -> Result<(), AppError> {
    let course = find_owned_course(db, teacher, course_id).await?;

    course::Entity::delete_by_id(course.id).exec(db).await?;
    log::info!("Course {} deleted by teacher {}", course_id, teacher.id);
    Ok(())
}

/// All courses taught by this teacher, with enrollment and session counts.
pub async fn list_courses(
    db: &DatabaseConnection,
    teacher: &user::Model,
) -> Result<Vec<CourseSummary>, AppError> {
    require_teacher(teacher)?;

    let courses = course::Entity::find()
        .filter(course::Column::TeacherId.eq(teacher.id))
        .all(db)
        .await?;

    let mut summaries = Vec::with_capacity(courses.len());
    for c in courses {
        let enrollment_count = enrollment::Entity::find()
            .filter(enrollment::Column::CourseId.eq(c.id))
            .count(db)
            .await?;
        let session_count = attendance_session::Entity::find()
            .filter(attendance_session::Column::CourseId.eq(c.id))
            .count(db)
            .await?;

        summaries.push(CourseSummary {
            course: c,
            enrollment_count,
            session_count,
        });
    }

    Ok(summaries)
}

async fn find_by_code(db: &DatabaseConnection, code: &str) -> Result<Option<Course>, AppError> {
    Ok(course::Entity::find()
        .filter(course::Column::Code.eq(code))
        .one(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::models::user::{Model as UserModel, Role};
    use db::test_utils::setup_test_db;

    async fn teacher(db: &DatabaseConnection, name: &str) -> UserModel {
        UserModel::create(db, name, &format!("{name}@test.com"), "pw", Role::Teacher)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_list_courses() {
        let db = setup_test_db().await;
        let t = teacher(&db, "t1").await;

        create_course(&db, &t, "Programming", "CS101", Some("Intro"))
            .await
            .unwrap();
        create_course(&db, &t, "Databases", "CS204", None)
            .await
            .unwrap();

        let summaries = list_courses(&db, &t).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.enrollment_count == 0));
    }

    #[tokio::test]
    async fn test_duplicate_course_code_rejected() {
        let db = setup_test_db().await;
        let t = teacher(&db, "t1").await;

        create_course(&db, &t, "Programming", "CS101", None)
            .await
            .unwrap();
        let dup = create_course(&db, &t, "Other", "CS101", None).await;

        assert!(matches!(dup, Err(AppError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_student_cannot_create_course() {
        let db = setup_test_db().await;
        let s = UserModel::create(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();

        let result = create_course(&db, &s, "Programming", "CS101", None).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_only_owner_can_delete() {
        let db = setup_test_db().await;
        let owner = teacher(&db, "owner").await;
        let other = teacher(&db, "other").await;

        let c = create_course(&db, &owner, "Programming", "CS101", None)
            .await
            .unwrap();

        let denied = delete_course(&db, &other, c.id).await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        delete_course(&db, &owner, c.id).await.unwrap();
        assert!(course::Entity::find_by_id(c.id).one(&db).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_course_checks_code_uniqueness() {
        let db = setup_test_db().await;
        let t = teacher(&db, "t1").await;

        let a = create_course(&db, &t, "A", "CS101", None).await.unwrap();
        create_course(&db, &t, "B", "CS102", None).await.unwrap();

        // keeping your own code is fine
        let edited = edit_course(&db, &t, a.id, "A2", "CS101", Some("desc"))
            .await
            .unwrap();
        assert_eq!(edited.name, "A2");

        let clash = edit_course(&db, &t, a.id, "A2", "CS102", None).await;
        assert!(matches!(clash, Err(AppError::ConstraintViolation(_))));
    }
}
