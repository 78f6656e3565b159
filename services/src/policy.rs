//! Role and ownership checks shared by the service modules. The caller hands
//! in an already-authenticated principal; everything beyond that claim is
//! verified here against the database.

use db::models::course;
use db::models::user::{Model as User, Role};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::error::AppError;

pub fn require_teacher(user: &User) -> Result<(), AppError> {
    if user.role == Role::Teacher {
        Ok(())
    } else {
        Err(AppError::Forbidden("teacher privileges required"))
    }
}

pub fn require_student(user: &User) -> Result<(), AppError> {
    if user.role == Role::Student {
        Ok(())
    } else {
        Err(AppError::Forbidden("student privileges required"))
    }
}

/// Load a course and verify the acting teacher owns it.
pub async fn find_owned_course(
    db: &DatabaseConnection,
    teacher: &User,
    course_id: i64,
) -> Result<course::Model, AppError> {
    require_teacher(teacher)?;

    let course = course::Entity::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or(AppError::NotFound("course"))?;

    if course.teacher_id != teacher.id {
        return Err(AppError::Forbidden("you do not own this course"));
    }

    Ok(course)
}

/// True iff the student has an enrollment in the course.
pub async fn is_enrolled(
    db: &DatabaseConnection,
    course_id: i64,
    student_id: i64,
) -> Result<bool, AppError> {
    use db::models::enrollment;

    let found = enrollment::Entity::find()
        .filter(enrollment::Column::CourseId.eq(course_id))
        .filter(enrollment::Column::StudentId.eq(student_id))
        .one(db)
        .await?;

    Ok(found.is_some())
}
