use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Service-level failure taxonomy.
///
/// Extraction and matching failures (`NoFaceDetected`, `NoMatchFound`) and
/// domain-rule violations are user-visible rejections with no partial
/// mutation. `Database` carries unexpected storage errors, which propagate
/// as fatal request failures with no automatic retry.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no face detected in the image")]
    NoFaceDetected,

    #[error("no matching student found")]
    NoMatchFound,

    #[error("an attendance session already exists for this date")]
    DuplicateSession,

    #[error("student is not enrolled in this course")]
    NotEnrolled,

    #[error("this face has already been registered by another user")]
    DuplicateFaceRegistration,

    /// Storage-level uniqueness conflict surfaced as a user-visible message.
    #[error("{0}")]
    ConstraintViolation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("not authorized: {0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Database(#[from] DbErr),
}

/// The unique index at commit time is the authoritative guard for
/// duplicate-session and duplicate-enrollment style conflicts; pre-checks
/// are an optimization only.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
