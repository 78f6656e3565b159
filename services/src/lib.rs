//! Application service layer: orchestrates the attendance domain model under
//! teacher/student role policies. Every operation is synchronous
//! request/response over the database connection; there are no background
//! tasks and no caching.

pub mod attendance;
pub mod course;
pub mod enrollment;
pub mod error;
pub mod policy;
pub mod report;
pub mod user;

pub use error::AppError;
