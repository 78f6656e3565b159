pub mod m202601120001_create_users;
pub mod m202601120002_create_courses;
pub mod m202601120003_create_enrollments;
pub mod m202601190001_create_attendance;
