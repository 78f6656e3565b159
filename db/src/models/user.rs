use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Represents a user in the `users` table.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Primary key ID (auto-incremented).
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// User's unique email address.
    pub email: String,
    /// Securely hashed password string.
    pub password_hash: String,
    /// Teacher or student.
    pub role: Role,
    /// Registered face feature vector, stored as a JSON array of 10,000
    /// grayscale pixel values. Null until the student registers a face.
    pub face_encoding: Option<String>,
    /// Timestamp when the user was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when the user was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Role a user holds across the whole system.
/// Backed by a `user_role_type` enum in the database.
#[derive(
    Debug, Clone, PartialEq, EnumIter, DeriveActiveEnum, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role_type")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    #[sea_orm(string_value = "teacher")]
    Teacher,

    #[sea_orm(string_value = "student")]
    Student,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::course::Entity")]
    Courses,
    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollments,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Creates a new user with a freshly hashed password.
    pub async fn create(
        db: &DatabaseConnection,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Self, DbErr> {
        let password_hash = hash_password(password)
            .map_err(|e| DbErr::Custom(format!("Failed to hash password: {e}")))?;

        let user = ActiveModel {
            username: Set(username.to_owned()),
            email: Set(email.to_owned()),
            password_hash: Set(password_hash),
            role: Set(role),
            ..Default::default()
        };

        user.insert(db).await
    }

    pub fn verify_password(&self, password: &str) -> bool {
        PasswordHash::new(&self.password_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn has_face_registered(&self) -> bool {
        self.face_encoding.is_some()
    }

    /// Parse the stored JSON face encoding back into pixel values.
    /// Returns `None` when no face is registered or the stored text is
    /// unreadable (treated the same as no registration).
    pub fn face_encoding_vec(&self) -> Option<Vec<u8>> {
        let raw = self.face_encoding.as_deref()?;
        match serde_json::from_str(raw) {
            Ok(values) => Some(values),
            Err(e) => {
                log::warn!("Unreadable face encoding for user {}: {}", self.id, e);
                None
            }
        }
    }
}

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_create_and_verify_password() {
        let db = setup_test_db().await;

        let user = Model::create(&db, "stud1", "stud1@test.com", "secret", Role::Student)
            .await
            .unwrap();

        assert_eq!(user.username, "stud1");
        assert_eq!(user.role, Role::Student);
        assert!(user.verify_password("secret"));
        assert!(!user.verify_password("wrong"));
        assert!(!user.has_face_registered());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let db = setup_test_db().await;

        Model::create(&db, "dup", "a@test.com", "pw", Role::Student)
            .await
            .unwrap();
        let second = Model::create(&db, "dup", "b@test.com", "pw", Role::Student).await;

        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_face_encoding_round_trip() {
        let db = setup_test_db().await;

        let user = Model::create(&db, "stud2", "stud2@test.com", "pw", Role::Student)
            .await
            .unwrap();

        let pixels: Vec<u8> = vec![0, 127, 255];
        let mut active: ActiveModel = user.into();
        active.face_encoding = Set(Some(serde_json::to_string(&pixels).unwrap()));
        let user = active.update(&db).await.unwrap();

        assert!(user.has_face_registered());
        assert_eq!(user.face_encoding_vec(), Some(pixels));
    }
}
