use chrono::Utc;
use db::models::user::{self, Role};
use face::{FaceDetector, FeatureVector, extract_feature, is_duplicate_face};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::error::{AppError, is_unique_violation};
use crate::policy::require_student;

pub use db::models::user::Model as User;

pub async fn register_user(
    db: &DatabaseConnection,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, AppError> {
    // Pre-check both unique columns so the caller gets a precise message;
    // the indexes remain the final word under races.
    if user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .is_some()
    {
        return Err(AppError::ConstraintViolation(
            "username already taken".into(),
        ));
    }
    if user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await?
        .is_some()
    {
        return Err(AppError::ConstraintViolation(
            "email already registered".into(),
        ));
    }

    let created = User::create(db, username, email, password, role)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::ConstraintViolation("username or email already registered".into())
            } else {
                AppError::from(e)
            }
        })?;

    log::info!("User {} registered as {}", created.username, created.role);
    Ok(created)
}

/// Look up a user by username and check the password. Returns `None` on any
/// failure so a caller cannot tell a missing user from a wrong password.
pub async fn verify_credentials(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;

    Ok(found.filter(|u| u.verify_password(password)))
}

/// Register the student's face from a transmitted image.
///
/// The extracted vector is checked against every other registered face
/// before it is stored; a match rejects the registration and leaves all
/// stored encodings untouched. Re-registering overwrites the student's own
/// previous encoding.
pub async fn register_face<D>(
    db: &DatabaseConnection,
    student: &User,
    detector: &mut D,
    image_data: &str,
    tolerance: f64,
) -> Result<User, AppError>
where
    D: FaceDetector + ?Sized,
{
    require_student(student)?;

    let vector = extract_feature(detector, image_data).ok_or(AppError::NoFaceDetected)?;

    let others = user::Entity::find()
        .filter(user::Column::Id.ne(student.id))
        .filter(user::Column::FaceEncoding.is_not_null())
        .all(db)
        .await?;

    let gallery: Vec<FeatureVector> = others
        .iter()
        .filter_map(|u| u.face_encoding_vec())
        .map(FeatureVector::from)
        .collect();

    if is_duplicate_face(&vector, &gallery, tolerance) {
        log::warn!(
            "Face registration for user {} rejected: matches an existing registration",
            student.id
        );
        return Err(AppError::DuplicateFaceRegistration);
    }

    let encoded = serde_json::to_string(&vector)
        .map_err(|e| AppError::ConstraintViolation(format!("unstorable face encoding: {e}")))?;

    let mut active: user::ActiveModel = student.clone().into();
    active.face_encoding = Set(Some(encoded));
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;

    log::info!("Face registered for user {}", updated.id);
    Ok(updated)
}

/// Remove the student's registered face.
pub async fn clear_face(db: &DatabaseConnection, student: &User) -> Result<User, AppError> {
    require_student(student)?;

    let mut active: user::ActiveModel = student.clone().into();
    active.face_encoding = Set(None);
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use db::test_utils::setup_test_db;
    use face::{DEFAULT_TOLERANCE, FaceRect, PATCH_SIZE};
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    struct StubDetector;

    impl FaceDetector for StubDetector {
        fn detect(&mut self, image: &GrayImage) -> Vec<FaceRect> {
            vec![FaceRect {
                x: 0,
                y: 0,
                width: image.width(),
                height: image.height(),
            }]
        }
    }

    struct BlindDetector;

    impl FaceDetector for BlindDetector {
        fn detect(&mut self, _image: &GrayImage) -> Vec<FaceRect> {
            vec![]
        }
    }

    fn face_image(intensity: u8) -> String {
        let img = GrayImage::from_pixel(PATCH_SIZE, PATCH_SIZE, Luma([intensity]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        STANDARD.encode(&buf)
    }

    #[tokio::test]
    async fn test_register_user_rejects_taken_username() {
        let db = setup_test_db().await;

        register_user(&db, "sam", "sam@test.com", "pw", Role::Student)
            .await
            .unwrap();
        let dup = register_user(&db, "sam", "other@test.com", "pw", Role::Student).await;

        assert!(matches!(dup, Err(AppError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let db = setup_test_db().await;
        register_user(&db, "sam", "sam@test.com", "secret", Role::Student)
            .await
            .unwrap();

        assert!(verify_credentials(&db, "sam", "secret").await.unwrap().is_some());
        assert!(verify_credentials(&db, "sam", "wrong").await.unwrap().is_none());
        assert!(verify_credentials(&db, "nobody", "secret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_face_stores_encoding() {
        let db = setup_test_db().await;
        let s = register_user(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();

        let updated = register_face(&db, &s, &mut StubDetector, &face_image(60), DEFAULT_TOLERANCE)
            .await
            .unwrap();

        let stored = updated.face_encoding_vec().unwrap();
        assert_eq!(stored.len(), (PATCH_SIZE * PATCH_SIZE) as usize);
        assert!(stored.iter().all(|&p| p == 60));
    }

    #[tokio::test]
    async fn test_register_face_without_face_fails() {
        let db = setup_test_db().await;
        let s = register_user(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();

        let result =
            register_face(&db, &s, &mut BlindDetector, &face_image(60), DEFAULT_TOLERANCE).await;
        assert!(matches!(result, Err(AppError::NoFaceDetected)));
    }

    #[tokio::test]
    async fn test_duplicate_face_rejected_and_nothing_stored() {
        let db = setup_test_db().await;
        let first = register_user(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();
        let second = register_user(&db, "s2", "s2@test.com", "pw", Role::Student)
            .await
            .unwrap();

        register_face(&db, &first, &mut StubDetector, &face_image(60), DEFAULT_TOLERANCE)
            .await
            .unwrap();

        // Same intensity, distance 0: a duplicate.
        let result =
            register_face(&db, &second, &mut StubDetector, &face_image(60), DEFAULT_TOLERANCE)
                .await;
        assert!(matches!(result, Err(AppError::DuplicateFaceRegistration)));

        let second = user::Entity::find_by_id(second.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(!second.has_face_registered());
    }

    #[tokio::test]
    async fn test_reregistering_own_face_is_allowed() {
        let db = setup_test_db().await;
        let s = register_user(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();

        let s = register_face(&db, &s, &mut StubDetector, &face_image(60), DEFAULT_TOLERANCE)
            .await
            .unwrap();
        let s = register_face(&db, &s, &mut StubDetector, &face_image(61), DEFAULT_TOLERANCE)
            .await
            .unwrap();

        let stored = s.face_encoding_vec().unwrap();
        assert!(stored.iter().all(|&p| p == 61));
    }

    #[tokio::test]
    async fn test_clear_face() {
        let db = setup_test_db().await;
        let s = register_user(&db, "s1", "s1@test.com", "pw", Role::Student)
            .await
            .unwrap();
        let s = register_face(&db, &s, &mut StubDetector, &face_image(60), DEFAULT_TOLERANCE)
            .await
            .unwrap();

        let s = clear_face(&db, &s).await.unwrap();
        assert!(!s.has_face_registered());
    }
}
