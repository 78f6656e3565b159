//! face — feature extraction and matching for attendance check-in.
//!
//! The feature vector is a flattened 100x100 grayscale face crop compared by
//! raw Euclidean distance against a fixed tolerance. Deliberately not a
//! learned embedding: match quality is sensitive to pose and lighting, and
//! the threshold comes from the product's fixed default, not calibration.

pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod types;

pub use detector::{DetectorConfig, FaceDetector, FaceRect};
pub use extractor::{PATCH_SIZE, extract_feature};
pub use matcher::{DEFAULT_TOLERANCE, compare_faces, is_duplicate_face};
pub use types::FeatureVector;

/// Reasons the face pipeline can fail internally. Callers of the public
/// extraction entry point only ever see `None`; these stay in the logs.
#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("no face detected in the image")]
    NoFaceDetected,

    #[error("failed to load detector model: {0}")]
    ModelLoad(String),
}
