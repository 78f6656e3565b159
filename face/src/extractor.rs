use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{GrayImage, imageops, imageops::FilterType};

use crate::FaceError;
use crate::detector::{FaceDetector, FaceRect};
use crate::types::FeatureVector;

/// Side length of the normalized face crop. The feature vector is the
/// row-major flattening of this patch, so its length is PATCH_SIZE^2.
pub const PATCH_SIZE: u32 = 100;

/// Extract a feature vector from a transmitted image.
///
/// `image_data` is base64 text, optionally carrying a data-URL header
/// (`data:image/png;base64,...`). Failure is a normal outcome here, not an
/// exception: the cause is logged and the caller sees `None`.
pub fn extract_feature<D>(detector: &mut D, image_data: &str) -> Option<FeatureVector>
where
    D: FaceDetector + ?Sized,
{
    match try_extract(detector, image_data) {
        Ok(vector) => Some(vector),
        Err(e) => {
            log::warn!("Face extraction failed: {e}");
            None
        }
    }
}

fn try_extract<D>(detector: &mut D, image_data: &str) -> Result<FeatureVector, FaceError>
where
    D: FaceDetector + ?Sized,
{
    let gray = decode_image(image_data)?;

    let faces = detector.detect(&gray);
    let face = largest_face(&faces).ok_or(FaceError::NoFaceDetected)?;

    // Clamp the crop to the image; detectors may report boxes past the edge.
    let x = face.x.min(gray.width().saturating_sub(1));
    let y = face.y.min(gray.height().saturating_sub(1));
    let width = face.width.min(gray.width() - x).max(1);
    let height = face.height.min(gray.height() - y).max(1);

    let crop = imageops::crop_imm(&gray, x, y, width, height).to_image();
    let resized = imageops::resize(&crop, PATCH_SIZE, PATCH_SIZE, FilterType::Triangle);

    Ok(FeatureVector::new(resized.into_raw()))
}

/// Decode a base64 (optionally data-URL prefixed) image to grayscale.
pub fn decode_image(image_data: &str) -> Result<GrayImage, FaceError> {
    let payload = match image_data.split_once("base64,") {
        Some((_, rest)) => rest,
        None => image_data,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| FaceError::Decode(e.to_string()))?;

    let img = image::load_from_memory(&bytes).map_err(|e| FaceError::Decode(e.to_string()))?;

    Ok(img.to_luma8())
}

/// The most prominent face: largest area, with equal areas broken
/// lexicographically on the top-left corner `(y, x)`.
fn largest_face(faces: &[FaceRect]) -> Option<&FaceRect> {
    faces.iter().max_by(|a, b| {
        a.area()
            .cmp(&b.area())
            .then_with(|| (b.y, b.x).cmp(&(a.y, a.x)))
    })
}
