use image::GrayImage;

/// Axis-aligned face region reported by a detector, in pixel coordinates of
/// the grayscale input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRect {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Face-region detection over an 8-bit grayscale grid.
///
/// Implementations are constructed explicitly and passed into the extractor
/// at call time; there is no shared detector instance.
pub trait FaceDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<FaceRect>;
}

/// Construction parameters for the SeetaFace cascade detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: String,
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub pyramid_scale_factor: f32,
    pub slide_window_step: u32,
}

impl DetectorConfig {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            min_face_size: 20,
            score_thresh: 2.0,
            pyramid_scale_factor: 0.8,
            slide_window_step: 4,
        }
    }
}

#[cfg(feature = "seeta")]
pub use self::seeta::SeetaDetector;

#[cfg(feature = "seeta")]
mod seeta {
    use super::{DetectorConfig, FaceDetector, FaceRect};
    use crate::FaceError;
    use image::GrayImage;

    /// SeetaFace frontal-face cascade, loaded from the model path in
    /// [`DetectorConfig`].
    pub struct SeetaDetector {
        inner: Box<dyn rustface::Detector>,
    }

    impl SeetaDetector {
        pub fn from_config(config: &DetectorConfig) -> Result<Self, FaceError> {
            let mut inner = rustface::create_detector(&config.model_path)
                .map_err(|e| FaceError::ModelLoad(format!("{e:?}")))?;

            inner.set_min_face_size(config.min_face_size);
            inner.set_score_thresh(config.score_thresh);
            inner.set_pyramid_scale_factor(config.pyramid_scale_factor);
            inner.set_slide_window_step(config.slide_window_step, config.slide_window_step);

            Ok(Self { inner })
        }
    }

    impl FaceDetector for SeetaDetector {
        fn detect(&mut self, image: &GrayImage) -> Vec<FaceRect> {
            let mut data = rustface::ImageData::new(image.as_raw(), image.width(), image.height());

            self.inner
                .detect(&mut data)
                .into_iter()
                .map(|face| {
                    let bbox = face.bbox();
                    // The cascade can report boxes hanging off the top-left
                    // edge; clamp to the image.
                    FaceRect {
                        x: bbox.x().max(0) as u32,
                        y: bbox.y().max(0) as u32,
                        width: bbox.width(),
                        height: bbox.height(),
                    }
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area() {
        let r = FaceRect {
            x: 5,
            y: 5,
            width: 30,
            height: 40,
        };
        assert_eq!(r.area(), 1200);
    }

    #[test]
    fn test_config_defaults() {
        let cfg = DetectorConfig::new("models/seeta_fd_frontal.bin");
        assert_eq!(cfg.min_face_size, 20);
        assert_eq!(cfg.slide_window_step, 4);
    }
}
