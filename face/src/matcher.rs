use crate::types::FeatureVector;

/// Maximum Euclidean distance for two feature vectors to count as the same
/// person. Applied strictly (`distance < tolerance`).
pub const DEFAULT_TOLERANCE: f64 = 5000.0;

/// True iff the two vectors are comparable and closer than `tolerance`.
/// Absent input is a non-match, never an error.
pub fn compare_faces(
    known: Option<&FeatureVector>,
    probe: Option<&FeatureVector>,
    tolerance: f64,
) -> bool {
    let (Some(known), Some(probe)) = (known, probe) else {
        return false;
    };

    match known.euclidean_distance(probe) {
        Some(distance) => {
            log::debug!("Face comparison distance: {distance}");
            distance < tolerance
        }
        None => {
            log::warn!(
                "Face comparison between vectors of different lengths ({} vs {})",
                known.len(),
                probe.len()
            );
            false
        }
    }
}

/// True iff `probe` matches any element of `known`. Short-circuits on the
/// first hit; an empty gallery never matches.
pub fn is_duplicate_face(probe: &FeatureVector, known: &[FeatureVector], tolerance: f64) -> bool {
    known
        .iter()
        .any(|existing| compare_faces(Some(existing), Some(probe), tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: u8) -> FeatureVector {
        FeatureVector::new(vec![value; crate::PATCH_SIZE as usize * crate::PATCH_SIZE as usize])
    }

    #[test]
    fn test_vector_always_matches_itself() {
        let v = flat(42);
        assert!(compare_faces(Some(&v), Some(&v), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_match_is_symmetric() {
        let a = flat(10);
        let b = flat(40);
        assert_eq!(
            compare_faces(Some(&a), Some(&b), DEFAULT_TOLERANCE),
            compare_faces(Some(&b), Some(&a), DEFAULT_TOLERANCE)
        );
    }

    #[test]
    fn test_tolerance_is_strict() {
        // 10,000 dimensions apart by 50 is exactly distance 5000.
        let a = flat(0);
        let at_tolerance = flat(50);
        let just_inside = flat(49);

        assert!(!compare_faces(Some(&a), Some(&at_tolerance), DEFAULT_TOLERANCE));
        assert!(compare_faces(Some(&a), Some(&just_inside), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_absent_input_is_a_non_match() {
        let v = flat(1);
        assert!(!compare_faces(None, Some(&v), DEFAULT_TOLERANCE));
        assert!(!compare_faces(Some(&v), None, DEFAULT_TOLERANCE));
        assert!(!compare_faces(None, None, DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_length_mismatch_is_a_non_match() {
        let a = FeatureVector::new(vec![0; 100]);
        let b = FeatureVector::new(vec![0; 99]);
        assert!(!compare_faces(Some(&a), Some(&b), DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_duplicate_empty_gallery_is_false() {
        let v = flat(1);
        assert!(!is_duplicate_face(&v, &[], DEFAULT_TOLERANCE));
    }

    #[test]
    fn test_duplicate_finds_any_match() {
        let probe = flat(100);
        let gallery = vec![flat(0), flat(200), flat(101)];
        assert!(is_duplicate_face(&probe, &gallery, DEFAULT_TOLERANCE));

        let far_gallery = vec![flat(0), flat(200)];
        assert!(!is_duplicate_face(&probe, &far_gallery, DEFAULT_TOLERANCE));
    }
}
