use serde::{Deserialize, Serialize};

/// Fixed-length numeric array derived from a face crop, used as a
/// comparison key. Serializes as a bare JSON array so stored encodings stay
/// readable as plain pixel lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    pub values: Vec<u8>,
}

impl FeatureVector {
    pub fn new(values: Vec<u8>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// L2 distance between two vectors. `None` when the lengths differ;
    /// vectors from different patch sizes are never comparable.
    pub fn euclidean_distance(&self, other: &FeatureVector) -> Option<f64> {
        if self.values.len() != other.values.len() {
            return None;
        }

        let sum: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum();

        Some(sum.sqrt())
    }
}

impl From<Vec<u8>> for FeatureVector {
    fn from(values: Vec<u8>) -> Self {
        Self { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical_is_zero() {
        let v = FeatureVector::new(vec![10, 20, 30]);
        assert_eq!(v.euclidean_distance(&v), Some(0.0));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = FeatureVector::new(vec![0, 0, 0, 0]);
        let b = FeatureVector::new(vec![3, 4, 0, 0]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
        assert_eq!(a.euclidean_distance(&b), Some(5.0));
    }

    #[test]
    fn test_distance_length_mismatch_is_incomparable() {
        let a = FeatureVector::new(vec![1, 2, 3]);
        let b = FeatureVector::new(vec![1, 2]);
        assert_eq!(a.euclidean_distance(&b), None);
    }

    #[test]
    fn test_serializes_as_bare_array() {
        let v = FeatureVector::new(vec![0, 127, 255]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "[0,127,255]");
        let back: FeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
