//! Lightweight face-geometry fingerprints for offline matching.
//!
//! A fingerprint is a handful of ratios derived from one observation:
//! cheap to store, cheap to compare, and good enough to separate the
//! small set of people a household cares about. It is not biometric-grade
//! identification and is never treated as such upstream.

use crate::observation::{FaceObservation, NormRect};
use serde::{Deserialize, Serialize};

// --- Similarity tuning ---
// Faces turned more than this far apart are not comparable at all.
const ORIENTATION_LIMIT: f32 = 0.5;

const ASPECT_SENSITIVITY: f32 = 5.0;
const ASPECT_WEIGHT: f32 = 1.0;
const EYE_SENSITIVITY: f32 = 10.0;
const EYE_WEIGHT: f32 = 1.5;
const NOSE_SENSITIVITY: f32 = 8.0;
const NOSE_WEIGHT: f32 = 1.0;
const MOUTH_SENSITIVITY: f32 = 8.0;
const MOUTH_WEIGHT: f32 = 1.0;

/// Geometry fingerprint extracted from one face observation.
///
/// All distances are normalized by the face box, so the fingerprint does
/// not change with subject distance. Landmark-derived fields are absent
/// when the detector did not report the landmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceFingerprint {
    /// Face box width over height.
    pub aspect_ratio: f32,
    /// Inter-eye distance relative to face width.
    pub eye_distance: Option<f32>,
    /// Nose vertical position within the face box, 0 at the top edge.
    pub nose_height: Option<f32>,
    /// Mouth vertical position within the face box.
    pub mouth_height: Option<f32>,
    /// Roll captured with the face, radians.
    pub roll: f32,
    /// Yaw captured with the face, radians.
    pub yaw: f32,
}

impl FaceFingerprint {
    pub fn from_observation(face: &FaceObservation) -> Self {
        let rect = &face.rect;
        let lm = &face.landmarks;

        let eye_distance = match (lm.left_eye, lm.right_eye) {
            (Some(l), Some(r)) if rect.width > 0.0 => {
                let dx = l.x - r.x;
                let dy = l.y - r.y;
                Some((dx * dx + dy * dy).sqrt() / rect.width)
            }
            _ => None,
        };

        Self {
            aspect_ratio: rect.aspect_ratio(),
            eye_distance,
            nose_height: lm.nose.and_then(|p| relative_y(p.y, rect)),
            mouth_height: lm.inner_mouth.and_then(|p| relative_y(p.y, rect)),
            roll: face.roll,
            yaw: face.yaw,
        }
    }

    /// Weighted similarity in [0, 1].
    ///
    /// Orientation gates the comparison: faces turned too differently
    /// score 0 outright. Features absent on either side drop out of the
    /// weighted average rather than dragging it down.
    pub fn similarity(&self, other: &FaceFingerprint) -> f32 {
        if (self.roll - other.roll).abs() > ORIENTATION_LIMIT
            || (self.yaw - other.yaw).abs() > ORIENTATION_LIMIT
        {
            return 0.0;
        }

        let mut total = 0.0f32;
        let mut weight = 0.0f32;

        total += feature_score(self.aspect_ratio, other.aspect_ratio, ASPECT_SENSITIVITY)
            * ASPECT_WEIGHT;
        weight += ASPECT_WEIGHT;

        if let (Some(a), Some(b)) = (self.eye_distance, other.eye_distance) {
            total += feature_score(a, b, EYE_SENSITIVITY) * EYE_WEIGHT;
            weight += EYE_WEIGHT;
        }
        if let (Some(a), Some(b)) = (self.nose_height, other.nose_height) {
            total += feature_score(a, b, NOSE_SENSITIVITY) * NOSE_WEIGHT;
            weight += NOSE_WEIGHT;
        }
        if let (Some(a), Some(b)) = (self.mouth_height, other.mouth_height) {
            total += feature_score(a, b, MOUTH_SENSITIVITY) * MOUTH_WEIGHT;
            weight += MOUTH_WEIGHT;
        }

        if weight > 0.0 {
            total / weight
        } else {
            0.0
        }
    }
}

/// Per-feature closeness: 1.0 at equality, fading linearly with distance.
fn feature_score(a: f32, b: f32, sensitivity: f32) -> f32 {
    (1.0 - (a - b).abs() * sensitivity).max(0.0)
}

fn relative_y(y: f32, rect: &NormRect) -> Option<f32> {
    if rect.height > 0.0 {
        Some((y - rect.y) / rect.height)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{FaceLandmarks, NormPoint};

    fn fingerprint() -> FaceFingerprint {
        FaceFingerprint {
            aspect_ratio: 0.8,
            eye_distance: Some(0.45),
            nose_height: Some(0.55),
            mouth_height: Some(0.8),
            roll: 0.05,
            yaw: 0.02,
        }
    }

    #[test]
    fn test_identical_fingerprints_score_one() {
        let fp = fingerprint();
        assert!((fp.similarity(&fp) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_roll_gap_gates_to_zero() {
        let a = fingerprint();
        let mut b = fingerprint();
        b.roll = a.roll + 0.6;
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_yaw_gap_gates_to_zero() {
        let a = fingerprint();
        let mut b = fingerprint();
        b.yaw = a.yaw - 0.6;
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_orientation_within_limit_compares() {
        let a = fingerprint();
        let mut b = fingerprint();
        b.roll = a.roll + 0.4;
        assert!(a.similarity(&b) > 0.9);
    }

    #[test]
    fn test_missing_features_drop_out() {
        // Only aspect ratio on one side: average over that one feature.
        let a = FaceFingerprint {
            aspect_ratio: 0.8,
            eye_distance: None,
            nose_height: None,
            mouth_height: None,
            roll: 0.0,
            yaw: 0.0,
        };
        let b = fingerprint();
        let expected = feature_score(0.8, b.aspect_ratio, ASPECT_SENSITIVITY);
        assert!((a.similarity(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_eye_distance_weighting() {
        // Eye delta of 0.05 at sensitivity 10 scores 0.5 on a weight of
        // 1.5; all other features are equal.
        let a = fingerprint();
        let mut b = fingerprint();
        b.eye_distance = Some(0.50);
        let expected = (1.0 * ASPECT_WEIGHT
            + 0.5 * EYE_WEIGHT
            + 1.0 * NOSE_WEIGHT
            + 1.0 * MOUTH_WEIGHT)
            / (ASPECT_WEIGHT + EYE_WEIGHT + NOSE_WEIGHT + MOUTH_WEIGHT);
        assert!((a.similarity(&b) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_feature_score_floor() {
        assert_eq!(feature_score(0.0, 1.0, 10.0), 0.0);
        assert!((feature_score(0.3, 0.3, 10.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_observation_full_landmarks() {
        let face = FaceObservation {
            rect: NormRect { x: 0.3, y: 0.2, width: 0.4, height: 0.5 },
            confidence: 0.9,
            landmarks: FaceLandmarks {
                left_eye: Some(NormPoint { x: 0.6, y: 0.35 }),
                right_eye: Some(NormPoint { x: 0.4, y: 0.35 }),
                nose: Some(NormPoint { x: 0.5, y: 0.45 }),
                inner_mouth: Some(NormPoint { x: 0.5, y: 0.6 }),
            },
            yaw: 0.1,
            roll: -0.05,
        };

        let fp = FaceFingerprint::from_observation(&face);
        assert!((fp.aspect_ratio - 0.8).abs() < 1e-6);
        // Eyes 0.2 apart on a 0.4-wide box.
        assert!((fp.eye_distance.unwrap() - 0.5).abs() < 1e-6);
        // Nose at y 0.45 inside a box spanning 0.2..0.7.
        assert!((fp.nose_height.unwrap() - 0.5).abs() < 1e-6);
        assert!((fp.mouth_height.unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(fp.yaw, 0.1);
        assert_eq!(fp.roll, -0.05);
    }

    #[test]
    fn test_from_observation_without_landmarks() {
        let face = FaceObservation {
            rect: NormRect { x: 0.3, y: 0.3, width: 0.4, height: 0.4 },
            confidence: 0.9,
            landmarks: FaceLandmarks::default(),
            yaw: 0.0,
            roll: 0.0,
        };

        let fp = FaceFingerprint::from_observation(&face);
        assert_eq!(fp.eye_distance, None);
        assert_eq!(fp.nose_height, None);
        assert_eq!(fp.mouth_height, None);
        assert!((fp.aspect_ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_serde_roundtrip() {
        let fp = fingerprint();
        let json = serde_json::to_string(&fp).unwrap();
        let back: FaceFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, back);
    }
}
