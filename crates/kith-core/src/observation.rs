//! Face observations produced by the landmark-detection capability.
//!
//! All coordinates are normalized to the frame (0.0 to 1.0, top-left
//! origin) so downstream math never needs pixel dimensions.

use serde::{Deserialize, Serialize};

/// A point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormPoint {
    pub x: f32,
    pub y: f32,
}

/// A rectangle in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl NormRect {
    pub fn center(&self) -> NormPoint {
        NormPoint {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }
}

/// Landmark subset reported by detectors. Any point may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub left_eye: Option<NormPoint>,
    pub right_eye: Option<NormPoint>,
    pub nose: Option<NormPoint>,
    pub inner_mouth: Option<NormPoint>,
}

/// One detected face in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub rect: NormRect,
    pub confidence: f32,
    pub landmarks: FaceLandmarks,
    /// Head rotation around the vertical axis, radians. 0 = facing the camera.
    pub yaw: f32,
    /// In-plane head tilt, radians.
    pub roll: f32,
}

/// On-device landmark detection, supplied by the host.
///
/// Implementations return every face found in the frame. An empty vec
/// covers both "no face present" and "detector could not run"; the
/// pipeline reacts identically to both, so a detector that breaks should
/// log the cause and return nothing.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &image::DynamicImage) -> Vec<FaceObservation>;
}
