//! Frame quality gate: scores a frame 0 to 100 before recognition runs.
//!
//! Cheap pixel statistics plus landmark geometry decide whether a frame
//! is worth a network round-trip. Each metric applies an independent
//! penalty; the gate never fails, it always produces an assessment.

use crate::observation::{FaceObservation, NormRect};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

// --- Metric thresholds ---
const BRIGHTNESS_MIN: f32 = 40.0;
const BRIGHTNESS_MAX: f32 = 220.0;
const BRIGHTNESS_IDEAL_MIN: f32 = 80.0;
const BRIGHTNESS_IDEAL_MAX: f32 = 180.0;
const FACE_RATIO_MIN: f32 = 0.15;
const FACE_RATIO_MAX: f32 = 0.8;
const FACE_RATIO_IDEAL_MIN: f32 = 0.25;
const FACE_RATIO_IDEAL_MAX: f32 = 0.6;
const CENTER_OFFSET_MAX: f32 = 0.25;
const CENTER_OFFSET_IDEAL: f32 = 0.10;
const YAW_MAX: f32 = 0.4;
const ROLL_MAX: f32 = 0.3;
const SHARPNESS_MIN: f32 = 50.0;
const SHARPNESS_IDEAL: f32 = 100.0;

// --- Penalties ---
const PENALTY_BRIGHTNESS: f32 = 30.0;
const PENALTY_BRIGHTNESS_SOFT: f32 = 10.0;
const PENALTY_TOO_FAR: f32 = 25.0;
const PENALTY_TOO_CLOSE: f32 = 20.0;
const PENALTY_FACE_RATIO_SOFT: f32 = 10.0;
const PENALTY_OFF_CENTER: f32 = 15.0;
const PENALTY_OFF_CENTER_SOFT: f32 = 5.0;
const PENALTY_POSE: f32 = 25.0;
const PENALTY_BLURRY: f32 = 25.0;
const PENALTY_BLURRY_SOFT: f32 = 10.0;

/// Minimum score considered good enough to recognize.
pub const ACCEPTABLE_SCORE: f32 = 60.0;

// Sampling caps keep per-frame statistics cheap on full-size frames.
const BRIGHTNESS_SAMPLE_MAX: u32 = 100;
const SHARPNESS_SAMPLE_MAX: u32 = 200;

/// Defects the scorer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityIssue {
    NoFace,
    MultipleFaces(usize),
    TooDark,
    TooBright,
    TooFar,
    TooClose,
    OffCenter,
    NotFacingCamera,
    Blurry,
    Perfect,
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityIssue::NoFace => f.write_str("no face"),
            QualityIssue::MultipleFaces(n) => write!(f, "{n} faces"),
            QualityIssue::TooDark => f.write_str("too dark"),
            QualityIssue::TooBright => f.write_str("too bright"),
            QualityIssue::TooFar => f.write_str("too far"),
            QualityIssue::TooClose => f.write_str("too close"),
            QualityIssue::OffCenter => f.write_str("off center"),
            QualityIssue::NotFacingCamera => f.write_str("not facing camera"),
            QualityIssue::Blurry => f.write_str("blurry"),
            QualityIssue::Perfect => f.write_str("perfect"),
        }
    }
}

/// Raw measurements backing an assessment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Mean gray level of the frame, 0 to 255.
    pub brightness: f32,
    /// Variance of the discrete Laplacian; higher means sharper.
    pub sharpness: f32,
    /// Face width as a fraction of frame width.
    pub face_ratio: f32,
    /// Euclidean distance from face center to frame center, normalized.
    pub center_offset: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// Outcome of scoring one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: f32,
    pub issues: Vec<QualityIssue>,
    pub metrics: QualityMetrics,
}

impl QualityAssessment {
    pub fn is_acceptable(&self) -> bool {
        self.score >= ACCEPTABLE_SCORE
    }

    /// True when exactly one face was observed.
    pub fn single_face(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|i| matches!(i, QualityIssue::NoFace | QualityIssue::MultipleFaces(_)))
    }

    fn rejected(issue: QualityIssue) -> Self {
        Self {
            score: 0.0,
            issues: vec![issue],
            metrics: QualityMetrics::default(),
        }
    }
}

/// Scores frames before recognition. Stateless.
#[derive(Debug, Default)]
pub struct QualityScorer;

impl QualityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one frame given the faces observed in it.
    ///
    /// Zero or several faces short-circuit to score 0 before any pixel
    /// work; everything else runs the full metric set.
    pub fn assess(&self, image: &DynamicImage, faces: &[FaceObservation]) -> QualityAssessment {
        let face = match faces {
            [] => return QualityAssessment::rejected(QualityIssue::NoFace),
            [one] => one,
            many => {
                return QualityAssessment::rejected(QualityIssue::MultipleFaces(many.len()))
            }
        };

        let metrics = QualityMetrics {
            brightness: mean_brightness(image),
            sharpness: laplacian_variance(image),
            face_ratio: face.rect.width,
            center_offset: center_offset(&face.rect),
            yaw: face.yaw,
            roll: face.roll,
        };

        let mut score = 100.0f32;
        let mut issues = Vec::new();

        if metrics.brightness < BRIGHTNESS_MIN {
            score -= PENALTY_BRIGHTNESS;
            issues.push(QualityIssue::TooDark);
        } else if metrics.brightness > BRIGHTNESS_MAX {
            score -= PENALTY_BRIGHTNESS;
            issues.push(QualityIssue::TooBright);
        } else if metrics.brightness < BRIGHTNESS_IDEAL_MIN
            || metrics.brightness > BRIGHTNESS_IDEAL_MAX
        {
            score -= PENALTY_BRIGHTNESS_SOFT;
        }

        if metrics.face_ratio < FACE_RATIO_MIN {
            score -= PENALTY_TOO_FAR;
            issues.push(QualityIssue::TooFar);
        } else if metrics.face_ratio > FACE_RATIO_MAX {
            score -= PENALTY_TOO_CLOSE;
            issues.push(QualityIssue::TooClose);
        } else if metrics.face_ratio < FACE_RATIO_IDEAL_MIN
            || metrics.face_ratio > FACE_RATIO_IDEAL_MAX
        {
            score -= PENALTY_FACE_RATIO_SOFT;
        }

        if metrics.center_offset > CENTER_OFFSET_MAX {
            score -= PENALTY_OFF_CENTER;
            issues.push(QualityIssue::OffCenter);
        } else if metrics.center_offset > CENTER_OFFSET_IDEAL {
            score -= PENALTY_OFF_CENTER_SOFT;
        }

        if metrics.yaw.abs() > YAW_MAX || metrics.roll.abs() > ROLL_MAX {
            score -= PENALTY_POSE;
            issues.push(QualityIssue::NotFacingCamera);
        }

        if metrics.sharpness < SHARPNESS_MIN {
            score -= PENALTY_BLURRY;
            issues.push(QualityIssue::Blurry);
        } else if metrics.sharpness < SHARPNESS_IDEAL {
            score -= PENALTY_BLURRY_SOFT;
        }

        // Soft penalties lower the score without raising an issue, so a
        // frame can be merely good rather than perfect.
        if issues.is_empty() {
            issues.push(QualityIssue::Perfect);
        }

        QualityAssessment {
            score: score.clamp(0.0, 100.0),
            issues,
            metrics,
        }
    }
}

/// Mean gray level over a downsampled thumbnail.
fn mean_brightness(image: &DynamicImage) -> f32 {
    let thumb = downscale_gray(image, BRIGHTNESS_SAMPLE_MAX);
    let pixels = thumb.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    pixels.iter().map(|&p| p as f32).sum::<f32>() / pixels.len() as f32
}

/// Variance of a 4-neighbour discrete Laplacian over a downsampled
/// grayscale image. The classic blur detector: sharp edges produce large
/// second derivatives, defocus flattens them.
fn laplacian_variance(image: &DynamicImage) -> f32 {
    let gray = downscale_gray(image, SHARPNESS_SAMPLE_MAX);
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    if w < 3 || h < 3 {
        return 0.0;
    }
    let data = gray.as_raw();

    let mut responses = Vec::with_capacity((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = data[y * w + x] as f32;
            let lap = data[(y - 1) * w + x] as f32
                + data[(y + 1) * w + x] as f32
                + data[y * w + x - 1] as f32
                + data[y * w + x + 1] as f32
                - 4.0 * center;
            responses.push(lap);
        }
    }

    let n = responses.len() as f32;
    let mean = responses.iter().sum::<f32>() / n;
    responses.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n
}

/// Grayscale copy capped at `max_edge` on the long side, aspect kept.
fn downscale_gray(image: &DynamicImage, max_edge: u32) -> image::GrayImage {
    if image.width().max(image.height()) <= max_edge {
        image.to_luma8()
    } else {
        image.thumbnail(max_edge, max_edge).into_luma8()
    }
}

fn center_offset(rect: &NormRect) -> f32 {
    let c = rect.center();
    let dx = c.x - 0.5;
    let dy = c.y - 0.5;
    (dx * dx + dy * dy).sqrt()
}
