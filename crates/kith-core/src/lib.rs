//! kith-core: value types and pure algorithms for the recognition pipeline.
//!
//! Frames, face observations, the quality gate, geometry fingerprints and
//! the offline fallback matcher. Everything here is synchronous; the only
//! I/O is the offline cache's backing file.

pub mod fingerprint;
pub mod frame;
pub mod observation;
pub mod offline;
pub mod person;
pub mod quality;

pub use fingerprint::FaceFingerprint;
pub use frame::{Frame, SourceTag};
pub use observation::{FaceLandmarks, FaceObservation, LandmarkDetector, NormPoint, NormRect};
pub use offline::{CachedFaceRecord, OfflineMatch, OfflineMatcher};
pub use person::{KnownPerson, MatchSource, PersonId, PhotoId, RecognitionMatch};
pub use quality::{QualityAssessment, QualityIssue, QualityMetrics, QualityScorer};
