//! Events the engine pushes to its host.

use crate::arbiter::ArbiterStatus;
use kith_core::frame::Frame;
use kith_core::person::RecognitionMatch;
use kith_core::quality::QualityAssessment;

/// Everything a host can observe about the running pipeline.
///
/// Delivery is best effort: the engine drops events rather than stall
/// frame processing behind a slow subscriber.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A frame was scored. Emitted for every frame that reaches the
    /// scorer, including rejected ones, so hosts can render live
    /// guidance and a hold-still progress indicator.
    FrameScored {
        assessment: QualityAssessment,
        progress: f32,
    },
    /// Stability was reached and an attempt is starting on this frame.
    RecognitionStarted { frame: Frame },
    /// The attempt resolved. `None` means nobody recognized.
    MatchCompleted { outcome: Option<RecognitionMatch> },
    /// The active camera, mode or streaming state changed.
    SourceChanged { status: ArbiterStatus },
    /// No cloud credentials are configured; matching runs offline only.
    CloudUnavailable,
}
