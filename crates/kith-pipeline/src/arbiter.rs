//! Camera source selection.
//!
//! The pipeline can be fed by the phone camera or by paired glasses.
//! The arbiter owns both sources, decides which one should stream for
//! the current mode and device state, and performs stop-before-start
//! handovers so the frame channel never receives from two cameras at
//! once.

use kith_core::frame::{Frame, SourceTag};
use serde::Deserialize;
use tokio::sync::mpsc;

/// Host preference for which camera feeds the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Always the phone camera.
    Phone,
    /// The glasses when they are usable, the phone otherwise.
    Glasses,
    /// Prefer glasses, fall back to the phone.
    Auto,
}

/// What the host knows about the paired glasses right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlassesStatus {
    /// Paired and provisioned for this account.
    pub registered: bool,
    /// Powered on and worn, per the companion link.
    pub device_active: bool,
}

impl GlassesStatus {
    pub fn usable(&self) -> bool {
        self.registered && self.device_active
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// A camera the arbiter can start and stop.
///
/// Implementations push frames into the sink for as long as they are
/// started and must drop frames rather than block when the sink is
/// full.
pub trait FrameSource: Send {
    fn start(&mut self, sink: mpsc::Sender<Frame>) -> Result<(), SourceError>;
    fn stop(&mut self);
}

/// Snapshot of the arbiter for status queries and change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterStatus {
    pub mode: SourceMode,
    pub selected: SourceTag,
    pub streaming: bool,
}

pub struct SourceArbiter {
    mode: SourceMode,
    glasses_status: GlassesStatus,
    phone: Box<dyn FrameSource>,
    glasses: Option<Box<dyn FrameSource>>,
    sink: mpsc::Sender<Frame>,
    active: Option<SourceTag>,
}

impl SourceArbiter {
    pub fn new(
        mode: SourceMode,
        phone: Box<dyn FrameSource>,
        glasses: Option<Box<dyn FrameSource>>,
        sink: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            mode,
            glasses_status: GlassesStatus::default(),
            phone,
            glasses,
            sink,
            active: None,
        }
    }

    /// The camera the current mode and glasses state resolve to.
    ///
    /// Glasses mode falls back to the phone silently when the glasses
    /// are not usable; `status()` still reports the requested mode so
    /// a host can surface the mismatch.
    pub fn selected(&self) -> SourceTag {
        match self.mode {
            SourceMode::Phone => SourceTag::Phone,
            SourceMode::Glasses | SourceMode::Auto => {
                if self.glasses.is_some() && self.glasses_status.usable() {
                    SourceTag::Glasses
                } else {
                    SourceTag::Phone
                }
            }
        }
    }

    /// Start streaming from the selected camera, stopping the previous
    /// one first. Starting the already-active camera is a no-op.
    pub fn start(&mut self) -> Result<(), SourceError> {
        let want = self.selected();
        if self.active == Some(want) {
            return Ok(());
        }
        self.stop();
        let sink = self.sink.clone();
        self.source_mut(want).start(sink)?;
        self.active = Some(want);
        tracing::info!(source = ?want, mode = ?self.mode, "camera source started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(tag) = self.active.take() {
            self.source_mut(tag).stop();
            tracing::info!(source = ?tag, "camera source stopped");
        }
    }

    pub fn set_mode(&mut self, mode: SourceMode) -> Result<(), SourceError> {
        self.mode = mode;
        self.reselect()
    }

    pub fn set_glasses_status(&mut self, status: GlassesStatus) -> Result<(), SourceError> {
        self.glasses_status = status;
        self.reselect()
    }

    pub fn status(&self) -> ArbiterStatus {
        ArbiterStatus {
            mode: self.mode,
            selected: self.selected(),
            streaming: self.active.is_some(),
        }
    }

    /// Re-run selection after a mode or device change. Only swaps
    /// cameras when streaming; a stopped arbiter stays stopped.
    fn reselect(&mut self) -> Result<(), SourceError> {
        if self.active.is_some() {
            self.start()
        } else {
            Ok(())
        }
    }

    fn source_mut(&mut self, tag: SourceTag) -> &mut dyn FrameSource {
        match (tag, self.glasses.as_mut()) {
            (SourceTag::Glasses, Some(glasses)) => glasses.as_mut(),
            _ => self.phone.as_mut(),
        }
    }
}
