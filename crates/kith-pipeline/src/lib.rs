//! kith-pipeline: the coordinating engine that turns camera frames into
//! announced identity matches.
//!
//! The host supplies cameras ([`FrameSource`]), a landmark detector and
//! the known-person registry; [`spawn_engine`] wires them to the quality
//! gate, the stability tracker and the cloud/offline matchers, and hands
//! back a command handle plus a typed event stream.

pub mod arbiter;
mod attempt;
pub mod config;
pub mod engine;
pub mod events;
pub mod registry;
pub mod stability;

pub use arbiter::{ArbiterStatus, FrameSource, GlassesStatus, SourceArbiter, SourceError, SourceMode};
pub use config::{ConfigError, PipelineConfig};
pub use engine::{spawn_engine, EngineDeps, EngineError, EngineHandle, EngineStatus};
pub use events::PipelineEvent;
pub use registry::{KnownPersonRegistry, PhotoStorage};
pub use stability::{FrameVerdict, QualityDropPolicy, StabilityTracker, TrackerState};
