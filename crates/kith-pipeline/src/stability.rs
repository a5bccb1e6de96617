//! Dwell-time gate between the quality scorer and recognition.
//!
//! A face has to hold an acceptable score for a continuous stretch
//! before an attempt fires, and every completed attempt is followed by
//! a cooldown so one person lingering in frame cannot burn request
//! after request.

use crate::config::PipelineConfig;
use kith_core::quality::QualityAssessment;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// What a mid-track quality drop does to the accumulated dwell time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityDropPolicy {
    /// Discard progress; the countdown restarts from zero.
    Reset,
    /// Freeze progress; the countdown resumes when quality recovers.
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No acceptable face in view.
    Idle,
    /// An acceptable face has been in view since `since`.
    Tracking { since: Instant, last_frame: Instant },
    /// An attempt is in flight; frames are ignored until it completes.
    Recognizing,
    /// Post-attempt quiet period.
    Cooldown { until: Instant },
}

/// Per-frame answer from the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    /// Fraction of the stability threshold reached, clamped to [0, 1].
    pub progress: f32,
    /// True exactly once per dwell: the frame that crossed the
    /// threshold and should start an attempt.
    pub trigger: bool,
}

impl FrameVerdict {
    fn idle() -> Self {
        Self {
            progress: 0.0,
            trigger: false,
        }
    }
}

pub struct StabilityTracker {
    state: TrackerState,
    threshold: Duration,
    cooldown: Duration,
    auto_recognize: bool,
    quality_drop: QualityDropPolicy,
}

impl StabilityTracker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            state: TrackerState::Idle,
            threshold: config.stability_threshold,
            cooldown: config.recognition_cooldown,
            auto_recognize: config.auto_recognize,
            quality_drop: config.quality_drop,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Feed one scored frame. `now` is the frame's capture time, not
    /// the processing time, so a backed-up channel cannot stretch or
    /// shrink the dwell.
    pub fn observe(&mut self, now: Instant, assessment: &QualityAssessment) -> FrameVerdict {
        if let TrackerState::Cooldown { until } = self.state {
            if now >= until {
                self.state = TrackerState::Idle;
            }
        }

        match self.state {
            TrackerState::Recognizing | TrackerState::Cooldown { .. } => FrameVerdict::idle(),
            TrackerState::Idle => {
                if assessment.single_face() && assessment.is_acceptable() {
                    self.state = TrackerState::Tracking {
                        since: now,
                        last_frame: now,
                    };
                }
                FrameVerdict::idle()
            }
            TrackerState::Tracking { since, last_frame } => {
                if !assessment.single_face() {
                    self.state = TrackerState::Idle;
                    return FrameVerdict::idle();
                }
                if !assessment.is_acceptable() {
                    match self.quality_drop {
                        QualityDropPolicy::Reset => {
                            self.state = TrackerState::Idle;
                            return FrameVerdict::idle();
                        }
                        QualityDropPolicy::Pause => {
                            // Shift the start forward by the gap so the
                            // bad stretch does not count as dwell.
                            let shifted = since + now.saturating_duration_since(last_frame);
                            self.state = TrackerState::Tracking {
                                since: shifted,
                                last_frame: now,
                            };
                            return FrameVerdict {
                                progress: self.fraction(now.saturating_duration_since(shifted)),
                                trigger: false,
                            };
                        }
                    }
                }

                self.state = TrackerState::Tracking {
                    since,
                    last_frame: now,
                };
                let held = now.saturating_duration_since(since);
                let progress = self.fraction(held);
                if progress >= 1.0 && self.auto_recognize {
                    self.state = TrackerState::Recognizing;
                    tracing::debug!(held_ms = held.as_millis() as u64, "stability reached, firing attempt");
                    return FrameVerdict {
                        progress: 1.0,
                        trigger: true,
                    };
                }
                FrameVerdict {
                    progress,
                    trigger: false,
                }
            }
        }
    }

    /// Called once when an attempt resolves, whatever the outcome.
    /// Moves Recognizing into Cooldown; any other state is left alone.
    pub fn complete_attempt(&mut self, now: Instant) {
        if matches!(self.state, TrackerState::Recognizing) {
            self.state = TrackerState::Cooldown {
                until: now + self.cooldown,
            };
        }
    }

    /// Back to Idle, dropping any progress, attempt or cooldown.
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
    }

    fn fraction(&self, held: Duration) -> f32 {
        if self.threshold.is_zero() {
            return 1.0;
        }
        (held.as_secs_f32() / self.threshold.as_secs_f32()).clamp(0.0, 1.0)
    }
}
