//! The recognition engine: one coordinating task owning the camera
//! arbiter, the stability tracker and the offline cache.
//!
//! Frames flow from the active camera through a detection worker into
//! the coordinator, which gates them on quality and dwell time, runs at
//! most one recognition attempt at a time, and pushes typed events to
//! the host. Hosts drive it through a clone-safe [`EngineHandle`].

use crate::arbiter::{FrameSource, GlassesStatus, SourceArbiter, SourceError, SourceMode};
use crate::attempt::{run_cloud_attempt, AttemptOutcome};
use crate::config::PipelineConfig;
use crate::events::PipelineEvent;
use crate::registry::{KnownPersonRegistry, PhotoStorage};
use crate::stability::StabilityTracker;
use chrono::Utc;
use image::DynamicImage;
use kith_cloud::{CloudCapability, CloudMatch, MatchBudget};
use kith_core::fingerprint::FaceFingerprint;
use kith_core::frame::{Frame, SourceTag};
use kith_core::observation::{FaceObservation, LandmarkDetector};
use kith_core::offline::{CachedFaceRecord, OfflineMatcher};
use kith_core::person::{MatchSource, RecognitionMatch};
use kith_core::quality::{QualityAssessment, QualityScorer};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

// --- Channel capacities ---
const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 64;
const SCORED_BUFFER: usize = 8;

/// Longest edge of the thumbnail stored with an offline record.
const THUMBNAIL_EDGE: u32 = 96;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine task exited")]
    ChannelClosed,
    #[error("source: {0}")]
    Source(#[from] SourceError),
}

/// Snapshot answered by [`EngineHandle::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub arbiter: crate::arbiter::ArbiterStatus,
    pub cloud_available: bool,
    pub offline_records: usize,
}

/// Everything the host wires in: capabilities, directories and cameras.
pub struct EngineDeps {
    pub detector: Arc<dyn LandmarkDetector>,
    pub registry: Arc<dyn KnownPersonRegistry>,
    pub photos: Arc<dyn PhotoStorage>,
    pub cloud: CloudCapability,
    pub phone: Box<dyn FrameSource>,
    pub glasses: Option<Box<dyn FrameSource>>,
}

/// Messages sent from host calls to the engine task.
enum EngineCommand {
    Start {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetMode {
        mode: SourceMode,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    SetGlassesStatus {
        status: GlassesStatus,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
    Shutdown,
}

/// Clone-safe handle to the engine task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Start streaming from the selected camera.
    pub async fn start(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Start { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Stop streaming, aborting any in-flight attempt.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Stop { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn set_mode(&self, mode: SourceMode) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::SetMode {
                mode,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn set_glasses_status(&self, status: GlassesStatus) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::SetGlassesStatus {
                status,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Ask the engine task to exit. Idempotent from the caller's side:
    /// a handle whose engine is already gone gets `ChannelClosed`.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.tx
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// A frame after detection and scoring.
struct ScoredFrame {
    frame: Frame,
    observations: Vec<FaceObservation>,
    assessment: QualityAssessment,
}

/// Spawn the engine and its detection worker.
///
/// The returned receiver carries every [`PipelineEvent`]; delivery is
/// best effort, so a host that stops reading loses events, not frames.
pub fn spawn_engine(
    config: PipelineConfig,
    deps: EngineDeps,
) -> (EngineHandle, mpsc::Receiver<PipelineEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (frame_tx, frame_rx) = mpsc::channel(config.frame_buffer.max(1));
    let (scored_tx, scored_rx) = mpsc::channel(SCORED_BUFFER);
    let (attempt_tx, attempt_rx) = mpsc::channel(1);

    tokio::spawn(detection_worker(frame_rx, scored_tx, deps.detector));

    let arbiter = SourceArbiter::new(config.source_mode, deps.phone, deps.glasses, frame_tx);
    let offline = OfflineMatcher::load(&config.cache_path);
    let tracker = StabilityTracker::new(&config);

    let engine = Engine {
        config,
        arbiter,
        tracker,
        offline,
        cloud: Arc::new(deps.cloud),
        registry: deps.registry,
        photos: deps.photos,
        events: event_tx,
        attempt_tx,
        attempt: None,
        next_generation: 0,
    };
    tokio::spawn(engine.run(cmd_rx, scored_rx, attempt_rx));

    (EngineHandle { tx: cmd_tx }, event_rx)
}

/// Detect and score frames off the coordinator, so a slow detector
/// backs up the bounded frame channel instead of the command loop.
async fn detection_worker(
    mut frames: mpsc::Receiver<Frame>,
    scored: mpsc::Sender<ScoredFrame>,
    detector: Arc<dyn LandmarkDetector>,
) {
    let scorer = QualityScorer::new();
    while let Some(frame) = frames.recv().await {
        let observations = detector.detect(&frame.image);
        let assessment = scorer.assess(&frame.image, &observations);
        let item = ScoredFrame {
            frame,
            observations,
            assessment,
        };
        if scored.send(item).await.is_err() {
            break;
        }
    }
    tracing::debug!("detection worker exiting");
}

enum Flow {
    Continue,
    Shutdown,
}

/// The in-flight recognition attempt, plus everything needed to cache a
/// successful outcome.
struct PendingAttempt {
    handle: JoinHandle<()>,
    generation: u64,
    fingerprint: Option<FaceFingerprint>,
    thumbnail: Vec<u8>,
}

struct Engine {
    config: PipelineConfig,
    arbiter: SourceArbiter,
    tracker: StabilityTracker,
    offline: OfflineMatcher,
    cloud: Arc<CloudCapability>,
    registry: Arc<dyn KnownPersonRegistry>,
    photos: Arc<dyn PhotoStorage>,
    events: mpsc::Sender<PipelineEvent>,
    attempt_tx: mpsc::Sender<(u64, AttemptOutcome)>,
    attempt: Option<PendingAttempt>,
    next_generation: u64,
}

impl Engine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<EngineCommand>,
        mut scored: mpsc::Receiver<ScoredFrame>,
        mut attempts: mpsc::Receiver<(u64, AttemptOutcome)>,
    ) {
        tracing::info!(
            mode = ?self.config.source_mode,
            cloud = self.cloud.is_available(),
            cached = self.offline.len(),
            "engine task started"
        );
        if !self.cloud.is_available() {
            self.emit(PipelineEvent::CloudUnavailable);
        }

        loop {
            tokio::select! {
                maybe_cmd = commands.recv() => match maybe_cmd {
                    Some(cmd) => {
                        if matches!(self.handle_command(cmd), Flow::Shutdown) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(item) = scored.recv() => self.handle_scored(item),
                Some((generation, outcome)) = attempts.recv() => {
                    self.handle_attempt_outcome(generation, outcome);
                }
            }
        }

        self.arbiter.stop();
        self.cancel_attempt();
        tracing::info!("engine task exiting");
    }

    fn handle_command(&mut self, cmd: EngineCommand) -> Flow {
        match cmd {
            EngineCommand::Start { reply } => {
                let result = self.arbiter.start().map_err(EngineError::from);
                if result.is_ok() {
                    self.emit_source_status();
                }
                let _ = reply.send(result);
            }
            EngineCommand::Stop { reply } => {
                self.arbiter.stop();
                self.cancel_attempt();
                self.tracker.reset();
                self.emit_source_status();
                let _ = reply.send(());
            }
            EngineCommand::SetMode { mode, reply } => {
                let before = self.arbiter.status().selected;
                let result = self.arbiter.set_mode(mode).map_err(EngineError::from);
                self.after_reselect(before);
                let _ = reply.send(result);
            }
            EngineCommand::SetGlassesStatus { status, reply } => {
                let before = self.arbiter.status().selected;
                let result = self
                    .arbiter
                    .set_glasses_status(status)
                    .map_err(EngineError::from);
                self.after_reselect(before);
                let _ = reply.send(result);
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    /// After a mode or glasses change: a camera handover invalidates the
    /// dwell and any in-flight attempt, since their frames came from the
    /// old camera.
    fn after_reselect(&mut self, before: SourceTag) {
        if self.arbiter.status().selected != before {
            self.cancel_attempt();
            self.tracker.reset();
        }
        self.emit_source_status();
    }

    fn handle_scored(&mut self, item: ScoredFrame) {
        let verdict = self.tracker.observe(item.frame.captured_at, &item.assessment);
        self.emit(PipelineEvent::FrameScored {
            assessment: item.assessment.clone(),
            progress: verdict.progress,
        });
        if verdict.trigger {
            self.begin_attempt(item);
        }
    }

    fn begin_attempt(&mut self, item: ScoredFrame) {
        self.cancel_attempt();

        let fingerprint = item
            .observations
            .first()
            .map(FaceFingerprint::from_observation);
        let thumbnail = thumbnail_jpeg(&item.frame.image);

        self.next_generation += 1;
        let generation = self.next_generation;
        tracing::info!(
            generation,
            source = ?item.frame.origin,
            score = item.assessment.score,
            "face held steady, starting recognition attempt"
        );
        self.emit(PipelineEvent::RecognitionStarted {
            frame: item.frame.clone(),
        });

        let budget = MatchBudget {
            time_budget: self.config.attempt_budget,
            max_concurrency: self.config.max_concurrency,
        };
        let cloud = Arc::clone(&self.cloud);
        let registry = Arc::clone(&self.registry);
        let photos = Arc::clone(&self.photos);
        let threshold = self.config.similarity_threshold;
        let outcome_tx = self.attempt_tx.clone();
        let frame = item.frame;

        let handle = tokio::spawn(async move {
            let outcome = run_cloud_attempt(cloud, registry, photos, frame, threshold, budget).await;
            let _ = outcome_tx.send((generation, outcome)).await;
        });

        self.attempt = Some(PendingAttempt {
            handle,
            generation,
            fingerprint,
            thumbnail,
        });
    }

    fn handle_attempt_outcome(&mut self, generation: u64, outcome: AttemptOutcome) {
        let Some(attempt) = self.attempt.take() else {
            tracing::debug!(generation, "outcome for a cancelled attempt, dropped");
            return;
        };
        if attempt.generation != generation {
            tracing::debug!(
                generation,
                current = attempt.generation,
                "stale attempt outcome, dropped"
            );
            self.attempt = Some(attempt);
            return;
        }

        let outcome = match outcome {
            AttemptOutcome::Cloud(Some(m)) => {
                self.remember(&attempt, &m);
                Some(RecognitionMatch {
                    person_id: m.person_id,
                    similarity: m.similarity,
                    source: MatchSource::Cloud,
                })
            }
            AttemptOutcome::Cloud(None) => None,
            AttemptOutcome::CloudFailed => self.offline_fallback(&attempt),
        };

        self.tracker.complete_attempt(Instant::now());
        match &outcome {
            Some(m) => tracing::info!(
                person = %m.person_id,
                similarity = m.similarity,
                source = %m.source,
                "attempt resolved: match"
            ),
            None => tracing::info!("attempt resolved: nobody recognized"),
        }
        self.emit(PipelineEvent::MatchCompleted { outcome });
    }

    /// Deposit a cloud-confirmed sighting in the offline cache.
    fn remember(&mut self, attempt: &PendingAttempt, m: &CloudMatch) {
        let Some(fingerprint) = attempt.fingerprint.clone() else {
            return;
        };
        let record = CachedFaceRecord {
            person_id: m.person_id,
            fingerprint,
            thumbnail: attempt.thumbnail.clone(),
            created_at: Utc::now(),
        };
        if let Err(error) = self.offline.insert(record) {
            tracing::warn!(%error, "offline cache write failed");
        }
    }

    fn offline_fallback(&self, attempt: &PendingAttempt) -> Option<RecognitionMatch> {
        let fingerprint = attempt.fingerprint.as_ref()?;
        let m = self.offline.best_match(fingerprint)?;
        Some(RecognitionMatch {
            person_id: m.person_id,
            similarity: m.similarity,
            source: MatchSource::Offline,
        })
    }

    fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.handle.abort();
            tracing::info!(generation = attempt.generation, "in-flight attempt aborted");
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            arbiter: self.arbiter.status(),
            cloud_available: self.cloud.is_available(),
            offline_records: self.offline.len(),
        }
    }

    fn emit_source_status(&self) {
        self.emit(PipelineEvent::SourceChanged {
            status: self.arbiter.status(),
        });
    }

    fn emit(&self, event: PipelineEvent) {
        if let Err(error) = self.events.try_send(event) {
            tracing::debug!(%error, "event dropped, subscriber behind");
        }
    }
}

fn thumbnail_jpeg(image: &DynamicImage) -> Vec<u8> {
    let thumb = image.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
    let mut buf = Cursor::new(Vec::new());
    if let Err(error) = thumb.write_to(&mut buf, image::ImageFormat::Jpeg) {
        tracing::warn!(%error, "thumbnail encode failed, record stored without one");
        return Vec::new();
    }
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryRegistry;
    use image::{GrayImage, Luma};
    use kith_cloud::{CloudCredentials, CloudMatcher};
    use kith_core::observation::{FaceLandmarks, NormPoint, NormRect};
    use kith_core::person::{KnownPerson, PersonId, PhotoId};
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// A camera the test drives by hand: frames go in only through
    /// `push`, and only while the arbiter has the source started.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        sink: Arc<Mutex<Option<mpsc::Sender<Frame>>>>,
    }

    impl ScriptedSource {
        async fn push(&self, frame: Frame) {
            let sender = self.sink.lock().unwrap().clone();
            if let Some(sender) = sender {
                let _ = sender.send(frame).await;
            }
        }

        fn is_streaming(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self, sink: mpsc::Sender<Frame>) -> Result<(), SourceError> {
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop(&mut self) {
            self.sink.lock().unwrap().take();
        }
    }

    /// Always reports the same well-posed face.
    #[derive(Default)]
    struct ScriptedDetector;

    impl LandmarkDetector for ScriptedDetector {
        fn detect(&self, _image: &DynamicImage) -> Vec<FaceObservation> {
            vec![good_observation()]
        }
    }

    fn good_observation() -> FaceObservation {
        FaceObservation {
            rect: NormRect {
                x: 0.3,
                y: 0.3,
                width: 0.4,
                height: 0.4,
            },
            confidence: 0.95,
            landmarks: FaceLandmarks {
                left_eye: Some(NormPoint { x: 0.6, y: 0.42 }),
                right_eye: Some(NormPoint { x: 0.4, y: 0.42 }),
                nose: Some(NormPoint { x: 0.5, y: 0.5 }),
                inner_mouth: Some(NormPoint { x: 0.5, y: 0.62 }),
            },
            yaw: 0.0,
            roll: 0.0,
        }
    }

    /// Bright, sharp test pattern; scores 100 with `good_observation`.
    fn checkerboard() -> DynamicImage {
        let img = GrayImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([100])
            } else {
                Luma([160])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    fn frame_at(t: Instant) -> Frame {
        let mut frame = Frame::new(checkerboard(), SourceTag::Phone);
        frame.captured_at = t;
        frame
    }

    fn deps(
        cloud: CloudCapability,
        phone: &ScriptedSource,
        registry: Arc<MemoryRegistry>,
    ) -> EngineDeps {
        EngineDeps {
            detector: Arc::new(ScriptedDetector),
            registry: registry.clone(),
            photos: registry,
            cloud,
            phone: Box::new(phone.clone()),
            glasses: None,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<PipelineEvent>) -> PipelineEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    /// Collect events until the next `MatchCompleted`.
    async fn events_until_match(
        rx: &mut mpsc::Receiver<PipelineEvent>,
    ) -> (Vec<PipelineEvent>, Option<RecognitionMatch>) {
        let mut seen = Vec::new();
        loop {
            match next_event(rx).await {
                PipelineEvent::MatchCompleted { outcome } => return (seen, outcome),
                event => seen.push(event),
            }
        }
    }

    /// 100 ms cadence from `t0`; frame 15 crosses the 1.5 s threshold.
    async fn push_dwell(source: &ScriptedSource, t0: Instant) {
        for k in 0..=16 {
            source.push(frame_at(t0 + Duration::from_millis(100 * k))).await;
        }
    }

    #[tokio::test]
    async fn test_unmatched_attempt_without_cloud_or_cache() -> anyhow::Result<()> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let mut config = PipelineConfig::default();
        config.cache_path = dir.path().join("cache.json");

        let source = ScriptedSource::default();
        let registry = Arc::new(MemoryRegistry::default());
        let (handle, mut events) =
            spawn_engine(config, deps(CloudCapability::Unavailable, &source, registry));

        // Credential-less engines announce offline mode up front.
        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::CloudUnavailable
        ));

        handle.start().await?;
        push_dwell(&source, Instant::now()).await;

        let (seen, outcome) = events_until_match(&mut events).await;
        assert_eq!(outcome, None);

        let started = seen
            .iter()
            .filter(|e| matches!(e, PipelineEvent::RecognitionStarted { .. }))
            .count();
        assert_eq!(started, 1);
        assert!(seen.iter().any(|e| matches!(
            e,
            PipelineEvent::FrameScored { progress, .. } if *progress == 1.0
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_cloud_failure_falls_back_to_cache() -> anyhow::Result<()> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let cache_path = dir.path().join("cache.json");

        // Seed the cache with a sighting whose fingerprint matches what
        // the scripted detector will produce.
        let person = PersonId::new();
        let mut seed = OfflineMatcher::load(&cache_path);
        seed.insert(CachedFaceRecord {
            person_id: person,
            fingerprint: FaceFingerprint::from_observation(&good_observation()),
            thumbnail: Vec::new(),
            created_at: Utc::now(),
        })?;
        drop(seed);

        let mut config = PipelineConfig::default();
        config.cache_path = cache_path;

        let source = ScriptedSource::default();
        let registry = Arc::new(MemoryRegistry::default());
        let (handle, mut events) =
            spawn_engine(config, deps(CloudCapability::Unavailable, &source, registry));
        handle.start().await?;
        push_dwell(&source, Instant::now()).await;

        let (_, outcome) = events_until_match(&mut events).await;
        let m = outcome.expect("cache should name the person");
        assert_eq!(m.person_id, person);
        assert_eq!(m.source, MatchSource::Offline);
        assert!((m.similarity - 100.0).abs() < 1e-3);
        Ok(())
    }

    #[tokio::test]
    async fn test_cloud_match_lands_in_cache() -> anyhow::Result<()> {
        init_tracing();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "FaceMatches": [ { "Similarity": 99.0 } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let cache_path = dir.path().join("cache.json");
        let mut config = PipelineConfig::default();
        config.cache_path = cache_path.clone();

        let person = PersonId::new();
        let mut registry = MemoryRegistry::default();
        registry.add_person(
            KnownPerson {
                id: person,
                display_name: "Alice".into(),
                relationship: "daughter".into(),
                reference_photos: vec![PhotoId::from("alice-1")],
            },
            vec![(PhotoId::from("alice-1"), checkerboard())],
        );

        let creds = CloudCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "secret".into(),
            region: "us-east-1".into(),
        };
        let cloud =
            CloudCapability::Available(CloudMatcher::new(creds).with_endpoint(&server.uri()));

        let source = ScriptedSource::default();
        let (handle, mut events) = spawn_engine(config, deps(cloud, &source, Arc::new(registry)));
        handle.start().await?;
        push_dwell(&source, Instant::now()).await;

        let (seen, outcome) = events_until_match(&mut events).await;
        let started = seen
            .iter()
            .filter(|e| matches!(e, PipelineEvent::RecognitionStarted { .. }))
            .count();
        assert_eq!(started, 1);

        let m = outcome.expect("cloud should match");
        assert_eq!(m.person_id, person);
        assert_eq!(m.source, MatchSource::Cloud);
        assert!((m.similarity - 99.0).abs() < 1e-3);

        // The sighting was written through to the offline cache.
        let cached: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&cache_path)?)?;
        let records = cached.as_array().expect("cache file is a JSON array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["person_id"], serde_json::json!(person));
        Ok(())
    }

    #[tokio::test]
    async fn test_cooldown_then_second_attempt() -> anyhow::Result<()> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let mut config = PipelineConfig::default();
        config.cache_path = dir.path().join("cache.json");

        let source = ScriptedSource::default();
        let registry = Arc::new(MemoryRegistry::default());
        let (handle, mut events) =
            spawn_engine(config, deps(CloudCapability::Unavailable, &source, registry));
        handle.start().await?;

        let t0 = Instant::now();
        push_dwell(&source, t0).await;
        let (_, outcome) = events_until_match(&mut events).await;
        assert_eq!(outcome, None);

        // Frames inside the cooldown window make no progress.
        source.push(frame_at(t0 + Duration::from_secs(3))).await;

        // Past the cooldown a fresh dwell fires a second attempt.
        push_dwell(&source, t0 + Duration::from_secs(7)).await;
        let (seen, _) = events_until_match(&mut events).await;
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, PipelineEvent::RecognitionStarted { .. }))
                .count(),
            1
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_source_control_and_status() -> anyhow::Result<()> {
        init_tracing();
        let dir = tempfile::tempdir()?;
        let mut config = PipelineConfig::default();
        config.cache_path = dir.path().join("cache.json");

        let phone = ScriptedSource::default();
        let glasses = ScriptedSource::default();
        let registry = Arc::new(MemoryRegistry::default());
        let mut engine_deps = deps(CloudCapability::Unavailable, &phone, registry);
        engine_deps.glasses = Some(Box::new(glasses.clone()));

        let (handle, mut events) = spawn_engine(config, engine_deps);
        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::CloudUnavailable
        ));

        handle.start().await?;
        let status = handle.status().await?;
        assert_eq!(status.arbiter.selected, SourceTag::Phone);
        assert!(status.arbiter.streaming);
        assert!(!status.cloud_available);
        assert_eq!(status.offline_records, 0);
        assert!(phone.is_streaming());

        match next_event(&mut events).await {
            PipelineEvent::SourceChanged { status } => {
                assert!(status.streaming);
                assert_eq!(status.selected, SourceTag::Phone);
            }
            other => panic!("expected SourceChanged, got {other:?}"),
        }

        // Usable glasses in auto mode take over the stream.
        handle
            .set_glasses_status(GlassesStatus {
                registered: true,
                device_active: true,
            })
            .await?;
        match next_event(&mut events).await {
            PipelineEvent::SourceChanged { status } => {
                assert_eq!(status.selected, SourceTag::Glasses);
            }
            other => panic!("expected SourceChanged, got {other:?}"),
        }
        assert!(glasses.is_streaming());
        assert!(!phone.is_streaming());

        handle.stop().await?;
        match next_event(&mut events).await {
            PipelineEvent::SourceChanged { status } => assert!(!status.streaming),
            other => panic!("expected SourceChanged, got {other:?}"),
        }
        assert!(!glasses.is_streaming());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.cache_path = dir.path().join("cache.json");

        let source = ScriptedSource::default();
        let registry = Arc::new(MemoryRegistry::default());
        let (handle, _events) =
            spawn_engine(config, deps(CloudCapability::Unavailable, &source, registry));

        handle.shutdown().await.unwrap();
        let err = handle.status().await.unwrap_err();
        assert!(matches!(err, EngineError::ChannelClosed));
    }
}
