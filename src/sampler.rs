//! The frame sampler: drives the detector on a cadence and feeds the
//! aggregator.
//!
//! One loop owns every piece of mutable state: collaborators, aggregator,
//! statistics, and history. Only one detection is in flight at a time; the
//! next frame is not requested until the previous result has been folded in.
//! Teardown through a [`LoopHandle`] cancels pending ticks, drops an
//! outstanding detection, and a liveness check before each mutation keeps
//! late results from changing anything.

use crate::config::{duration_ms, Config};
use crate::core::aggregator::{AggregatorSettings, EmotionAggregator};
use crate::core::history::LabelHistory;
use crate::core::label::StableEmotion;
use crate::core::state::{assess, LoopEvent, LoopState, Readiness};
use crate::presenter::{Overlay, Presenter};
use crate::provider::source::{ModelProvider, ProviderError, VideoSource};
use crate::provider::types::DetectionSample;
use crate::stats::{create_shared_stats, SharedSessionStats, StatsSnapshot};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use uuid::Uuid;

/// Roughly one display refresh at 60 Hz.
pub const ANIMATION_FRAME: Duration = Duration::from_millis(16);

/// How often the detector is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Cadence {
    /// As fast as frames are displayed; the aggregator does the throttling.
    /// A zero interval yields to the runtime between samples.
    Continuous {
        #[serde(with = "duration_ms")]
        frame_interval: Duration,
    },
    /// One sample per period.
    FixedInterval {
        #[serde(with = "duration_ms")]
        period: Duration,
    },
}

impl Cadence {
    pub fn continuous() -> Self {
        Cadence::Continuous {
            frame_interval: ANIMATION_FRAME,
        }
    }

    pub fn every(period: Duration) -> Self {
        Cadence::FixedInterval { period }
    }

    pub fn delay(&self) -> Duration {
        match self {
            Cadence::Continuous { frame_interval } => *frame_interval,
            Cadence::FixedInterval { period } => *period,
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::continuous()
    }
}

/// Errors that end the loop.
#[derive(Debug, Error)]
pub enum LoopError {
    /// A resource will never become ready; the message is meant for the user.
    #[error("{0}")]
    ResourceUnavailable(String),
}

/// Stops a running loop. Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    alive: Arc<AtomicBool>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl LoopHandle {
    pub fn stop(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            tracing::info!("detection loop teardown requested");
        }
        self.stop_tx.send_replace(true);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// What a finished loop leaves behind.
#[derive(Debug)]
pub struct LoopReport {
    pub session_id: Uuid,
    pub final_emotion: StableEmotion,
    pub history: LabelHistory,
    pub stats: StatsSnapshot,
}

enum Step {
    Continue,
    Finished,
}

enum Sampled {
    Sample {
        sample: DetectionSample,
        frame_size: (u32, u32),
    },
    Failed,
    EndOfStream,
    Cancelled,
}

/// Waits for the next sampling slot.
struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    fn new(cadence: Cadence) -> Self {
        let delay = cadence.delay();
        if delay.is_zero() {
            return Self { interval: None };
        }
        let mut interval = tokio::time::interval(delay);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Some(interval),
        }
    }

    async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => tokio::task::yield_now().await,
        }
    }
}

/// The sampling loop.
pub struct DetectionLoop<P, V, R> {
    provider: P,
    video: V,
    presenter: R,
    aggregator: EmotionAggregator,
    cadence: Cadence,
    state: LoopState,
    stats: SharedSessionStats,
    history: LabelHistory,
    last_published: Option<StableEmotion>,
    handle: LoopHandle,
    stop_rx: watch::Receiver<bool>,
}

impl<P, V, R> DetectionLoop<P, V, R>
where
    P: ModelProvider,
    V: VideoSource,
    R: Presenter,
{
    pub fn new(
        provider: P,
        video: V,
        presenter: R,
        settings: AggregatorSettings,
        cadence: Cadence,
    ) -> (Self, LoopHandle) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = LoopHandle {
            alive: Arc::new(AtomicBool::new(true)),
            stop_tx: Arc::new(stop_tx),
        };

        let detection_loop = Self {
            provider,
            video,
            presenter,
            aggregator: EmotionAggregator::new(settings),
            cadence,
            state: LoopState::AwaitingModels,
            stats: create_shared_stats(),
            history: LabelHistory::new(),
            last_published: None,
            handle: handle.clone(),
            stop_rx,
        };
        (detection_loop, handle)
    }

    pub fn from_config(provider: P, video: V, presenter: R, config: &Config) -> (Self, LoopHandle) {
        Self::new(
            provider,
            video,
            presenter,
            AggregatorSettings::from(config),
            config.cadence,
        )
    }

    /// Share statistics with the caller.
    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stable(&self) -> &StableEmotion {
        self.aggregator.stable()
    }

    /// Run until stopped, the sample stream ends, or a resource fails.
    pub async fn run(mut self) -> Result<LoopReport, LoopError> {
        let mut ticker = Ticker::new(self.cadence);
        tracing::info!(
            session = %self.history.session_id,
            cadence = ?self.cadence,
            strategy = ?self.aggregator.settings().strategy,
            "detection loop started"
        );
        self.presenter.status(self.state.status_message());

        let outcome = loop {
            if !self.handle.is_alive() {
                break Ok(());
            }

            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => continue,
                _ = ticker.tick() => {}
            }

            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Finished) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.state = self.state.next(&LoopEvent::Stop);
        outcome?;

        self.presenter.status(self.state.status_message());
        tracing::info!(
            session = %self.history.session_id,
            labels = self.history.len(),
            "detection loop stopped"
        );

        Ok(LoopReport {
            session_id: self.history.session_id,
            final_emotion: self.aggregator.stable().clone(),
            stats: self.stats.snapshot(),
            history: self.history,
        })
    }

    /// One tick: gate, sample, fold in, maybe flush.
    async fn step(&mut self) -> Result<Step, LoopError> {
        let readiness = assess(&self.provider.poll_status(), &self.video.poll_status());
        self.transition(LoopEvent::Readiness(readiness.clone()));

        let native = match readiness {
            Readiness::Failed(message) => {
                tracing::error!(%message, "resource unavailable, stopping detection");
                self.presenter.status(&message);
                return Err(LoopError::ResourceUnavailable(message));
            }
            Readiness::AwaitingModels | Readiness::AwaitingVideo => {
                self.stats.record_not_ready();
                self.flush_if_due();
                return Ok(Step::Continue);
            }
            Readiness::Ready { width, height } => (width, height),
        };

        match self.sample().await {
            Sampled::Sample { sample, frame_size } => self.fold(sample, frame_size, native),
            Sampled::Failed => {}
            Sampled::EndOfStream | Sampled::Cancelled => return Ok(Step::Finished),
        }

        self.flush_if_due();
        Ok(Step::Continue)
    }

    async fn sample(&mut self) -> Sampled {
        let frame = match self.video.capture() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, retrying next tick");
                self.stats.record_detection_failure();
                return Sampled::Failed;
            }
        };

        let result = {
            let detection = self.provider.detect(&frame);
            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => None,
                result = detection => Some(result),
            }
        };

        let Some(result) = result else {
            tracing::debug!("teardown during detection, result discarded");
            return Sampled::Cancelled;
        };
        if !self.handle.is_alive() {
            return Sampled::Cancelled;
        }

        match result {
            Ok(sample) => Sampled::Sample {
                sample,
                frame_size: (frame.width, frame.height),
            },
            Err(ProviderError::EndOfStream) => {
                tracing::info!("sample stream ended");
                Sampled::EndOfStream
            }
            Err(e) => {
                tracing::warn!(error = %e, "detection failed, retrying next tick");
                self.stats.record_detection_failure();
                Sampled::Failed
            }
        }
    }

    fn fold(&mut self, sample: DetectionSample, frame_size: (u32, u32), native: (u32, u32)) {
        if !self.handle.is_alive() {
            return;
        }
        self.stats.record_sample(&sample);
        tracing::debug!(
            faces = sample.faces().len(),
            buffered = self.aggregator.buffered(),
            "sample received"
        );

        let overlay = Overlay {
            width: native.0,
            height: native.1,
            faces: sample
                .faces()
                .iter()
                .filter_map(|face| face.geometry.as_ref())
                .map(|geometry| geometry.resized(frame_size, native))
                .collect(),
        };
        self.presenter.overlay(&overlay);

        if let Some(label) = self.aggregator.ingest(&sample, Utc::now()) {
            self.publish(label);
        }
    }

    fn flush_if_due(&mut self) {
        let now = Utc::now();
        if !self.handle.is_alive() || !self.aggregator.is_flush_due(now) {
            return;
        }

        self.transition(LoopEvent::FlushDue);
        match self.aggregator.flush(now) {
            Some(label) => {
                self.stats.record_flush();
                self.publish(label);
            }
            None => tracing::debug!("empty window at cycle end, label unchanged"),
        }
        self.transition(LoopEvent::Flushed);
    }

    fn publish(&mut self, label: StableEmotion) {
        if !self.handle.is_alive() {
            return;
        }

        let changed = self
            .last_published
            .as_ref()
            .map(|previous| !previous.same_label(&label))
            .unwrap_or(true);
        if changed {
            self.stats.record_label_change();
            tracing::info!(
                emotion = label.name(),
                emoji = %label.emoji,
                samples = label.samples,
                top_score = label.top_score,
                "label changed"
            );
        } else {
            tracing::debug!(emotion = label.name(), samples = label.samples, "label confirmed");
        }

        self.history.record(&label);
        self.presenter.present(&label);
        self.last_published = Some(label);
    }

    fn transition(&mut self, event: LoopEvent) {
        let next = self.state.next(&event);
        if next == self.state {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "loop state changed");

        let announce = next != LoopState::Stopped
            && next.status_message() != self.state.status_message();
        self.state = next;
        if announce {
            self.presenter.status(next.status_message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregator::AbsencePolicy;
    use crate::presenter::{ChannelPresenter, PresenterEvent};
    use crate::provider::replay::{ReplayProvider, ReplayStep, SyntheticVideo};
    use crate::provider::source::{ArtifactStatus, ModelArtifact, ModelBundle};
    use crate::provider::types::{
        BoundingBox, Emotion, EmotionLabel, ExpressionVector, Face, FaceGeometry,
    };

    fn happy() -> DetectionSample {
        DetectionSample::single(ExpressionVector::new().with(Emotion::Happy, 0.95))
    }

    fn fast_settings() -> AggregatorSettings {
        AggregatorSettings {
            cycle_period: Duration::from_millis(40),
            ..AggregatorSettings::default()
        }
    }

    fn fast_cadence() -> Cadence {
        Cadence::Continuous {
            frame_interval: Duration::from_millis(5),
        }
    }

    fn emotions(events: &[PresenterEvent]) -> Vec<StableEmotion> {
        events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::Emotion(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    fn statuses(events: &[PresenterEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PresenterEvent::Status(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_cadence_serialization() {
        let json = serde_json::to_value(Cadence::continuous()).unwrap();
        assert_eq!(json["mode"], "continuous");
        assert_eq!(json["frame_interval"], 16);

        let cadence: Cadence =
            serde_json::from_str(r#"{"mode":"fixed_interval","period":1000}"#).unwrap();
        assert_eq!(cadence, Cadence::every(Duration::from_millis(1000)));
    }

    #[tokio::test]
    async fn test_stream_to_stable_label() {
        let provider = ReplayProvider::from_samples(vec![happy(); 30]);
        let video = SyntheticVideo::new(480, 360);
        let (presenter, events) = ChannelPresenter::new();
        let (detection_loop, _handle) =
            DetectionLoop::new(provider, video, presenter, fast_settings(), fast_cadence());

        let report = detection_loop.run().await.unwrap();
        let events: Vec<PresenterEvent> = events.try_iter().collect();

        let labels = emotions(&events);
        assert!(!labels.is_empty());
        assert!(labels
            .iter()
            .all(|l| l.emotion() == Some(&EmotionLabel::Known(Emotion::Happy))));
        assert_eq!(labels[0].emoji, "😂");

        assert_eq!(report.stats.frames_sampled, 30);
        assert_eq!(report.stats.label_changes, 1);
        assert_eq!(report.history.len(), labels.len());
        assert_eq!(report.final_emotion.emoji, "😂");
        assert_eq!(statuses(&events).last().map(String::as_str), Some("Stopped"));
    }

    #[tokio::test]
    async fn test_waits_for_models_and_video() {
        let provider = ReplayProvider::from_samples(vec![happy()]).with_load_delay(2);
        let video = SyntheticVideo::new(480, 360).with_warmup(3);
        let (presenter, events) = ChannelPresenter::new();
        let (detection_loop, _handle) =
            DetectionLoop::new(provider, video, presenter, fast_settings(), fast_cadence());

        let report = detection_loop.run().await.unwrap();
        let statuses = statuses(&events.try_iter().collect::<Vec<_>>());

        assert_eq!(
            statuses,
            vec![
                "Loading models...",
                "Models loaded. Waiting for camera...",
                "Detecting expressions...",
                "Stopped",
            ]
        );
        assert!(report.stats.not_ready_ticks >= 2);
        assert_eq!(report.stats.frames_sampled, 1);
    }

    #[tokio::test]
    async fn test_camera_denied_is_terminal() {
        let provider = ReplayProvider::from_samples(vec![happy(); 100]);
        let video = SyntheticVideo::denied("permission denied");
        let (presenter, events) = ChannelPresenter::new();
        let (detection_loop, _handle) =
            DetectionLoop::new(provider, video, presenter, fast_settings(), fast_cadence());

        let err = detection_loop.run().await.unwrap_err();
        let LoopError::ResourceUnavailable(message) = err;
        assert!(message.contains("Unable to access camera"));

        let statuses = statuses(&events.try_iter().collect::<Vec<_>>());
        assert_eq!(statuses.last(), Some(&message));
    }

    #[tokio::test]
    async fn test_model_failure_is_terminal() {
        let mut bundle = ModelBundle::loaded();
        bundle.set(
            ModelArtifact::FaceLandmarks,
            ArtifactStatus::Failed("not found".to_string()),
        );
        let provider = ReplayProvider::from_samples(vec![happy()]).with_bundle(bundle);
        let (presenter, _events) = ChannelPresenter::new();
        let (detection_loop, _handle) = DetectionLoop::new(
            provider,
            SyntheticVideo::new(480, 360),
            presenter,
            fast_settings(),
            fast_cadence(),
        );

        let err = detection_loop.run().await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to load models"));
    }

    #[tokio::test]
    async fn test_detection_errors_do_not_stop_the_loop() {
        let steps = vec![
            ReplayStep::Error {
                message: "inference failed".to_string(),
            },
            ReplayStep::from(happy()),
            ReplayStep::Error {
                message: "inference failed".to_string(),
            },
            ReplayStep::from(happy()),
        ];
        let (presenter, _events) = ChannelPresenter::new();
        let (detection_loop, _handle) = DetectionLoop::new(
            ReplayProvider::new(steps),
            SyntheticVideo::new(480, 360),
            presenter,
            fast_settings(),
            fast_cadence(),
        );

        let report = detection_loop.run().await.unwrap();
        assert_eq!(report.stats.detection_failures, 2);
        assert_eq!(report.stats.frames_sampled, 2);
        assert_eq!(report.stats.no_face_samples, 0);
    }

    #[tokio::test]
    async fn test_no_face_reported_immediately() {
        let samples = vec![happy(), happy(), DetectionSample::NoFace];
        let (presenter, events) = ChannelPresenter::new();
        let settings = AggregatorSettings {
            cycle_period: Duration::from_secs(60),
            absence: AbsencePolicy::Immediate,
            ..AggregatorSettings::default()
        };
        let (detection_loop, _handle) = DetectionLoop::new(
            ReplayProvider::from_samples(samples),
            SyntheticVideo::new(480, 360),
            presenter,
            settings,
            fast_cadence(),
        );

        let report = detection_loop.run().await.unwrap();
        let labels = emotions(&events.try_iter().collect::<Vec<_>>());
        assert_eq!(labels.len(), 1);
        assert!(labels[0].is_no_face());
        assert!(report.final_emotion.is_no_face());
    }

    #[tokio::test]
    async fn test_overlay_is_scaled_to_native_size() {
        let face = Face::new(ExpressionVector::new().with(Emotion::Neutral, 0.9)).with_geometry(
            FaceGeometry {
                bbox: BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: 100.0,
                    height: 100.0,
                    confidence: 0.8,
                },
                landmarks: Vec::new(),
            },
        );
        let samples = vec![DetectionSample::from_faces(vec![face]), DetectionSample::NoFace];
        let (presenter, events) = ChannelPresenter::new();
        let (detection_loop, _handle) = DetectionLoop::new(
            ReplayProvider::from_samples(samples),
            SyntheticVideo::new(480, 360),
            presenter,
            fast_settings(),
            fast_cadence(),
        );
        detection_loop.run().await.unwrap();

        let overlays: Vec<Overlay> = events
            .try_iter()
            .filter_map(|e| match e {
                PresenterEvent::Overlay(overlay) => Some(overlay),
                _ => None,
            })
            .collect();
        assert_eq!(overlays.len(), 2);
        assert_eq!(overlays[0].faces.len(), 1);
        assert_eq!((overlays[0].width, overlays[0].height), (480, 360));
        assert!(overlays[1].faces.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_during_detection() {
        let provider =
            ReplayProvider::from_samples(vec![happy(); 10]).with_latency(Duration::from_secs(5));
        let (presenter, events) = ChannelPresenter::new();
        let (detection_loop, handle) =
            DetectionLoop::new(provider, SyntheticVideo::new(480, 360), presenter, fast_settings(), fast_cadence());

        let stopper = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.stop();
        };
        let started = std::time::Instant::now();
        let (result, ()) = tokio::join!(detection_loop.run(), stopper);

        let report = result.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!handle.is_alive());
        assert_eq!(report.stats.frames_sampled, 0);
        assert!(report.history.is_empty());
        assert!(emotions(&events.try_iter().collect::<Vec<_>>()).is_empty());
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let (presenter, _events) = ChannelPresenter::new();
        let (detection_loop, handle) = DetectionLoop::new(
            ReplayProvider::from_samples(vec![happy(); 10]),
            SyntheticVideo::new(480, 360),
            presenter,
            fast_settings(),
            fast_cadence(),
        );
        handle.stop();
        handle.stop();

        let report = detection_loop.run().await.unwrap();
        assert_eq!(report.stats.frames_sampled, 0);
    }
}
