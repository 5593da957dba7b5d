//! Recorded sample streams and a synthetic video source.
//!
//! The expression model is external, so the agent can be driven from a JSON
//! Lines recording of detector output. One step per line:
//!
//! ```text
//! {"kind":"faces","faces":[{"expressions":{"happy":0.92,"neutral":0.06}}]}
//! {"kind":"no_face"}
//! {"kind":"error","message":"inference timed out"}
//! ```

use crate::provider::source::{ModelBundle, ModelProvider, ModelStatus, ProviderError, VideoSource, VideoStatus};
use crate::provider::types::{DetectionSample, Face, Frame};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::io::BufRead;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors reading a recording.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("could not read recording: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One recorded detector outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayStep {
    NoFace,
    Faces { faces: Vec<Face> },
    Error { message: String },
}

impl ReplayStep {
    fn into_result(self) -> Result<DetectionSample, ProviderError> {
        match self {
            ReplayStep::NoFace => Ok(DetectionSample::NoFace),
            ReplayStep::Faces { faces } => Ok(DetectionSample::from_faces(faces)),
            ReplayStep::Error { message } => Err(ProviderError::Detection(message)),
        }
    }
}

impl From<DetectionSample> for ReplayStep {
    fn from(sample: DetectionSample) -> Self {
        match sample {
            DetectionSample::NoFace => ReplayStep::NoFace,
            DetectionSample::Faces { faces } => ReplayStep::Faces { faces },
        }
    }
}

/// A model provider that replays recorded detector output.
///
/// Returns `ProviderError::EndOfStream` once the recording is exhausted.
pub struct ReplayProvider {
    steps: VecDeque<ReplayStep>,
    bundle: ModelBundle,
    load_polls_remaining: usize,
    latency: Duration,
}

impl ReplayProvider {
    /// A provider whose models are already loaded.
    pub fn new(steps: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            bundle: ModelBundle::loaded(),
            load_polls_remaining: 0,
            latency: Duration::ZERO,
        }
    }

    pub fn from_samples(samples: impl IntoIterator<Item = DetectionSample>) -> Self {
        Self::new(samples.into_iter().map(ReplayStep::from))
    }

    /// Parse a JSON Lines recording. Blank lines are skipped.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut steps = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let step = serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
                line: index + 1,
                source,
            })?;
            steps.push(step);
        }
        Ok(Self::new(steps))
    }

    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Report `Loading` for this many status polls before the bundle is ready.
    pub fn with_load_delay(mut self, polls: usize) -> Self {
        self.load_polls_remaining = polls;
        if polls > 0 {
            self.bundle = ModelBundle::pending();
        }
        self
    }

    /// Use an explicit bundle state, e.g. one with a failed artifact.
    pub fn with_bundle(mut self, bundle: ModelBundle) -> Self {
        self.bundle = bundle;
        self.load_polls_remaining = 0;
        self
    }

    /// Simulated inference time per detection.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl ModelProvider for ReplayProvider {
    fn poll_status(&mut self) -> ModelStatus {
        if self.load_polls_remaining > 0 {
            self.load_polls_remaining -= 1;
            if self.load_polls_remaining == 0 {
                self.bundle = ModelBundle::loaded();
            }
        }
        self.bundle.status()
    }

    fn detect(
        &mut self,
        _frame: &Frame,
    ) -> impl Future<Output = Result<DetectionSample, ProviderError>> + Send {
        let next = self.steps.pop_front();
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match next {
                Some(step) => step.into_result(),
                None => Err(ProviderError::EndOfStream),
            }
        }
    }
}

/// A video source with fixed native dimensions and no pixel data.
///
/// Reports `Pending` for a configurable number of polls to mimic a camera
/// that has not delivered metadata yet.
pub struct SyntheticVideo {
    width: u32,
    height: u32,
    warmup_polls: usize,
    failure: Option<String>,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            warmup_polls: 0,
            failure: None,
        }
    }

    pub fn with_warmup(mut self, polls: usize) -> Self {
        self.warmup_polls = polls;
        self
    }

    /// A source that can never be acquired.
    pub fn denied(reason: impl Into<String>) -> Self {
        let mut video = Self::new(0, 0);
        video.failure = Some(reason.into());
        video
    }
}

impl VideoSource for SyntheticVideo {
    fn poll_status(&mut self) -> VideoStatus {
        if let Some(reason) = &self.failure {
            return VideoStatus::Failed(reason.clone());
        }
        if self.warmup_polls > 0 {
            self.warmup_polls -= 1;
            return VideoStatus::Pending;
        }
        VideoStatus::from_metadata(self.width, self.height, true)
    }

    fn capture(&mut self) -> Result<Frame, ProviderError> {
        if self.failure.is_some() || self.warmup_polls > 0 {
            return Err(ProviderError::Capture("video not ready".to_string()));
        }
        Ok(Frame::new(Vec::new(), self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::Emotion;

    fn frame() -> Frame {
        Frame::new(Vec::new(), 480, 360)
    }

    #[test]
    fn test_parse_recording() {
        let recording = "\
{\"kind\":\"faces\",\"faces\":[{\"expressions\":{\"happy\":0.9}}]}

{\"kind\":\"no_face\"}
{\"kind\":\"error\",\"message\":\"boom\"}
";
        let provider = ReplayProvider::from_reader(recording.as_bytes()).unwrap();
        assert_eq!(provider.remaining(), 3);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let recording = "{\"kind\":\"no_face\"}\nnot json\n";
        match ReplayProvider::from_reader(recording.as_bytes()) {
            Err(ReplayError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other.map(|p| p.remaining())),
        }
    }

    #[tokio::test]
    async fn test_replay_in_order_then_end_of_stream() {
        let recording = "\
{\"kind\":\"faces\",\"faces\":[{\"expressions\":{\"sad\":0.7}}]}
{\"kind\":\"error\",\"message\":\"boom\"}
";
        let mut provider = ReplayProvider::from_reader(recording.as_bytes()).unwrap();
        let frame = frame();

        let first = provider.detect(&frame).await.unwrap();
        assert_eq!(first.first_face().unwrap().expressions.score(Emotion::Sad), 0.7);

        assert!(matches!(
            provider.detect(&frame).await,
            Err(ProviderError::Detection(message)) if message == "boom"
        ));
        assert!(matches!(
            provider.detect(&frame).await,
            Err(ProviderError::EndOfStream)
        ));
    }

    #[test]
    fn test_load_delay() {
        let mut provider = ReplayProvider::new(Vec::new()).with_load_delay(2);
        assert_eq!(provider.poll_status(), ModelStatus::Loading);
        assert_eq!(provider.poll_status(), ModelStatus::Ready);
        assert!(provider.ready());
    }

    #[test]
    fn test_synthetic_video_warmup_and_denial() {
        let mut video = SyntheticVideo::new(480, 360).with_warmup(1);
        assert!(video.capture().is_err());
        assert_eq!(video.poll_status(), VideoStatus::Pending);
        assert_eq!(
            video.poll_status(),
            VideoStatus::Ready {
                width: 480,
                height: 360
            }
        );
        assert_eq!(video.capture().unwrap().width, 480);

        let mut denied = SyntheticVideo::denied("permission denied");
        assert_eq!(
            denied.poll_status(),
            VideoStatus::Failed("permission denied".to_string())
        );
    }
}
