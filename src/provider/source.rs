//! Interfaces to the collaborators the loop consumes: the expression model
//! and the video source.

use crate::provider::types::{DetectionSample, Frame};
use std::future::Future;
use thiserror::Error;

/// Errors surfaced by a model provider or video source for a single tick.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("detection failed: {0}")]
    Detection(String),

    /// The source has no more samples; the loop stops cleanly.
    #[error("end of sample stream")]
    EndOfStream,
}

/// The three model artifacts the detector needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelArtifact {
    FaceDetector,
    FaceLandmarks,
    FaceExpressions,
}

impl ModelArtifact {
    pub const ALL: [ModelArtifact; 3] = [
        ModelArtifact::FaceDetector,
        ModelArtifact::FaceLandmarks,
        ModelArtifact::FaceExpressions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelArtifact::FaceDetector => "ssd_mobilenetv1",
            ModelArtifact::FaceLandmarks => "face_landmark_68",
            ModelArtifact::FaceExpressions => "face_expression",
        }
    }
}

/// Load state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArtifactStatus {
    #[default]
    Pending,
    Loaded,
    Failed(String),
}

/// Load state of the full model bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Tracks the load state of every artifact in the bundle.
#[derive(Debug, Clone, Default)]
pub struct ModelBundle {
    detector: ArtifactStatus,
    landmarks: ArtifactStatus,
    expressions: ArtifactStatus,
}

impl ModelBundle {
    /// A bundle whose artifacts are still loading.
    pub fn pending() -> Self {
        Self::default()
    }

    /// A bundle with every artifact loaded.
    pub fn loaded() -> Self {
        Self {
            detector: ArtifactStatus::Loaded,
            landmarks: ArtifactStatus::Loaded,
            expressions: ArtifactStatus::Loaded,
        }
    }

    pub fn set(&mut self, artifact: ModelArtifact, status: ArtifactStatus) {
        *self.slot(artifact) = status;
    }

    pub fn get(&self, artifact: ModelArtifact) -> &ArtifactStatus {
        match artifact {
            ModelArtifact::FaceDetector => &self.detector,
            ModelArtifact::FaceLandmarks => &self.landmarks,
            ModelArtifact::FaceExpressions => &self.expressions,
        }
    }

    /// Ready only once all three artifacts are loaded; any failure is terminal.
    pub fn status(&self) -> ModelStatus {
        for artifact in ModelArtifact::ALL {
            if let ArtifactStatus::Failed(reason) = self.get(artifact) {
                return ModelStatus::Failed(format!("{}: {reason}", artifact.name()));
            }
        }

        let all_loaded = ModelArtifact::ALL
            .iter()
            .all(|artifact| *self.get(*artifact) == ArtifactStatus::Loaded);
        if all_loaded {
            ModelStatus::Ready
        } else {
            ModelStatus::Loading
        }
    }

    fn slot(&mut self, artifact: ModelArtifact) -> &mut ArtifactStatus {
        match artifact {
            ModelArtifact::FaceDetector => &mut self.detector,
            ModelArtifact::FaceLandmarks => &mut self.landmarks,
            ModelArtifact::FaceExpressions => &mut self.expressions,
        }
    }
}

/// Metadata state of the video source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Pending,
    Ready { width: u32, height: u32 },
    /// The source can never become ready (e.g. camera permission denied).
    Failed(String),
}

impl VideoStatus {
    /// Ready only with non-zero dimensions and a playable stream.
    pub fn from_metadata(width: u32, height: u32, playable: bool) -> Self {
        if playable && width > 0 && height > 0 {
            VideoStatus::Ready { width, height }
        } else {
            VideoStatus::Pending
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            VideoStatus::Ready { width, height } => Some((*width, *height)),
            _ => None,
        }
    }
}

/// The external face/expression model.
///
/// `detect` may be slow and is called repeatedly, one call at a time.
/// Failures come back as errors, never panics.
pub trait ModelProvider {
    fn poll_status(&mut self) -> ModelStatus;

    fn ready(&mut self) -> bool {
        self.poll_status() == ModelStatus::Ready
    }

    fn detect(
        &mut self,
        frame: &Frame,
    ) -> impl Future<Output = Result<DetectionSample, ProviderError>> + Send;
}

/// A live video feed. The loop only reads from it.
pub trait VideoSource {
    fn poll_status(&mut self) -> VideoStatus;

    fn capture(&mut self) -> Result<Frame, ProviderError>;
}
