//! Collaborators of the smoothing loop: the expression model, the video
//! source, and the data they exchange.
//!
//! The model itself is external. This module only defines the narrow
//! interface the loop needs plus a replay implementation that drives the
//! loop from recorded detector output.

pub mod replay;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use replay::{ReplayError, ReplayProvider, ReplayStep, SyntheticVideo};
pub use source::{
    ArtifactStatus, ModelArtifact, ModelBundle, ModelProvider, ModelStatus, ProviderError,
    VideoSource, VideoStatus,
};
pub use types::{
    BoundingBox, DetectionSample, Emotion, EmotionLabel, ExpressionVector, Face, FaceGeometry,
    Frame, Point,
};
