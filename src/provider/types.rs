//! Detection data types exchanged with the external expression model.
//!
//! These types carry only what the smoothing loop needs: per-face expression
//! scores and, optionally, the geometry used to draw an overlay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The closed set of expressions the model reports.
///
/// Declaration order is the canonical ordering: whenever two emotions tie,
/// the one declared first wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Fearful,
    Disgusted,
    Neutral,
}

impl Emotion {
    /// All emotions in canonical order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Neutral,
    ];

    /// The model's name for this emotion.
    pub fn name(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Neutral => "neutral",
        }
    }

    /// Look up an emotion by name, ignoring case and surrounding whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|emotion| emotion.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An expression name as reported by the model.
///
/// Names outside the closed set are kept (lowercased) rather than dropped, so
/// a newer model with extra classes still aggregates and falls back to the
/// default emoji. Known emotions order before unknown names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EmotionLabel {
    Known(Emotion),
    Other(String),
}

impl EmotionLabel {
    pub fn parse(name: &str) -> Self {
        match Emotion::from_name(name) {
            Some(emotion) => EmotionLabel::Known(emotion),
            None => EmotionLabel::Other(name.trim().to_lowercase()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EmotionLabel::Known(emotion) => emotion.name(),
            EmotionLabel::Other(name) => name,
        }
    }

    pub fn emotion(&self) -> Option<Emotion> {
        match self {
            EmotionLabel::Known(emotion) => Some(*emotion),
            EmotionLabel::Other(_) => None,
        }
    }
}

impl From<Emotion> for EmotionLabel {
    fn from(emotion: Emotion) -> Self {
        EmotionLabel::Known(emotion)
    }
}

impl From<String> for EmotionLabel {
    fn from(name: String) -> Self {
        EmotionLabel::parse(&name)
    }
}

impl From<&str> for EmotionLabel {
    fn from(name: &str) -> Self {
        EmotionLabel::parse(name)
    }
}

impl From<EmotionLabel> for String {
    fn from(label: EmotionLabel) -> Self {
        match label {
            EmotionLabel::Known(emotion) => emotion.name().to_string(),
            EmotionLabel::Other(name) => name,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-face expression scores, each an independent confidence in `[0, 1]`.
///
/// Iteration follows the canonical label order. Non-finite scores are
/// discarded and the rest are clamped into range on insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<EmotionLabel, f64>",
    into = "BTreeMap<EmotionLabel, f64>"
)]
pub struct ExpressionVector {
    scores: BTreeMap<EmotionLabel, f64>,
}

impl ExpressionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, label: impl Into<EmotionLabel>, score: f64) -> Self {
        self.insert(label, score);
        self
    }

    /// Set the score for a label. Returns false if the score was rejected.
    pub fn insert(&mut self, label: impl Into<EmotionLabel>, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        self.scores.insert(label.into(), score.clamp(0.0, 1.0));
        true
    }

    pub fn get(&self, label: &EmotionLabel) -> Option<f64> {
        self.scores.get(label).copied()
    }

    /// Score for a known emotion, zero when absent.
    pub fn score(&self, emotion: Emotion) -> f64 {
        self.get(&EmotionLabel::Known(emotion)).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EmotionLabel, f64)> {
        self.scores.iter().map(|(label, score)| (label, *score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// The highest-scoring label; ties go to the first label in canonical order.
    pub fn top(&self) -> Option<(&EmotionLabel, f64)> {
        let mut best: Option<(&EmotionLabel, f64)> = None;
        for (label, score) in self.iter() {
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((label, score)),
            }
        }
        best
    }
}

impl From<BTreeMap<EmotionLabel, f64>> for ExpressionVector {
    fn from(raw: BTreeMap<EmotionLabel, f64>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<ExpressionVector> for BTreeMap<EmotionLabel, f64> {
    fn from(vector: ExpressionVector) -> Self {
        vector.scores
    }
}

impl<L: Into<EmotionLabel>> FromIterator<(L, f64)> for ExpressionVector {
    fn from_iter<I: IntoIterator<Item = (L, f64)>>(iter: I) -> Self {
        let mut vector = ExpressionVector::new();
        for (label, score) in iter {
            vector.insert(label, score);
        }
        vector
    }
}

/// A point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Face bounding box in image coordinates, with the detector's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Detection geometry used only for drawing the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceGeometry {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub landmarks: Vec<Point>,
}

impl FaceGeometry {
    /// Rescale from the resolution the detector saw to a target resolution.
    ///
    /// A zero-sized source leaves the geometry untouched.
    pub fn resized(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        if from.0 == 0 || from.1 == 0 {
            return self.clone();
        }
        let sx = f64::from(to.0) / f64::from(from.0);
        let sy = f64::from(to.1) / f64::from(from.1);

        Self {
            bbox: BoundingBox {
                x: self.bbox.x * sx,
                y: self.bbox.y * sy,
                width: self.bbox.width * sx,
                height: self.bbox.height * sy,
                confidence: self.bbox.confidence,
            },
            landmarks: self
                .landmarks
                .iter()
                .map(|p| Point {
                    x: p.x * sx,
                    y: p.y * sy,
                })
                .collect(),
        }
    }
}

/// One detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub expressions: ExpressionVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<FaceGeometry>,
}

impl Face {
    pub fn new(expressions: ExpressionVector) -> Self {
        Self {
            expressions,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: FaceGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}

/// The result of running the detector on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionSample {
    NoFace,
    Faces { faces: Vec<Face> },
}

impl DetectionSample {
    /// Wrap a detector result; an empty face list is a `NoFace` sample.
    pub fn from_faces(faces: Vec<Face>) -> Self {
        if faces.is_empty() {
            DetectionSample::NoFace
        } else {
            DetectionSample::Faces { faces }
        }
    }

    /// Convenience for a single face.
    pub fn single(expressions: ExpressionVector) -> Self {
        DetectionSample::Faces {
            faces: vec![Face::new(expressions)],
        }
    }

    /// The face the aggregator uses. Only one subject is tracked.
    pub fn first_face(&self) -> Option<&Face> {
        match self {
            DetectionSample::NoFace => None,
            DetectionSample::Faces { faces } => faces.first(),
        }
    }

    pub fn faces(&self) -> &[Face] {
        match self {
            DetectionSample::NoFace => &[],
            DetectionSample::Faces { faces } => faces,
        }
    }

    pub fn has_face(&self) -> bool {
        self.first_face().is_some()
    }
}

/// A single captured video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw RGB pixel data (width * height * 3 bytes); may be empty for synthetic sources
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Capture time
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }
}
