//! The display-facing emotion label.

use crate::core::emoji::{label_emoji, FALLBACK_EMOJI, NO_FACE_EMOJI};
use crate::provider::types::EmotionLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Mood {
    /// Nothing decided yet.
    Pending,
    /// The last sample had no face.
    NoFace,
    Detected { emotion: EmotionLabel },
}

/// The current stable label plus the evidence it was decided on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableEmotion {
    pub mood: Mood,
    pub emoji: String,
    /// Highest single-sample score of the winning label
    pub top_score: f64,
    /// Mean per-sample score of the winning label, if aggregated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
    /// Sample standard deviation of the winning label's scores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_std_dev: Option<f64>,
    /// Number of samples the decision was based on
    pub samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl StableEmotion {
    pub fn pending() -> Self {
        Self {
            mood: Mood::Pending,
            emoji: FALLBACK_EMOJI.to_string(),
            top_score: 0.0,
            mean_score: None,
            score_std_dev: None,
            samples: 0,
            decided_at: None,
        }
    }

    pub fn no_face(at: DateTime<Utc>) -> Self {
        Self {
            mood: Mood::NoFace,
            emoji: NO_FACE_EMOJI.to_string(),
            top_score: 0.0,
            mean_score: None,
            score_std_dev: None,
            samples: 0,
            decided_at: Some(at),
        }
    }

    pub fn detected(
        emotion: EmotionLabel,
        top_score: f64,
        samples: usize,
        laugh_threshold: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            emoji: label_emoji(&emotion, top_score, laugh_threshold).to_string(),
            mood: Mood::Detected { emotion },
            top_score,
            mean_score: None,
            score_std_dev: None,
            samples,
            decided_at: Some(at),
        }
    }

    pub fn with_spread(mut self, mean: Option<f64>, std_dev: Option<f64>) -> Self {
        self.mean_score = mean;
        self.score_std_dev = std_dev;
        self
    }

    pub fn emotion(&self) -> Option<&EmotionLabel> {
        match &self.mood {
            Mood::Detected { emotion } => Some(emotion),
            _ => None,
        }
    }

    pub fn is_no_face(&self) -> bool {
        self.mood == Mood::NoFace
    }

    /// Human-readable name of the label.
    pub fn name(&self) -> &str {
        match &self.mood {
            Mood::Pending => "—",
            Mood::NoFace => "No face",
            Mood::Detected { emotion } => emotion.name(),
        }
    }

    /// Whether two labels would render differently.
    pub fn same_label(&self, other: &StableEmotion) -> bool {
        self.mood == other.mood && self.emoji == other.emoji
    }
}

impl Default for StableEmotion {
    fn default() -> Self {
        Self::pending()
    }
}

impl fmt::Display for StableEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.emoji)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emoji::LAUGH_THRESHOLD;
    use crate::provider::types::Emotion;

    #[test]
    fn test_display() {
        let now = Utc::now();
        assert_eq!(StableEmotion::pending().to_string(), "— 🙂");
        assert_eq!(StableEmotion::no_face(now).to_string(), "No face ❓");

        let sad = StableEmotion::detected(Emotion::Sad.into(), 0.7, 12, LAUGH_THRESHOLD, now);
        assert_eq!(sad.to_string(), "sad 😢");
        assert_eq!(sad.emotion(), Some(&EmotionLabel::Known(Emotion::Sad)));
    }

    #[test]
    fn test_same_label_ignores_evidence() {
        let now = Utc::now();
        let a = StableEmotion::detected(Emotion::Sad.into(), 0.7, 12, LAUGH_THRESHOLD, now);
        let b = StableEmotion::detected(Emotion::Sad.into(), 0.6, 30, LAUGH_THRESHOLD, now);
        assert!(a.same_label(&b));

        let laughing = StableEmotion::detected(Emotion::Happy.into(), 0.9, 5, LAUGH_THRESHOLD, now);
        let smiling = StableEmotion::detected(Emotion::Happy.into(), 0.5, 5, LAUGH_THRESHOLD, now);
        assert!(!laughing.same_label(&smiling));
    }

    #[test]
    fn test_serializes_with_state_tag() {
        let json = serde_json::to_value(StableEmotion::no_face(Utc::now())).unwrap();
        assert_eq!(json["mood"]["state"], "no_face");
        assert_eq!(json["emoji"], "❓");
    }
}
