//! Emotion to emoji mapping.
//!
//! The mapping is total: every label, including unknown model outputs, maps
//! to exactly one glyph.

use crate::provider::types::{Emotion, EmotionLabel};

/// Above this top score a happy face is shown laughing.
pub const LAUGH_THRESHOLD: f64 = 0.8;

pub const LAUGHING_EMOJI: &str = "😂";
pub const NO_FACE_EMOJI: &str = "❓";
pub const FALLBACK_EMOJI: &str = "🙂";

/// Emoji for a known emotion given its top score.
pub fn emotion_emoji(emotion: Emotion, top_score: f64, laugh_threshold: f64) -> &'static str {
    match emotion {
        Emotion::Happy if top_score > laugh_threshold => LAUGHING_EMOJI,
        Emotion::Happy => "😄",
        Emotion::Sad => "😢",
        Emotion::Angry => "😠",
        Emotion::Surprised => "😲",
        Emotion::Fearful => "😨",
        Emotion::Disgusted => "🤢",
        Emotion::Neutral => "😐",
    }
}

/// Emoji for any label; unknown names get the fallback glyph.
pub fn label_emoji(label: &EmotionLabel, top_score: f64, laugh_threshold: f64) -> &'static str {
    match label {
        EmotionLabel::Known(emotion) => emotion_emoji(*emotion, top_score, laugh_threshold),
        EmotionLabel::Other(_) => FALLBACK_EMOJI,
    }
}

/// The full table in canonical order, for display.
pub fn table(laugh_threshold: f64) -> Vec<(String, &'static str)> {
    let mut rows = Vec::with_capacity(Emotion::ALL.len() + 3);
    rows.push((
        format!("happy (score > {laugh_threshold})"),
        LAUGHING_EMOJI,
    ));
    for emotion in Emotion::ALL {
        rows.push((emotion.name().to_string(), emotion_emoji(emotion, 0.0, laugh_threshold)));
    }
    rows.push(("no face".to_string(), NO_FACE_EMOJI));
    rows.push(("other".to_string(), FALLBACK_EMOJI));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_depends_on_score() {
        assert_eq!(emotion_emoji(Emotion::Happy, 0.95, LAUGH_THRESHOLD), "😂");
        assert_eq!(emotion_emoji(Emotion::Happy, 0.8, LAUGH_THRESHOLD), "😄");
        assert_eq!(emotion_emoji(Emotion::Happy, 0.3, LAUGH_THRESHOLD), "😄");
    }

    #[test]
    fn test_every_label_has_an_emoji() {
        for emotion in Emotion::ALL {
            assert!(!emotion_emoji(emotion, 0.5, LAUGH_THRESHOLD).is_empty());
        }
        assert_eq!(emotion_emoji(Emotion::Disgusted, 1.0, LAUGH_THRESHOLD), "🤢");
        assert_eq!(
            label_emoji(&EmotionLabel::parse("contempt"), 1.0, LAUGH_THRESHOLD),
            FALLBACK_EMOJI
        );
        assert_eq!(label_emoji(&EmotionLabel::parse(""), 0.0, LAUGH_THRESHOLD), FALLBACK_EMOJI);
    }

    #[test]
    fn test_table_covers_sentinels() {
        let rows = table(LAUGH_THRESHOLD);
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().any(|(_, emoji)| *emoji == NO_FACE_EMOJI));
    }
}
