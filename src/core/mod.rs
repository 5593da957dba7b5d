//! Core smoothing logic.
//!
//! This module contains:
//! - Aggregation windows and the emotion aggregator
//! - The emoji mapping and the display-facing label
//! - The loop state machine
//! - The session label history

pub mod aggregator;
pub mod emoji;
pub mod history;
pub mod label;
pub mod state;
pub mod windowing;

// Re-export commonly used types
pub use aggregator::{AbsencePolicy, AggregatorSettings, EmotionAggregator, Strategy};
pub use emoji::{emotion_emoji, label_emoji, FALLBACK_EMOJI, LAUGH_THRESHOLD, NO_FACE_EMOJI};
pub use history::{LabelHistory, LabelRecord};
pub use label::{Mood, StableEmotion};
pub use state::{assess, LoopEvent, LoopState, Readiness};
pub use windowing::{AggregationWindow, WindowSummary};
