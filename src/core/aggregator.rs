//! Turns the noisy per-frame expression stream into a stable label.
//!
//! Two strategies are supported and an aggregator applies exactly one:
//!
//! - `Windowed`: buffer the first face's vector of every sample and, once per
//!   cycle period, collapse the buffer into the label with the highest summed
//!   score.
//! - `Instantaneous`: take each sample's top label directly, but change the
//!   displayed label at most once per cycle period.
//!
//! Time is passed in by the caller so the aggregator is deterministic.

use crate::config::Config;
use crate::core::emoji::LAUGH_THRESHOLD;
use crate::core::label::StableEmotion;
use crate::core::windowing::{AggregationWindow, WindowSummary, DEFAULT_MAX_SAMPLES};
use crate::provider::types::DetectionSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default cycle period between label decisions.
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_millis(1000);

/// How samples are turned into a label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Sum scores over a window, decide once per cycle
    #[default]
    Windowed,
    /// Use each sample's top score, throttled to once per cycle
    Instantaneous,
}

/// What a sample without a face does to the label.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AbsencePolicy {
    /// Report "no face" at once and discard the current window
    #[default]
    Immediate,
    /// Ignore the absence and keep accumulating
    Tolerate,
}

/// Tuning for an aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSettings {
    pub strategy: Strategy,
    pub absence: AbsencePolicy,
    pub cycle_period: Duration,
    pub max_samples: Option<usize>,
    pub laugh_threshold: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Windowed,
            absence: AbsencePolicy::Immediate,
            cycle_period: DEFAULT_CYCLE_PERIOD,
            max_samples: Some(DEFAULT_MAX_SAMPLES),
            laugh_threshold: LAUGH_THRESHOLD,
        }
    }
}

impl From<&Config> for AggregatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            strategy: config.strategy,
            absence: config.absence,
            cycle_period: config.cycle_period,
            max_samples: config.max_samples,
            laugh_threshold: config.laugh_threshold,
        }
    }
}

/// Buffers expression vectors and decides the stable label.
pub struct EmotionAggregator {
    settings: AggregatorSettings,
    window: AggregationWindow,
    /// Start of the current cycle (windowed) or time of the last label (instantaneous)
    last_flush: Option<DateTime<Utc>>,
    stable: StableEmotion,
}

impl EmotionAggregator {
    pub fn new(settings: AggregatorSettings) -> Self {
        Self {
            window: AggregationWindow::with_cap(settings.max_samples),
            settings,
            last_flush: None,
            stable: StableEmotion::pending(),
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// The label currently on display.
    pub fn stable(&self) -> &StableEmotion {
        &self.stable
    }

    /// Number of vectors waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.window.len()
    }

    /// Fold a sample into the buffer without checking the cycle.
    ///
    /// Returns the new label when the sample itself changes it: an immediate
    /// "no face" report, or an instantaneous-strategy decision.
    pub fn ingest(&mut self, sample: &DetectionSample, now: DateTime<Utc>) -> Option<StableEmotion> {
        let Some(face) = sample.first_face() else {
            return self.on_absence(now);
        };

        match self.settings.strategy {
            Strategy::Windowed => {
                self.start_cycle_if_idle(now);
                if let Some(evicted) = self.window.push(face.expressions.clone(), now) {
                    tracing::trace!(evicted = evicted.len(), "window cap reached, dropped oldest");
                }
                None
            }
            Strategy::Instantaneous => {
                if !self.cycle_elapsed(now) {
                    return None;
                }
                let (label, score) = face.expressions.top()?;
                let decided = StableEmotion::detected(
                    label.clone(),
                    score,
                    1,
                    self.settings.laugh_threshold,
                    now,
                );
                self.last_flush = Some(now);
                Some(self.set_stable(decided))
            }
        }
    }

    /// Whether a windowed flush is due at `now`.
    pub fn is_flush_due(&self, now: DateTime<Utc>) -> bool {
        self.settings.strategy == Strategy::Windowed
            && self.last_flush.is_some()
            && self.cycle_elapsed(now)
    }

    /// Collapse the window into a label and start a new cycle.
    ///
    /// An empty window leaves the label unchanged and returns `None`.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<StableEmotion> {
        self.last_flush = Some(now);
        let summary = self.window.take_summary()?;
        Some(self.set_stable(self.decide(summary, now)))
    }

    /// Ingest a sample, then flush if the cycle has elapsed.
    pub fn observe(&mut self, sample: &DetectionSample, now: DateTime<Utc>) -> Option<StableEmotion> {
        let immediate = self.ingest(sample, now);
        self.tick(now).or(immediate)
    }

    /// Flush if due; used on ticks that carry no sample.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<StableEmotion> {
        if self.is_flush_due(now) {
            self.flush(now)
        } else {
            None
        }
    }

    fn on_absence(&mut self, now: DateTime<Utc>) -> Option<StableEmotion> {
        match self.settings.absence {
            AbsencePolicy::Tolerate => None,
            AbsencePolicy::Immediate => {
                self.window.clear();
                if self.settings.strategy == Strategy::Windowed {
                    // The next face starts a fresh cycle.
                    self.last_flush = None;
                }
                if self.stable.is_no_face() {
                    None
                } else {
                    Some(self.set_stable(StableEmotion::no_face(now)))
                }
            }
        }
    }

    fn decide(&self, summary: WindowSummary, now: DateTime<Utc>) -> StableEmotion {
        tracing::debug!(
            winner = %summary.winner,
            total = summary.total,
            peak = summary.peak,
            samples = summary.samples,
            "window flushed"
        );
        StableEmotion::detected(
            summary.winner,
            summary.peak,
            summary.samples,
            self.settings.laugh_threshold,
            now,
        )
        .with_spread(summary.mean, summary.std_dev)
    }

    fn set_stable(&mut self, stable: StableEmotion) -> StableEmotion {
        self.stable = stable.clone();
        stable
    }

    fn start_cycle_if_idle(&mut self, now: DateTime<Utc>) {
        if self.last_flush.is_none() {
            self.last_flush = Some(now);
        }
    }

    fn cycle_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_flush {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.settings.cycle_period)
                .unwrap_or(false),
        }
    }
}
