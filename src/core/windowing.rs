//! Aggregation windows for expression vectors.
//!
//! Vectors are collected into back-to-back windows. A window is cleared as a
//! whole when it is summarized; it never slides. An optional sample cap drops
//! the oldest vectors while a window is filling.

use crate::provider::types::{EmotionLabel, ExpressionVector};
use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, VecDeque};

/// Recommended cap: about one second at 30 fps.
pub const DEFAULT_MAX_SAMPLES: usize = 30;

/// The decision extracted from a window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    /// Label with the highest summed score
    pub winner: EmotionLabel,
    /// Summed score of the winner
    pub total: f64,
    /// Highest single-sample score of the winner
    pub peak: f64,
    /// Mean of the winner's per-sample scores (absent scores count as zero)
    pub mean: Option<f64>,
    /// Sample standard deviation of the same scores
    pub std_dev: Option<f64>,
    /// Number of vectors in the window
    pub samples: usize,
    /// When the first vector arrived
    pub started_at: Option<DateTime<Utc>>,
}

/// An ordered buffer of expression vectors (arrival order).
#[derive(Debug, Clone, Default)]
pub struct AggregationWindow {
    samples: VecDeque<ExpressionVector>,
    max_samples: Option<usize>,
    started_at: Option<DateTime<Utc>>,
}

impl AggregationWindow {
    /// A window bounded only by the flush cycle.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A window that keeps at most `max_samples` vectors. A cap of zero is
    /// treated as one.
    pub fn bounded(max_samples: usize) -> Self {
        Self {
            max_samples: Some(max_samples.max(1)),
            ..Self::default()
        }
    }

    pub fn with_cap(max_samples: Option<usize>) -> Self {
        match max_samples {
            Some(cap) => Self::bounded(cap),
            None => Self::unbounded(),
        }
    }

    /// Append a vector. Returns the evicted vector if the cap was exceeded.
    pub fn push(&mut self, vector: ExpressionVector, at: DateTime<Utc>) -> Option<ExpressionVector> {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
        self.samples.push_back(vector);

        match self.max_samples {
            Some(cap) if self.samples.len() > cap => self.samples.pop_front(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn max_samples(&self) -> Option<usize> {
        self.max_samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionVector> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.started_at = None;
    }

    /// Summed score per label across the window, in canonical label order.
    pub fn totals(&self) -> BTreeMap<EmotionLabel, f64> {
        let mut totals = BTreeMap::new();
        for vector in &self.samples {
            for (label, score) in vector.iter() {
                *totals.entry(label.clone()).or_insert(0.0) += score;
            }
        }
        totals
    }

    /// Pick the label with the highest summed score.
    ///
    /// Sums rather than averages: every label is weighted by the same sample
    /// count within one window. Equal sums go to the first label in canonical
    /// order. Returns `None` for an empty window or one whose vectors carry
    /// no scores.
    pub fn summarize(&self) -> Option<WindowSummary> {
        let mut winner: Option<(EmotionLabel, f64)> = None;
        for (label, total) in self.totals() {
            match &winner {
                Some((_, best)) if total <= *best => {}
                _ => winner = Some((label, total)),
            }
        }
        let (winner, total) = winner?;

        let scores: Vec<f64> = self
            .samples
            .iter()
            .map(|vector| vector.get(&winner).unwrap_or(0.0))
            .collect();
        let peak = scores.iter().copied().fold(0.0, f64::max);
        let mean = finite(scores.iter().mean());
        let std_dev = if scores.len() > 1 {
            finite(scores.iter().std_dev())
        } else {
            None
        };

        Some(WindowSummary {
            winner,
            total,
            peak,
            mean,
            std_dev,
            samples: self.samples.len(),
            started_at: self.started_at,
        })
    }

    /// Summarize and clear in one step.
    pub fn take_summary(&mut self) -> Option<WindowSummary> {
        let summary = self.summarize();
        self.clear();
        summary
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
