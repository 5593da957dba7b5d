//! Running counters for the detection loop.
//!
//! Counters are atomics so a shared handle can be read from the CLI or a
//! signal handler while the loop updates them.

use crate::provider::types::DetectionSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Session statistics.
#[derive(Debug)]
pub struct SessionStats {
    /// Detector invocations that returned a sample
    frames_sampled: AtomicU64,
    /// Samples with at least one face
    face_samples: AtomicU64,
    /// Samples without a face
    no_face_samples: AtomicU64,
    /// Capture or detection calls that failed
    detection_failures: AtomicU64,
    /// Ticks skipped because models or video were not ready
    not_ready_ticks: AtomicU64,
    /// Windows flushed
    flushes: AtomicU64,
    /// Times the displayed label changed
    label_changes: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            frames_sampled: AtomicU64::new(0),
            face_samples: AtomicU64::new(0),
            no_face_samples: AtomicU64::new(0),
            detection_failures: AtomicU64::new(0),
            not_ready_ticks: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            label_changes: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Stats that accumulate on top of the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous session stats");
        }

        stats
    }

    pub fn record_sample(&self, sample: &DetectionSample) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
        if sample.has_face() {
            self.face_samples.fetch_add(1, Ordering::Relaxed);
        } else {
            self.no_face_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_detection_failure(&self) {
        self.detection_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_ready(&self) {
        self.not_ready_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_label_change(&self) {
        self.label_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            face_samples: self.face_samples.load(Ordering::Relaxed),
            no_face_samples: self.no_face_samples.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            not_ready_ticks: self.not_ready_ticks.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            label_changes: self.label_changes.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Frames sampled: {}\n\
             - Samples with a face: {}\n\
             - Samples without a face: {}\n\
             - Detection failures: {}\n\
             - Not-ready ticks: {}\n\
             - Windows flushed: {}\n\
             - Label changes: {}\n\
             - Session duration: {} seconds",
            stats.frames_sampled,
            stats.face_samples,
            stats.no_face_samples,
            stats.detection_failures,
            stats.not_ready_ticks,
            stats.flushes,
            stats.label_changes,
            stats.session_duration_secs
        )
    }

    /// Write the totals to the persistence path, if any.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                frames_sampled: stats.frames_sampled,
                face_samples: stats.face_samples,
                no_face_samples: stats.no_face_samples,
                detection_failures: stats.detection_failures,
                flushes: stats.flushes,
                label_changes: stats.label_changes,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_sampled
                    .store(persisted.frames_sampled, Ordering::Relaxed);
                self.face_samples
                    .store(persisted.face_samples, Ordering::Relaxed);
                self.no_face_samples
                    .store(persisted.no_face_samples, Ordering::Relaxed);
                self.detection_failures
                    .store(persisted.detection_failures, Ordering::Relaxed);
                self.flushes.store(persisted.flushes, Ordering::Relaxed);
                self.label_changes
                    .store(persisted.label_changes, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        for counter in [
            &self.frames_sampled,
            &self.face_samples,
            &self.no_face_samples,
            &self.detection_failures,
            &self.not_ready_ticks,
            &self.flushes,
            &self.label_changes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub frames_sampled: u64,
    pub face_samples: u64,
    pub no_face_samples: u64,
    pub detection_failures: u64,
    pub not_ready_ticks: u64,
    pub flushes: u64,
    pub label_changes: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// On-disk format. Not-ready ticks are per-session only.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_sampled: u64,
    face_samples: u64,
    no_face_samples: u64,
    detection_failures: u64,
    flushes: u64,
    label_changes: u64,
    last_updated: DateTime<Utc>,
}

pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::types::{Emotion, ExpressionVector};

    #[test]
    fn test_sample_counting() {
        let stats = SessionStats::new();
        stats.record_sample(&DetectionSample::NoFace);
        stats.record_sample(&DetectionSample::single(
            ExpressionVector::new().with(Emotion::Happy, 0.8),
        ));
        stats.record_sample(&DetectionSample::from_faces(Vec::new()));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sampled, 3);
        assert_eq!(snapshot.face_samples, 1);
        assert_eq!(snapshot.no_face_samples, 2);
    }

    #[test]
    fn test_reset() {
        let stats = SessionStats::new();
        stats.record_flush();
        stats.record_label_change();
        stats.record_not_ready();
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.flushes, 0);
        assert_eq!(snapshot.label_changes, 0);
        assert_eq!(snapshot.not_ready_ticks, 0);
    }

    #[test]
    fn test_persistence_accumulates() {
        let path = std::env::temp_dir()
            .join(format!("mood-mirror-stats-{}", uuid::Uuid::new_v4()))
            .join("stats.json");

        let first = SessionStats::with_persistence(path.clone());
        first.record_flush();
        first.record_detection_failure();
        first.save().unwrap();

        let second = SessionStats::with_persistence(path.clone());
        second.record_flush();
        let snapshot = second.snapshot();
        assert_eq!(snapshot.flushes, 2);
        assert_eq!(snapshot.detection_failures, 1);

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Frames sampled"));
        assert!(summary.contains("Label changes"));
    }
}
