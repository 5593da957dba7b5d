//! Session timeline of emitted labels and its JSON export.

use crate::core::label::StableEmotion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One emitted label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub decided_at: DateTime<Utc>,
    pub label: String,
    pub emoji: String,
    pub samples: usize,
    pub top_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
}

impl LabelRecord {
    pub fn from_stable(stable: &StableEmotion, fallback_time: DateTime<Utc>) -> Self {
        Self {
            decided_at: stable.decided_at.unwrap_or(fallback_time),
            label: stable.name().to_string(),
            emoji: stable.emoji.clone(),
            samples: stable.samples,
            top_score: stable.top_score,
            mean_score: stable.mean_score,
        }
    }
}

/// Every label emitted during one run of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelHistory {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub records: Vec<LabelRecord>,
}

impl LabelHistory {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, stable: &StableEmotion) {
        self.records
            .push(LabelRecord::from_stable(stable, Utc::now()));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `session_<timestamp>.json` inside `dir`.
    pub fn export_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
        dir.join(format!("session_{}.json", at.format("%Y%m%d_%H%M%S")))
    }

    /// Write the history as pretty JSON, creating the parent directory.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Read every session file in `dir`; unreadable files are skipped.
    pub fn read_dir(dir: &Path) -> Vec<LabelHistory> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut sessions: Vec<LabelHistory> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension().map(|e| e == "json").unwrap_or(false)
                    && p
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("session_"))
                        .unwrap_or(false)
            })
            .filter_map(|p| std::fs::read_to_string(p).ok())
            .filter_map(|content| serde_json::from_str(&content).ok())
            .collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }
}

impl Default for LabelHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emoji::LAUGH_THRESHOLD;
    use crate::provider::types::Emotion;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mood-mirror-{name}-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_records_labels() {
        let mut history = LabelHistory::new();
        let now = Utc::now();
        history.record(&StableEmotion::no_face(now));
        history.record(&StableEmotion::detected(
            Emotion::Happy.into(),
            0.9,
            28,
            LAUGH_THRESHOLD,
            now,
        ));

        assert_eq!(history.len(), 2);
        assert_eq!(history.records[0].label, "No face");
        assert_eq!(history.records[1].emoji, "😂");
        assert_eq!(history.records[1].samples, 28);
    }

    #[test]
    fn test_export_and_read_back() {
        let dir = temp_dir("history");
        let mut history = LabelHistory::new();
        history.record(&StableEmotion::no_face(Utc::now()));

        let path = LabelHistory::export_path(&dir, Utc::now());
        history.write_json(&path).unwrap();
        std::fs::write(dir.join("notes.json"), "not a session").unwrap();

        let sessions = LabelHistory::read_dir(&dir);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, history.session_id);
        assert_eq!(sessions[0].records, history.records);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_dir_reads_empty() {
        assert!(LabelHistory::read_dir(&temp_dir("missing")).is_empty());
    }
}
