// src/data.rs
use crate::classifier::Posture;
use crate::session::FrameOutcome;

use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct FrameRecord {
    timestamp_ms: u64,
    frame: usize,
    posture: Posture,
    expected_posture: Posture,
    rakaat: u32,
    final_unlock_pending: bool,
    is_complete: bool,

    // Smoothed angles, empty when the frame was rejected
    spine_angle: Option<f64>,
    left_knee_angle: Option<f64>,
    right_knee_angle: Option<f64>,
    left_elbow_angle: Option<f64>,
    right_elbow_angle: Option<f64>,
    left_shoulder_angle: Option<f64>,
    right_shoulder_angle: Option<f64>,

    // Raw hand distances
    left_wrist_to_chest: Option<f64>,
    right_wrist_to_chest: Option<f64>,
    wrist_to_wrist: Option<f64>,

    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub session_name: String,
    pub total_frames: usize,
    pub rejected_frames: usize,
    pub faulted_frames: usize,
    pub posture_counts: BTreeMap<String, usize>,
    pub rakaats_completed: u32,
    pub total_rakaats: u32,
    pub completed_at_ms: Option<u64>,
}

/// Collects per-frame outcomes for one session and writes them out as
/// `frames.csv` and `summary.json` under `<output_dir>/<session_name>/`.
pub struct SessionRecorder {
    output_dir: PathBuf,
    session_name: String,
    session_id: Uuid,
    outcomes: Vec<FrameOutcome>,
}

impl SessionRecorder {
    pub fn new(
        output_dir: impl AsRef<Path>,
        session_id: Uuid,
        session_name: Option<String>,
    ) -> Self {
        let session_name = session_name.unwrap_or_else(|| {
            format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
        });

        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            session_name,
            session_id,
            outcomes: Vec::new(),
        }
    }

    pub fn add_frame(&mut self, outcome: FrameOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(&self.session_name)
    }

    pub fn export_csv(&self) -> Result<PathBuf> {
        let csv_path = self.session_dir().join("frames.csv");
        std::fs::create_dir_all(self.session_dir())
            .with_context(|| format!("Failed to create {}", self.session_dir().display()))?;

        let file = File::create(&csv_path)
            .with_context(|| format!("Failed to create {}", csv_path.display()))?;
        let mut writer = Writer::from_writer(file);

        for (i, outcome) in self.outcomes.iter().enumerate() {
            writer.serialize(Self::create_record(i, outcome))?;
        }

        writer.flush()?;
        Ok(csv_path)
    }

    pub fn export_summary(&self) -> Result<PathBuf> {
        let summary_path = self.session_dir().join("summary.json");
        std::fs::create_dir_all(self.session_dir())
            .with_context(|| format!("Failed to create {}", self.session_dir().display()))?;

        let json = serde_json::to_string_pretty(&self.summary())?;
        std::fs::write(&summary_path, json)
            .with_context(|| format!("Failed to write {}", summary_path.display()))?;
        Ok(summary_path)
    }

    pub fn summary(&self) -> SessionSummary {
        let mut posture_counts: BTreeMap<String, usize> =
            Posture::ALL.iter().map(|p| (p.to_string(), 0)).collect();
        for outcome in &self.outcomes {
            *posture_counts.entry(outcome.posture.to_string()).or_default() += 1;
        }

        let faulted_frames = self.outcomes.iter()
            .filter(|o| o.snapshot.error_message.is_some())
            .count();
        let rejected_frames = self.outcomes.iter()
            .filter(|o| o.features.is_none() && o.snapshot.error_message.is_none())
            .count();

        let last = self.outcomes.last().map(|o| &o.snapshot);

        SessionSummary {
            session_id: self.session_id,
            session_name: self.session_name.clone(),
            total_frames: self.outcomes.len(),
            rejected_frames,
            faulted_frames,
            posture_counts,
            rakaats_completed: last.map(|s| s.current_rakaat).unwrap_or(0),
            total_rakaats: last.map(|s| s.total_rakaats).unwrap_or(0),
            completed_at_ms: self.outcomes.iter()
                .find(|o| o.snapshot.is_complete)
                .map(|o| o.timestamp_ms),
        }
    }

    fn create_record(frame: usize, outcome: &FrameOutcome) -> FrameRecord {
        let snapshot = &outcome.snapshot;
        let f = outcome.features.as_ref();

        FrameRecord {
            timestamp_ms: outcome.timestamp_ms,
            frame,
            posture: outcome.posture,
            expected_posture: snapshot.expected_posture,
            rakaat: snapshot.current_rakaat,
            final_unlock_pending: snapshot.final_unlock_pending,
            is_complete: snapshot.is_complete,
            spine_angle: f.map(|f| f.spine_angle),
            left_knee_angle: f.map(|f| f.left_knee_angle),
            right_knee_angle: f.map(|f| f.right_knee_angle),
            left_elbow_angle: f.map(|f| f.left_elbow_angle),
            right_elbow_angle: f.map(|f| f.right_elbow_angle),
            left_shoulder_angle: f.map(|f| f.left_shoulder_angle),
            right_shoulder_angle: f.map(|f| f.right_shoulder_angle),
            left_wrist_to_chest: f.map(|f| f.left_wrist_to_chest),
            right_wrist_to_chest: f.map(|f| f.right_wrist_to_chest),
            wrist_to_wrist: f.map(|f| f.wrist_to_wrist),
            error: snapshot.error_message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::published::PublishedState;
    use crate::sequence::{SequencePolicy, SequenceState};

    fn outcome(timestamp_ms: u64, posture: Posture, error: Option<&str>) -> FrameOutcome {
        let state = SequenceState::new(SequencePolicy::SimplifiedThreePhase, 2);
        FrameOutcome {
            timestamp_ms,
            posture,
            features: None,
            snapshot: PublishedState::from_sequence(&state, posture, error.map(String::from)),
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("rakaat_tracker_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_summary_counts() {
        let mut recorder = SessionRecorder::new(temp_dir(), Uuid::nil(), Some("s".into()));
        recorder.add_frame(outcome(0, Posture::Unknown, None));
        recorder.add_frame(outcome(33, Posture::Unknown, Some("timestamp went backwards")));
        recorder.add_frame(outcome(66, Posture::Unknown, None));

        let summary = recorder.summary();
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.faulted_frames, 1);
        assert_eq!(summary.rejected_frames, 2);
        assert_eq!(summary.posture_counts["unknown"], 3);
        assert_eq!(summary.posture_counts["standing"], 0);
        assert_eq!(summary.completed_at_ms, None);
    }

    #[test]
    fn test_exports_files() {
        let dir = temp_dir();
        let mut recorder = SessionRecorder::new(&dir, Uuid::nil(), Some("export".into()));
        recorder.add_frame(outcome(0, Posture::Standing, None));

        let csv_path = recorder.export_csv().unwrap();
        let summary_path = recorder.export_summary().unwrap();

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("timestamp_ms,frame,posture"));
        assert!(csv.contains("standing"));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(summary["total_frames"], 1);

        std::fs::remove_dir_all(dir).ok();
    }
}
