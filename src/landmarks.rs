// src/landmarks.rs - Pose keypoints as delivered by the external pose model
use anyhow::{Context, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// MediaPipe Pose indices (33 total, only the ones we read are named)
pub const NOSE: usize = 0;
pub const LEFT_EYE: usize = 2;
pub const RIGHT_EYE: usize = 5;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// Every landmark the feature extractor reads. A frame missing any of these
/// is rejected before any geometry is computed.
pub const REQUIRED_LANDMARKS: [usize; 13] = [
    NOSE,
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_ELBOW,
    RIGHT_ELBOW,
    LEFT_WRIST,
    RIGHT_WRIST,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_KNEE,
    RIGHT_KNEE,
    LEFT_ANKLE,
    RIGHT_ANKLE,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub index: usize,
    pub x: f64, // 0-1 normalized, grows to the right
    pub y: f64, // 0-1 normalized, grows downwards
    pub z: f64, // relative depth, unused for classification
    pub visibility: f64,
}

/// One camera tick worth of keypoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub landmarks: Vec<Landmark>,
}

/// Why a frame could not produce features. Expected and frequent
/// (occlusion, person leaving the frame), so it is never surfaced as an error.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("landmark {0} is missing")]
    MissingLandmark(usize),
    #[error("landmark {index} visibility {visibility:.2} is too low")]
    LowVisibility { index: usize, visibility: f64 },
    #[error("landmark {0} has non-finite coordinates")]
    NonFinite(usize),
    #[error("landmark {0} sits at the origin")]
    ZeroCoordinate(usize),
}

impl Landmark {
    pub fn new(index: usize, x: f64, y: f64, visibility: f64) -> Self {
        Self { index, x, y, z: 0.0, visibility }
    }

    /// Image-plane position. Depth is dropped: single-camera z is too noisy.
    pub fn point(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    fn check(&self, min_visibility: f64) -> Result<(), Rejection> {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.visibility.is_finite();
        if !finite {
            return Err(Rejection::NonFinite(self.index));
        }
        if self.x == 0.0 && self.y == 0.0 {
            return Err(Rejection::ZeroCoordinate(self.index));
        }
        if self.visibility <= min_visibility {
            return Err(Rejection::LowVisibility { index: self.index, visibility: self.visibility });
        }
        Ok(())
    }
}

impl Frame {
    pub fn new(timestamp_ms: u64, landmarks: Vec<Landmark>) -> Self {
        Self { timestamp_ms, landmarks }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        // Pose models emit landmarks in index order, so try the direct slot first.
        match self.landmarks.get(index) {
            Some(lm) if lm.index == index => Some(lm),
            _ => self.landmarks.iter().find(|lm| lm.index == index),
        }
    }

    pub fn point(&self, index: usize) -> Option<Vector2<f64>> {
        self.get(index).map(Landmark::point)
    }

    /// Checks that every required landmark is present and usable.
    pub fn validate(&self, min_visibility: f64) -> Result<(), Rejection> {
        for &index in REQUIRED_LANDMARKS.iter() {
            self.get(index)
                .ok_or(Rejection::MissingLandmark(index))?
                .check(min_visibility)?;
        }
        Ok(())
    }

    /// Returns a copy without the given landmark, simulating occlusion.
    pub fn without(&self, index: usize) -> Self {
        Self {
            timestamp_ms: self.timestamp_ms,
            landmarks: self.landmarks.iter().filter(|lm| lm.index != index).copied().collect(),
        }
    }
}

/// Reads a JSON-lines recording, one `Frame` per line. Blank lines are skipped.
pub fn load_frames(path: impl AsRef<Path>) -> Result<Vec<Frame>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read frames from {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Frame>(line)
                .with_context(|| format!("Invalid frame on line {}", i + 1))
        })
        .collect()
}
