// src/features.rs - Joint angles and distances extracted from a single frame
use crate::config::SmoothingConfig;
use crate::landmarks::*;

use nalgebra::Vector2;
use serde::Serialize;
use std::f64::consts::FRAC_PI_2;

/// Fallback for a knee or elbow whose segments collapse to a point.
pub const STRAIGHT_JOINT_DEG: f64 = 180.0;
/// Fallback when hips and shoulders coincide.
pub const VERTICAL_SPINE_DEG: f64 = 90.0;

const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Smoothed joint angles (degrees) plus raw hand distances (normalized units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub spine_angle: f64,
    pub left_knee_angle: f64,
    pub right_knee_angle: f64,
    pub left_elbow_angle: f64,
    pub right_elbow_angle: f64,
    pub left_shoulder_angle: f64,
    pub right_shoulder_angle: f64,
    pub left_wrist_to_chest: f64,
    pub right_wrist_to_chest: f64,
    pub wrist_to_wrist: f64,
}

impl FeatureVector {
    /// Name of the first field holding NaN or infinity, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        let fields = [
            ("spine_angle", self.spine_angle),
            ("left_knee_angle", self.left_knee_angle),
            ("right_knee_angle", self.right_knee_angle),
            ("left_elbow_angle", self.left_elbow_angle),
            ("right_elbow_angle", self.right_elbow_angle),
            ("left_shoulder_angle", self.left_shoulder_angle),
            ("right_shoulder_angle", self.right_shoulder_angle),
            ("left_wrist_to_chest", self.left_wrist_to_chest),
            ("right_wrist_to_chest", self.right_wrist_to_chest),
            ("wrist_to_wrist", self.wrist_to_wrist),
        ];
        fields.iter().find(|(_, v)| !v.is_finite()).map(|(name, _)| *name)
    }
}

/// Angle at vertex `b` formed by `a-b-c`, in degrees within [0, 180].
///
/// Uses cos(θ) = (BA · BC) / (|BA| × |BC|). Returns `fallback` when either
/// segment has no length.
pub fn joint_angle(a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>, fallback: f64) -> f64 {
    let ba = a - b;
    let bc = c - b;

    let mag1 = ba.norm();
    let mag2 = bc.norm();
    if mag1 < MIN_SEGMENT_LENGTH || mag2 < MIN_SEGMENT_LENGTH {
        return fallback;
    }

    let cos_angle = (ba.dot(&bc) / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Direction of the hip→shoulder vector measured from straight down, in [0, 360).
///
/// Image y grows downwards, so an upright torso reads 180°. A torso pitched
/// forward towards +x reads around 270°.
pub fn spine_angle(hip_mid: Vector2<f64>, shoulder_mid: Vector2<f64>) -> f64 {
    let torso = shoulder_mid - hip_mid;
    if torso.norm() < MIN_SEGMENT_LENGTH {
        return VERTICAL_SPINE_DEG;
    }

    // Straight down, (0, 1), sits at +90° in image coordinates.
    let degrees = (torso.y.atan2(torso.x) - FRAC_PI_2).to_degrees();
    normalize_degrees(degrees)
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed shortest turn from `from` to `to`, in [-180, 180).
pub fn angular_difference(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

pub fn midpoint(a: Vector2<f64>, b: Vector2<f64>) -> Vector2<f64> {
    (a + b) / 2.0
}

/// Raw geometry for one frame, before smoothing.
fn raw_features(frame: &Frame) -> Option<FeatureVector> {
    let p = |index: usize| frame.point(index);

    let l_shoulder = p(LEFT_SHOULDER)?;
    let r_shoulder = p(RIGHT_SHOULDER)?;
    let l_elbow = p(LEFT_ELBOW)?;
    let r_elbow = p(RIGHT_ELBOW)?;
    let l_wrist = p(LEFT_WRIST)?;
    let r_wrist = p(RIGHT_WRIST)?;
    let l_hip = p(LEFT_HIP)?;
    let r_hip = p(RIGHT_HIP)?;
    let l_knee = p(LEFT_KNEE)?;
    let r_knee = p(RIGHT_KNEE)?;
    let l_ankle = p(LEFT_ANKLE)?;
    let r_ankle = p(RIGHT_ANKLE)?;

    let chest = midpoint(l_shoulder, r_shoulder);
    let hip_mid = midpoint(l_hip, r_hip);

    Some(FeatureVector {
        spine_angle: spine_angle(hip_mid, chest),
        left_knee_angle: joint_angle(l_ankle, l_knee, l_hip, STRAIGHT_JOINT_DEG),
        right_knee_angle: joint_angle(r_ankle, r_knee, r_hip, STRAIGHT_JOINT_DEG),
        left_elbow_angle: joint_angle(l_shoulder, l_elbow, l_wrist, STRAIGHT_JOINT_DEG),
        right_elbow_angle: joint_angle(r_shoulder, r_elbow, r_wrist, STRAIGHT_JOINT_DEG),
        left_shoulder_angle: joint_angle(l_elbow, l_shoulder, r_shoulder, STRAIGHT_JOINT_DEG),
        right_shoulder_angle: joint_angle(r_elbow, r_shoulder, l_shoulder, STRAIGHT_JOINT_DEG),
        left_wrist_to_chest: (l_wrist - chest).norm(),
        right_wrist_to_chest: (r_wrist - chest).norm(),
        wrist_to_wrist: (l_wrist - r_wrist).norm(),
    })
}

/// Single-channel exponential moving average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialSmoother {
    alpha: f64,
    value: Option<f64>,
}

impl ExponentialSmoother {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, value: None }
    }

    /// The first sample passes through unchanged so there is no start-up lag.
    pub fn update(&mut self, raw: f64) -> f64 {
        let smoothed = match self.value {
            Some(prev) => self.alpha * raw + (1.0 - self.alpha) * prev,
            None => raw,
        };
        self.value = Some(smoothed);
        smoothed
    }

    /// Like `update` for a heading in [0, 360): blends along the shorter
    /// arc so readings straddling 0°/360° do not average towards 180°.
    pub fn update_angle(&mut self, raw: f64) -> f64 {
        let smoothed = match self.value {
            Some(prev) => normalize_degrees(prev + self.alpha * angular_difference(prev, raw)),
            None => raw,
        };
        self.value = Some(smoothed);
        smoothed
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

/// Per-session smoothing state for every angle in `FeatureVector`.
///
/// Distances are left raw: the hands-folded check needs the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSmoother {
    min_visibility: f64,
    spine: ExponentialSmoother,
    left_knee: ExponentialSmoother,
    right_knee: ExponentialSmoother,
    left_elbow: ExponentialSmoother,
    right_elbow: ExponentialSmoother,
    left_shoulder: ExponentialSmoother,
    right_shoulder: ExponentialSmoother,
}

impl FeatureSmoother {
    pub fn new(smoothing: SmoothingConfig, min_visibility: f64) -> Self {
        let channel = ExponentialSmoother::new(smoothing.alpha);
        Self {
            min_visibility,
            spine: channel,
            left_knee: channel,
            right_knee: channel,
            left_elbow: channel,
            right_elbow: channel,
            left_shoulder: channel,
            right_shoulder: channel,
        }
    }

    /// Validates the frame, extracts raw geometry and folds it into the
    /// running averages. Rejected frames leave the smoothing state untouched.
    pub fn compute_features(&mut self, frame: &Frame) -> Result<FeatureVector, Rejection> {
        frame.validate(self.min_visibility)?;
        let raw = raw_features(frame).ok_or(Rejection::MissingLandmark(NOSE))?;

        Ok(FeatureVector {
            spine_angle: self.spine.update_angle(raw.spine_angle),
            left_knee_angle: self.left_knee.update(raw.left_knee_angle),
            right_knee_angle: self.right_knee.update(raw.right_knee_angle),
            left_elbow_angle: self.left_elbow.update(raw.left_elbow_angle),
            right_elbow_angle: self.right_elbow.update(raw.right_elbow_angle),
            left_shoulder_angle: self.left_shoulder.update(raw.left_shoulder_angle),
            right_shoulder_angle: self.right_shoulder.update(raw.right_shoulder_angle),
            ..raw
        })
    }

    pub fn is_primed(&self) -> bool {
        self.spine.value().is_some()
    }

    pub fn reset(&mut self) {
        for channel in [
            &mut self.spine,
            &mut self.left_knee,
            &mut self.right_knee,
            &mut self.left_elbow,
            &mut self.right_elbow,
            &mut self.left_shoulder,
            &mut self.right_shoulder,
        ] {
            channel.reset();
        }
    }
}
