// src/classifier.rs - Ordered rule table mapping features to a posture label
use crate::features::{midpoint, FeatureVector};
use crate::landmarks::{Frame, LEFT_HIP, NOSE, RIGHT_HIP};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    #[default]
    Unknown,
    Standing,
    Bowing,
    Prostration,
    Sitting,
}

impl Posture {
    pub const ALL: [Posture; 5] = [
        Posture::Unknown,
        Posture::Standing,
        Posture::Bowing,
        Posture::Prostration,
        Posture::Sitting,
    ];
}

impl fmt::Display for Posture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Posture::Unknown => "unknown",
            Posture::Standing => "standing",
            Posture::Bowing => "bowing",
            Posture::Prostration => "prostration",
            Posture::Sitting => "sitting",
        };
        f.write_str(name)
    }
}

// Hands-folded thresholds, normalized image units
const FOLDED_WRIST_TO_CHEST: f64 = 0.15;
const FOLDED_WRIST_TO_WRIST: f64 = 0.15;
const RELAXED_WRIST_TO_CHEST: f64 = 0.20;
const RELAXED_WRIST_TO_WRIST: f64 = 0.15;

fn within(value: f64, lo: f64, hi: f64) -> bool {
    (lo..=hi).contains(&value)
}

fn both_knees_within(f: &FeatureVector, lo: f64, hi: f64) -> bool {
    within(f.left_knee_angle, lo, hi) && within(f.right_knee_angle, lo, hi)
}

pub fn hands_folded(f: &FeatureVector) -> bool {
    let strict = f.left_wrist_to_chest < FOLDED_WRIST_TO_CHEST
        && f.right_wrist_to_chest < FOLDED_WRIST_TO_CHEST
        && f.wrist_to_wrist < FOLDED_WRIST_TO_WRIST;
    let relaxed = f.left_wrist_to_chest < RELAXED_WRIST_TO_CHEST
        && f.right_wrist_to_chest < RELAXED_WRIST_TO_CHEST
        && f.wrist_to_wrist < RELAXED_WRIST_TO_WRIST;
    strict || relaxed
}

pub fn is_standing(f: &FeatureVector, _frame: &Frame) -> bool {
    let upright = within(f.spine_angle, 180.0, 270.0) || within(f.spine_angle, 330.0, 360.0);
    upright && both_knees_within(f, 160.0, 200.0) && hands_folded(f)
}

pub fn is_bowing(f: &FeatureVector, _frame: &Frame) -> bool {
    within(f.spine_angle, 210.0, 320.0) && both_knees_within(f, 140.0, 220.0)
}

pub fn is_prostrating(f: &FeatureVector, frame: &Frame) -> bool {
    let head_below_hips = match (frame.point(NOSE), frame.point(LEFT_HIP), frame.point(RIGHT_HIP)) {
        (Some(nose), Some(l_hip), Some(r_hip)) => nose.y > midpoint(l_hip, r_hip).y,
        _ => false,
    };
    head_below_hips && both_knees_within(f, 70.0, 160.0)
}

pub fn is_sitting(f: &FeatureVector, _frame: &Frame) -> bool {
    // Only one leg is reliably visible from a single camera, hence the OR.
    let knee_folded =
        within(f.left_knee_angle, 60.0, 120.0) || within(f.right_knee_angle, 240.0, 300.0);
    knee_folded && within(f.spine_angle, 180.0, 270.0)
}

/// One entry of the classification table.
#[derive(Clone, Copy)]
pub struct PostureRule {
    pub label: Posture,
    pub matches: fn(&FeatureVector, &Frame) -> bool,
}

impl fmt::Debug for PostureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostureRule").field("label", &self.label).finish()
    }
}

/// Evaluated top to bottom, first match wins.
pub const POSTURE_RULES: [PostureRule; 4] = [
    PostureRule { label: Posture::Standing, matches: is_standing },
    PostureRule { label: Posture::Bowing, matches: is_bowing },
    PostureRule { label: Posture::Prostration, matches: is_prostrating },
    PostureRule { label: Posture::Sitting, matches: is_sitting },
];

/// Stateless; all smoothing happens upstream in `FeatureSmoother`.
#[derive(Debug, Clone, Copy)]
pub struct PostureClassifier {
    rules: &'static [PostureRule],
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self { rules: &POSTURE_RULES }
    }
}

impl PostureClassifier {
    pub fn with_rules(rules: &'static [PostureRule]) -> Self {
        Self { rules }
    }

    pub fn classify(&self, features: &FeatureVector, frame: &Frame) -> Posture {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(features, frame))
            .map(|rule| rule.label)
            .unwrap_or(Posture::Unknown)
    }

    /// Every label whose predicate holds, in table order. Useful for
    /// inspecting ambiguous frames.
    pub fn candidates(&self, features: &FeatureVector, frame: &Frame) -> Vec<Posture> {
        self.rules
            .iter()
            .filter(|rule| (rule.matches)(features, frame))
            .map(|rule| rule.label)
            .collect()
    }
}
