// src/lib.rs
//! Prayer posture tracking from pose landmarks.
//!
//! Frames flow through `FeatureSmoother` → `PostureClassifier` →
//! `SequenceTracker` inside a `PrayerSession`, which publishes a
//! `PublishedState` snapshot after every frame.

pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod landmarks;
pub mod published;
pub mod sequence;
pub mod session;

pub use classifier::{Posture, PostureClassifier, PostureRule, POSTURE_RULES};
pub use config::{DwellConfig, LandmarkConfig, SmoothingConfig, TrackerConfig};
pub use data::{SessionRecorder, SessionSummary};
pub use error::{ConfigError, TrackingError};
pub use features::{FeatureSmoother, FeatureVector};
pub use landmarks::{Frame, Landmark, Rejection};
pub use published::{PublishedState, StatePublisher};
pub use sequence::{SequencePolicy, SequenceStage, SequenceState, SequenceTracker};
pub use session::{FrameOutcome, PrayerSession};
