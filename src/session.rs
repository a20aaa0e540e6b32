// src/session.rs - One tracking session: frames in, published progress out
use crate::classifier::{Posture, PostureClassifier};
use crate::config::TrackerConfig;
use crate::error::{ConfigError, TrackingError};
use crate::features::{FeatureSmoother, FeatureVector};
use crate::landmarks::Frame;
use crate::published::{PublishedState, StatePublisher};
use crate::sequence::{SequenceState, SequenceTracker};

use tokio::sync::watch;
use tracing::{info, trace, warn};
use uuid::Uuid;

/// Result of processing one frame, for callers that record sessions.
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub timestamp_ms: u64,
    pub posture: Posture,
    pub features: Option<FeatureVector>,
    pub snapshot: PublishedState,
}

/// Owns the smoothing state, the sequence tracker and the publisher for a
/// single worshipper. Frames must be fed from one worker; readers subscribe
/// to the published snapshot from anywhere.
#[derive(Debug)]
pub struct PrayerSession {
    config: TrackerConfig,
    session_id: Uuid,
    smoother: FeatureSmoother,
    classifier: PostureClassifier,
    tracker: SequenceTracker,
    publisher: StatePublisher,
}

impl PrayerSession {
    pub fn new(config: TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let smoother = FeatureSmoother::new(config.smoothing, config.landmarks.min_visibility);
        let tracker = SequenceTracker::new(&config);
        let publisher = StatePublisher::new(PublishedState::from_sequence(
            tracker.state(),
            Posture::Unknown,
            None,
        ));
        let session_id = Uuid::new_v4();
        info!(
            %session_id,
            total_rakaats = config.total_rakaats,
            policy = ?config.policy,
            "Session started"
        );

        Ok(Self {
            config,
            session_id,
            smoother,
            classifier: PostureClassifier::default(),
            tracker,
            publisher,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn sequence(&self) -> &SequenceState {
        self.tracker.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> PublishedState {
        self.publisher.current()
    }

    /// Runs one frame through extraction, classification and sequencing,
    /// then publishes the resulting snapshot.
    ///
    /// Faults never escape: the snapshot carries the error message, the
    /// previous state is kept, and the next clean frame clears the message.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let timestamp_ms = frame.timestamp_ms;
        match self.step(frame) {
            Ok((posture, features)) => FrameOutcome {
                timestamp_ms,
                posture,
                features,
                snapshot: self.publish(posture, None),
            },
            Err(e) => {
                warn!(session_id = %self.session_id, timestamp_ms, "Frame dropped: {}", e);
                FrameOutcome {
                    timestamp_ms,
                    posture: Posture::Unknown,
                    features: None,
                    snapshot: self.publish(Posture::Unknown, Some(e.to_string())),
                }
            }
        }
    }

    /// Re-evaluates timers without a frame, so the grace period can elapse
    /// while the camera is paused.
    pub fn poll(&mut self, now_ms: u64) -> PublishedState {
        let posture = self.snapshot().current_posture;
        match self.tracker.poll(now_ms).map(|_| ()) {
            Ok(()) => self.publish(posture, None),
            Err(e) => {
                warn!(session_id = %self.session_id, now_ms, "Poll failed: {}", e);
                self.publish(posture, Some(e.to_string()))
            }
        }
    }

    /// Starts a new session: counters, timers, done flags and smoothing
    /// state are all cleared.
    pub fn reset(&mut self) -> PublishedState {
        self.smoother.reset();
        self.tracker.reset();
        self.session_id = Uuid::new_v4();
        info!(session_id = %self.session_id, "Session reset");
        self.publish(Posture::Unknown, None)
    }

    fn step(&mut self, frame: &Frame) -> Result<(Posture, Option<FeatureVector>), TrackingError> {
        // Work on copies; nothing is committed unless the whole step succeeds.
        let mut smoother = self.smoother.clone();

        let (posture, features) = match smoother.compute_features(frame) {
            Ok(features) => {
                if let Some(field) = features.first_non_finite() {
                    return Err(TrackingError::NonFiniteFeature(field));
                }
                (self.classifier.classify(&features, frame), Some(features))
            }
            Err(rejection) => {
                trace!(timestamp_ms = frame.timestamp_ms, "Frame rejected: {}", rejection);
                (Posture::Unknown, None)
            }
        };

        let next = self.tracker.advance(posture, frame.timestamp_ms)?;
        self.smoother = smoother;
        self.tracker.commit(next, frame.timestamp_ms);
        Ok((posture, features))
    }

    fn publish(&self, posture: Posture, error_message: Option<String>) -> PublishedState {
        let snapshot = PublishedState::from_sequence(self.tracker.state(), posture, error_message);
        self.publisher.publish(snapshot.clone());
        snapshot
    }
}
