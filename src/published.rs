// src/published.rs - Read-only progress snapshot shared with the lock-screen side
use crate::classifier::Posture;
use crate::sequence::SequenceState;

use serde::Serialize;
use tokio::sync::watch;

/// The only state visible outside a session. Rebuilt on every frame and
/// swapped in whole, so readers never see a partially updated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedState {
    pub current_rakaat: u32,
    pub total_rakaats: u32,
    pub current_posture: Posture,
    pub expected_posture: Posture,
    pub final_unlock_pending: bool,
    pub is_complete: bool,
    pub should_auto_unlock: bool,
    pub error_message: Option<String>,
}

impl PublishedState {
    pub fn from_sequence(
        state: &SequenceState,
        posture: Posture,
        error_message: Option<String>,
    ) -> Self {
        let is_complete = state.is_complete();
        Self {
            current_rakaat: state.rakaat_index,
            total_rakaats: state.total_rakaats,
            current_posture: posture,
            expected_posture: state.expected_posture,
            final_unlock_pending: state.is_final_unlock_pending(),
            is_complete,
            should_auto_unlock: is_complete,
            error_message,
        }
    }

    /// Fraction of the prayer performed, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.total_rakaats == 0 {
            return 1.0;
        }
        (self.current_rakaat as f64 / self.total_rakaats as f64).min(1.0)
    }
}

/// Single writer, many readers. Publishing never blocks and never waits for
/// readers; a slow reader only ever misses intermediate snapshots.
#[derive(Debug)]
pub struct StatePublisher {
    tx: watch::Sender<PublishedState>,
}

impl StatePublisher {
    pub fn new(initial: PublishedState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn publish(&self, state: PublishedState) {
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PublishedState {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::SequencePolicy;

    fn initial() -> PublishedState {
        let state = SequenceState::new(SequencePolicy::SimplifiedThreePhase, 2);
        PublishedState::from_sequence(&state, Posture::Unknown, None)
    }

    #[test]
    fn test_snapshot_from_fresh_sequence() {
        let snapshot = initial();
        assert_eq!(snapshot.current_rakaat, 0);
        assert_eq!(snapshot.expected_posture, Posture::Standing);
        assert!(!snapshot.is_complete);
        assert!(!snapshot.should_auto_unlock);
        assert_eq!(snapshot.progress(), 0.0);
    }

    #[tokio::test]
    async fn test_subscriber_sees_whole_snapshots() {
        let publisher = StatePublisher::new(initial());
        let mut rx = publisher.subscribe();

        let mut next = initial();
        next.current_rakaat = 1;
        next.current_posture = Posture::Bowing;
        publisher.publish(next.clone());

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), next);
        assert_eq!(publisher.current(), next);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = StatePublisher::new(initial());
        let mut next = initial();
        next.error_message = Some("boom".to_string());
        publisher.publish(next.clone());
        assert_eq!(publisher.current(), next);
    }
}
