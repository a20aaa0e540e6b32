// src/sequence.rs - Rakaat progress state machine driven by classified postures
use crate::classifier::Posture;
use crate::config::{DwellConfig, TrackerConfig};
use crate::error::TrackingError;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which posture cycle makes up one rakaat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// Standing, bowing, sitting.
    #[default]
    SimplifiedThreePhase,
    /// Standing, bowing, standing, prostration, sitting, prostration, sitting.
    FullSevenPhase,
}

const THREE_PHASES: [Posture; 3] = [Posture::Standing, Posture::Bowing, Posture::Sitting];

const SEVEN_PHASES: [Posture; 7] = [
    Posture::Standing,
    Posture::Bowing,
    Posture::Standing,
    Posture::Prostration,
    Posture::Sitting,
    Posture::Prostration,
    Posture::Sitting,
];

impl SequencePolicy {
    pub fn phases(&self) -> &'static [Posture] {
        match self {
            SequencePolicy::SimplifiedThreePhase => &THREE_PHASES,
            SequencePolicy::FullSevenPhase => &SEVEN_PHASES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SequenceStage {
    Expecting(Posture),
    FinalUnlockPending,
    Complete,
}

/// Everything the tracker knows about one session's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceState {
    pub expected_posture: Posture,
    phase_index: usize,
    /// One bit per phase of the policy, cleared together when a rakaat closes.
    phases_done: u16,
    pub dwell_start_ms: Option<u64>,
    last_validated: Option<Posture>,
    pub rakaat_index: u32,
    pub total_rakaats: u32,
    pub final_unlock_start_ms: Option<u64>,
}

impl SequenceState {
    pub fn new(policy: SequencePolicy, total_rakaats: u32) -> Self {
        Self {
            expected_posture: policy.phases()[0],
            phase_index: 0,
            phases_done: 0,
            dwell_start_ms: None,
            last_validated: None,
            rakaat_index: 0,
            total_rakaats,
            final_unlock_start_ms: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.rakaat_index >= self.total_rakaats
    }

    pub fn is_final_unlock_pending(&self) -> bool {
        self.final_unlock_start_ms.is_some() && !self.is_complete()
    }

    pub fn stage(&self) -> SequenceStage {
        if self.is_complete() {
            SequenceStage::Complete
        } else if self.final_unlock_start_ms.is_some() {
            SequenceStage::FinalUnlockPending
        } else {
            SequenceStage::Expecting(self.expected_posture)
        }
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn is_phase_done(&self, phase: usize) -> bool {
        self.phases_done & (1 << phase) != 0
    }

    pub fn phases_done_count(&self) -> u32 {
        self.phases_done.count_ones()
    }

    fn mark_phase_done(&mut self, phase: usize) {
        self.phases_done |= 1 << phase;
    }

    fn all_phases_done(&self, phase_count: usize) -> bool {
        let all = (1u16 << phase_count) - 1;
        self.phases_done & all == all
    }

    fn expect_phase(&mut self, phase: usize, posture: Posture) {
        self.phase_index = phase;
        self.expected_posture = posture;
        self.dwell_start_ms = None;
    }
}

/// Consumes one classified posture per frame and advances through the
/// policy's cycle once each posture has been held for its dwell time.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    policy: SequencePolicy,
    dwell: DwellConfig,
    final_unlock_delay_ms: u64,
    state: SequenceState,
    /// Latest committed timestamp, used to detect clocks running backwards.
    last_seen_ms: Option<u64>,
}

impl SequenceTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            policy: config.policy,
            dwell: config.dwell,
            final_unlock_delay_ms: config.final_unlock_delay_ms,
            state: SequenceState::new(config.policy, config.total_rakaats),
            last_seen_ms: None,
        }
    }

    pub fn state(&self) -> &SequenceState {
        &self.state
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    pub fn required_dwell(&self, posture: Posture) -> u64 {
        self.dwell.required_for(posture)
    }

    /// Computes the state after seeing `posture` at `now_ms`, without committing it.
    pub fn advance(&self, posture: Posture, now_ms: u64) -> Result<SequenceState, TrackingError> {
        if let Some(last_ms) = self.last_seen_ms {
            if now_ms < last_ms {
                return Err(TrackingError::ClockRegression { now_ms, last_ms });
            }
        }
        let mut next = self.state.clone();

        if next.is_complete() {
            return Ok(next);
        }

        if let Some(since) = next.final_unlock_start_ms {
            if now_ms - since >= self.final_unlock_delay_ms {
                next.rakaat_index = next.total_rakaats;
                info!(rakaats = next.total_rakaats, "Final rakaat settled, sequence complete");
            }
            return Ok(next);
        }

        // Non-matching postures are dropped and the dwell keeps running.
        if posture == Posture::Unknown || posture != next.expected_posture {
            return Ok(next);
        }

        let dwell_start = match next.dwell_start_ms {
            Some(start) if next.last_validated == Some(posture) => start,
            _ => {
                debug!(%posture, at_ms = now_ms, "Dwell started");
                next.dwell_start_ms = Some(now_ms);
                next.last_validated = Some(posture);
                now_ms
            }
        };

        let phase = next.phase_index;
        if now_ms - dwell_start < self.required_dwell(posture) || next.is_phase_done(phase) {
            return Ok(next);
        }

        next.mark_phase_done(phase);
        debug!(%posture, phase, rakaat = next.rakaat_index, "Phase complete");

        let phases = self.policy.phases();
        if phase + 1 < phases.len() {
            next.expect_phase(phase + 1, phases[phase + 1]);
            return Ok(next);
        }

        if !next.all_phases_done(phases.len()) {
            // Never close a rakaat with a phase missing.
            next.expect_phase(0, phases[0]);
            return Ok(next);
        }

        if next.rakaat_index + 1 == next.total_rakaats {
            next.final_unlock_start_ms = Some(now_ms);
            next.dwell_start_ms = None;
            info!(
                delay_ms = self.final_unlock_delay_ms,
                "Final rakaat performed, waiting before unlock"
            );
        } else {
            next.rakaat_index += 1;
            next.phases_done = 0;
            next.expect_phase(0, phases[0]);
            info!(rakaat = next.rakaat_index, total = next.total_rakaats, "Rakaat complete");
        }
        Ok(next)
    }

    /// Replaces the current state with one `advance` produced for `now_ms`.
    pub fn commit(&mut self, state: SequenceState, now_ms: u64) {
        self.state = state;
        self.last_seen_ms = Some(now_ms);
    }

    pub fn observe(
        &mut self,
        posture: Posture,
        now_ms: u64,
    ) -> Result<&SequenceState, TrackingError> {
        let next = self.advance(posture, now_ms)?;
        self.commit(next, now_ms);
        Ok(&self.state)
    }

    /// Re-evaluates timers only. Equivalent to observing an `Unknown` frame.
    pub fn poll(&mut self, now_ms: u64) -> Result<&SequenceState, TrackingError> {
        self.observe(Posture::Unknown, now_ms)
    }

    pub fn reset(&mut self) {
        self.state = SequenceState::new(self.policy, self.state.total_rakaats);
        self.last_seen_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FRAME_MS: u64 = 33;

    fn tracker(total: u32) -> SequenceTracker {
        SequenceTracker::new(&TrackerConfig::default().with_total_rakaats(total))
    }

    /// Feeds `posture` every 33ms starting at `start`, until at least `hold_ms`
    /// has passed since the first frame. Returns the time of the next frame.
    fn hold(tracker: &mut SequenceTracker, posture: Posture, start: u64, hold_ms: u64) -> u64 {
        let mut t = start;
        loop {
            tracker.observe(posture, t).unwrap();
            if t - start >= hold_ms {
                return t + FRAME_MS;
            }
            t += FRAME_MS;
        }
    }

    fn one_rakaat(tracker: &mut SequenceTracker, start: u64) -> u64 {
        let t = hold(tracker, Posture::Standing, start, 3001);
        let t = hold(tracker, Posture::Bowing, t, 1001);
        hold(tracker, Posture::Sitting, t, 2001)
    }

    #[test]
    fn test_initial_state() {
        let t = tracker(2);
        assert_eq!(t.state().stage(), SequenceStage::Expecting(Posture::Standing));
        assert_eq!(t.state().rakaat_index, 0);
        assert!(!t.state().is_complete());
    }

    #[test]
    fn test_dwell_boundary_is_inclusive() {
        let mut t = tracker(2);
        t.observe(Posture::Standing, 1000).unwrap();
        t.observe(Posture::Standing, 1000 + 2999).unwrap();
        assert_eq!(t.state().expected_posture, Posture::Standing);
        t.observe(Posture::Standing, 1000 + 3000).unwrap();
        assert_eq!(t.state().expected_posture, Posture::Bowing);
        assert!(t.state().is_phase_done(0));
    }

    #[test]
    fn test_mismatched_posture_is_ignored_without_dwell_reset() {
        let mut t = tracker(2);
        t.observe(Posture::Standing, 0).unwrap();
        t.observe(Posture::Sitting, 1500).unwrap();
        t.observe(Posture::Unknown, 2000).unwrap();
        assert_eq!(t.state().dwell_start_ms, Some(0));
        t.observe(Posture::Standing, 3000).unwrap();
        assert_eq!(t.state().expected_posture, Posture::Bowing);
    }

    #[test]
    fn test_dwell_resets_when_expected_changes() {
        let mut t = tracker(2);
        t.observe(Posture::Standing, 0).unwrap();
        t.observe(Posture::Standing, 3000).unwrap();
        assert_eq!(t.state().dwell_start_ms, None);
        t.observe(Posture::Bowing, 3100).unwrap();
        assert_eq!(t.state().dwell_start_ms, Some(3100));
    }

    #[test]
    fn test_rakaat_closes_and_flags_clear() {
        let mut t = tracker(3);
        one_rakaat(&mut t, 0);
        assert_eq!(t.state().rakaat_index, 1);
        assert_eq!(t.state().phases_done_count(), 0);
        assert_eq!(t.state().expected_posture, Posture::Standing);
        assert!(!t.state().is_final_unlock_pending());
    }

    #[test]
    fn test_single_rakaat_scenario() {
        let mut t = tracker(1);
        let after_sitting = one_rakaat(&mut t, 0);
        let sitting_done_at = t.state().final_unlock_start_ms.unwrap();

        assert_eq!(t.state().rakaat_index, 0);
        assert!(t.state().is_final_unlock_pending());
        assert!(!t.state().is_complete());

        t.observe(Posture::Sitting, after_sitting).unwrap();
        t.poll(sitting_done_at + 24_999).unwrap();
        assert!(!t.state().is_complete());

        t.poll(sitting_done_at + 25_000).unwrap();
        assert!(t.state().is_complete());
        assert_eq!(t.state().rakaat_index, 1);
        assert_eq!(t.state().stage(), SequenceStage::Complete);
    }

    #[test]
    fn test_final_rakaat_of_two_is_deferred() {
        let mut t = tracker(2);
        let next = one_rakaat(&mut t, 0);
        assert_eq!(t.state().rakaat_index, 1);

        let next = one_rakaat(&mut t, next);
        let since = t.state().final_unlock_start_ms.unwrap();
        assert_eq!(t.state().rakaat_index, 1);
        assert!(!t.state().is_complete());

        // Posture input during the grace period changes nothing.
        hold(&mut t, Posture::Standing, next, 5000);
        assert_eq!(t.state().rakaat_index, 1);

        t.observe(Posture::Unknown, since + 25_000).unwrap();
        assert!(t.state().is_complete());
        assert_eq!(t.state().rakaat_index, 2);
    }

    #[test]
    fn test_complete_state_is_terminal() {
        let mut t = tracker(1);
        let next = one_rakaat(&mut t, 0);
        t.poll(next + 30_000).unwrap();
        let done = t.state().clone();
        one_rakaat(&mut t, next + 31_000);
        assert_eq!(t.state().rakaat_index, done.rakaat_index);
    }

    #[test]
    fn test_clock_regression_leaves_state() {
        let mut t = tracker(2);
        t.observe(Posture::Standing, 500).unwrap();
        let before = t.state().clone();
        let err = t.observe(Posture::Standing, 400).unwrap_err();
        assert_eq!(err, TrackingError::ClockRegression { now_ms: 400, last_ms: 500 });
        assert_eq!(t.state(), &before);
    }

    #[test]
    fn test_reset_returns_to_start() {
        let mut t = tracker(3);
        let next = one_rakaat(&mut t, 0);
        t.observe(Posture::Standing, next).unwrap();
        t.reset();
        assert_eq!(t.state(), &SequenceState::new(SequencePolicy::SimplifiedThreePhase, 3));
    }

    #[test]
    fn test_seven_phase_cycle() {
        let config = TrackerConfig::default()
            .with_total_rakaats(2)
            .with_policy(SequencePolicy::FullSevenPhase);
        let mut t = SequenceTracker::new(&config);

        let mut now = 0;
        for &posture in SequencePolicy::FullSevenPhase.phases() {
            assert_eq!(t.state().expected_posture, posture);
            now = hold(&mut t, posture, now, config.dwell.required_for(posture));
        }
        assert_eq!(t.state().rakaat_index, 1);
        assert_eq!(t.state().expected_posture, Posture::Standing);
    }

    #[test]
    fn test_three_phase_ignores_prostration() {
        let mut t = tracker(2);
        let next = hold(&mut t, Posture::Standing, 0, 3000);
        let next = hold(&mut t, Posture::Bowing, next, 1000);
        hold(&mut t, Posture::Prostration, next, 5000);
        assert_eq!(t.state().expected_posture, Posture::Sitting);
    }

    proptest! {
        #[test]
        fn prop_dwell_boundary(start in 0u64..1_000_000, idx in 0usize..3) {
            let posture = [Posture::Standing, Posture::Bowing, Posture::Sitting][idx];
            let mut t = tracker(2);
            let mut now = start;
            // Walk to the phase under test with exact dwell holds.
            for &p in SequencePolicy::SimplifiedThreePhase.phases().iter().take(idx) {
                t.observe(p, now).unwrap();
                now += t.required_dwell(p);
                t.observe(p, now).unwrap();
                now += 1;
            }
            let required = t.required_dwell(posture);
            t.observe(posture, now).unwrap();
            t.observe(posture, now + required - 1).unwrap();
            prop_assert!(!t.state().is_phase_done(idx));
            t.observe(posture, now + required).unwrap();
            prop_assert!(t.state().is_phase_done(idx) || t.state().rakaat_index == 1);
        }

        #[test]
        fn prop_rakaat_counts_one_per_cycle(total in 2u32..6) {
            let mut t = tracker(total);
            let mut now = 0;
            for expected in 1..total {
                now = one_rakaat(&mut t, now);
                prop_assert_eq!(t.state().rakaat_index, expected);
            }
            now = one_rakaat(&mut t, now);
            prop_assert_eq!(t.state().rakaat_index, total - 1);
            prop_assert!(t.state().is_final_unlock_pending());
            t.poll(now + 25_000).unwrap();
            prop_assert_eq!(t.state().rakaat_index, total);
        }
    }
}
