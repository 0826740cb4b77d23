//! Hysteresis over raw per-frame decisions.
//!
//! ```text
//!            hold_frames consecutive speech decisions
//!   SILENT ─────────────────────────────────────────────► SPEECH
//!          ◄─────────────────────────────────────────────
//!            hold_frames consecutive silence decisions
//! ```
//!
//! Any decision that disagrees with the current run restarts the count, so a
//! single flipped frame can never cause a transition when `hold_frames > 1`.
//! With `hold_frames == 1` the smoothed state follows the raw decisions.

use tracing::debug;

use super::Decision;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpeechState {
    #[default]
    Silent,
    Speech,
}

impl SpeechState {
    pub fn is_speech(self) -> bool {
        self == SpeechState::Speech
    }
}

/// Output of [`StateSmoother::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothedState {
    pub is_speech: bool,
    /// Length of the current run of identical raw decisions.
    pub consecutive_count: u32,
}

#[derive(Debug, Clone)]
pub struct StateSmoother {
    hold_frames: u32,
    state: SpeechState,
    run_is_speech: bool,
    run_len: u32,
    transitions: u64,
}

impl StateSmoother {
    /// `hold_frames` below 1 is treated as 1.
    pub fn new(hold_frames: u32) -> Self {
        Self {
            hold_frames: hold_frames.max(1),
            state: SpeechState::Silent,
            run_is_speech: false,
            run_len: 0,
            transitions: 0,
        }
    }

    /// Feed one raw decision and return the smoothed state after it.
    pub fn update(&mut self, decision: Decision) -> SmoothedState {
        if decision.is_speech == self.run_is_speech {
            self.run_len = self.run_len.saturating_add(1);
        } else {
            self.run_is_speech = decision.is_speech;
            self.run_len = 1;
        }

        if self.run_is_speech != self.state.is_speech() && self.run_len >= self.hold_frames {
            self.state = if self.run_is_speech {
                SpeechState::Speech
            } else {
                SpeechState::Silent
            };
            self.transitions += 1;
            debug!(state = ?self.state, run_len = self.run_len, "smoothed state changed");
        }

        self.current()
    }

    pub fn current(&self) -> SmoothedState {
        SmoothedState {
            is_speech: self.state.is_speech(),
            consecutive_count: self.run_len,
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn hold_frames(&self) -> u32 {
        self.hold_frames
    }

    /// Transitions accepted since construction or the last reset.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    pub fn reset(&mut self) {
        self.state = SpeechState::Silent;
        self.run_is_speech = false;
        self.run_len = 0;
        self.transitions = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(smoother: &mut StateSmoother, raw: &[bool]) -> Vec<bool> {
        raw.iter()
            .map(|&s| {
                let decision = if s {
                    Decision::speech(0.1)
                } else {
                    Decision::silence(0.0)
                };
                smoother.update(decision).is_speech
            })
            .collect()
    }

    #[test]
    fn starts_silent() {
        let smoother = StateSmoother::new(3);
        assert_eq!(smoother.state(), SpeechState::Silent);
        assert_eq!(smoother.current(), SmoothedState::default());
    }

    #[test]
    fn flip_flop_restarts_the_count() {
        let mut smoother = StateSmoother::new(3);
        let states = run(&mut smoother, &[true, true, false, true, true, true]);
        // Speech only on the third consecutive `true` after the interruption.
        assert_eq!(states, vec![false, false, false, false, false, true]);
        assert_eq!(smoother.transitions(), 1);
    }

    #[test]
    fn hold_of_one_follows_raw_decisions() {
        let mut smoother = StateSmoother::new(1);
        let raw = [true, false, true, true, false];
        assert_eq!(run(&mut smoother, &raw), raw.to_vec());
    }

    #[test]
    fn single_frame_dropout_does_not_end_speech() {
        let mut smoother = StateSmoother::new(2);
        let states = run(&mut smoother, &[true, true, false, true, false, false]);
        assert_eq!(states, vec![false, true, true, true, true, false]);
    }

    #[test]
    fn consecutive_count_tracks_current_run() {
        let mut smoother = StateSmoother::new(4);
        smoother.update(Decision::speech(0.2));
        smoother.update(Decision::speech(0.2));
        let s = smoother.update(Decision::silence(0.0));
        assert_eq!(s.consecutive_count, 1);
        let s = smoother.update(Decision::silence(0.0));
        assert_eq!(s.consecutive_count, 2);
        assert!(!s.is_speech);
    }

    #[test]
    fn zero_hold_is_clamped_to_one() {
        let mut smoother = StateSmoother::new(0);
        assert_eq!(smoother.hold_frames(), 1);
        assert!(smoother.update(Decision::speech(0.3)).is_speech);
    }

    #[test]
    fn reset_returns_to_silent() {
        let mut smoother = StateSmoother::new(1);
        smoother.update(Decision::speech(0.3));
        smoother.reset();
        assert_eq!(smoother.state(), SpeechState::Silent);
        assert_eq!(smoother.transitions(), 0);
    }
}
