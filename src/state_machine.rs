//! PTT session state machine
//!
//! One instance per source channel. Debounces the VAD output before keying the
//! paired radio, then holds the key through short gaps in speech.
//!
//! ```text
//!            active                    active, held >= activation_delay
//!   Idle ───────────▶ Pending ───────────────────────────────▶ Keyed
//!    ▲                  │ inactive                               │
//!    └──────────────────┘                                        │
//!    ▲   inactive, silence > silence_timeout, held > min_hold    │
//!    └───────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use crate::channel::PhaseTag;
use crate::config::VoxTiming;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Threshold crossed, debounce running
    Pending { trigger_time: Duration },
    /// PTT asserted on the paired radio
    Keyed {
        gpio_on_time: Duration,
        last_signal_time: Duration,
    },
}

/// What the last frame did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Idle -> Pending
    Armed,
    /// Pending -> Idle, the burst was too short
    Disarmed,
    /// -> Keyed. Assert PTT and start recording.
    Keyed,
    /// Keyed -> Idle. Release PTT and close the recording.
    Released,
}

pub struct PttSession {
    phase: SessionPhase,
    timing: VoxTiming,
}

impl PttSession {
    pub fn new(timing: VoxTiming) -> Self {
        Self {
            phase: SessionPhase::Idle,
            timing,
        }
    }

    #[inline]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[inline]
    pub fn is_keyed(&self) -> bool {
        matches!(self.phase, SessionPhase::Keyed { .. })
    }

    pub fn tag(&self) -> PhaseTag {
        match self.phase {
            SessionPhase::Idle => PhaseTag::Idle,
            SessionPhase::Pending { .. } => PhaseTag::Pending,
            SessionPhase::Keyed { .. } => PhaseTag::Keyed,
        }
    }

    /// Feed one frame's VAD result, timestamped with the frame's arrival.
    pub fn advance(&mut self, active: bool, now: Duration) -> Transition {
        match self.phase {
            SessionPhase::Idle => {
                if !active {
                    return Transition::None;
                }
                if self.timing.activation_delay.is_zero() {
                    self.key(now);
                    return Transition::Keyed;
                }
                self.phase = SessionPhase::Pending { trigger_time: now };
                Transition::Armed
            }
            SessionPhase::Pending { trigger_time } => {
                if !active {
                    self.phase = SessionPhase::Idle;
                    return Transition::Disarmed;
                }
                if now.saturating_sub(trigger_time) >= self.timing.activation_delay {
                    self.key(now);
                    Transition::Keyed
                } else {
                    Transition::None
                }
            }
            SessionPhase::Keyed {
                gpio_on_time,
                last_signal_time,
            } => {
                if active {
                    self.phase = SessionPhase::Keyed {
                        gpio_on_time,
                        last_signal_time: now,
                    };
                    return Transition::None;
                }
                let silent_for = now.saturating_sub(last_signal_time);
                let held_for = now.saturating_sub(gpio_on_time);
                if silent_for > self.timing.silence_timeout && held_for > self.timing.min_hold_time
                {
                    self.phase = SessionPhase::Idle;
                    Transition::Released
                } else {
                    Transition::None
                }
            }
        }
    }

    /// Drop to Idle regardless of timers. Returns whether PTT was held.
    pub fn force_idle(&mut self) -> bool {
        let was_keyed = self.is_keyed();
        self.phase = SessionPhase::Idle;
        was_keyed
    }

    fn key(&mut self, now: Duration) {
        self.phase = SessionPhase::Keyed {
            gpio_on_time: now,
            last_signal_time: now,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn timing(delay: u64, silence: u64, hold: u64) -> VoxTiming {
        VoxTiming {
            activation_delay: ms(delay),
            silence_timeout: ms(silence),
            min_hold_time: ms(hold),
        }
    }

    #[test]
    fn initial_state_is_idle() {
        let session = PttSession::new(timing(500, 1000, 1000));
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert!(!session.is_keyed());
    }

    #[test]
    fn keys_after_activation_delay() {
        let mut s = PttSession::new(timing(500, 1000, 1000));
        assert_eq!(s.advance(true, ms(0)), Transition::Armed);
        assert_eq!(s.advance(true, ms(250)), Transition::None);
        assert_eq!(s.phase(), SessionPhase::Pending { trigger_time: ms(0) });
        assert_eq!(s.advance(true, ms(500)), Transition::Keyed);
        assert_eq!(
            s.phase(),
            SessionPhase::Keyed {
                gpio_on_time: ms(500),
                last_signal_time: ms(500)
            }
        );
    }

    #[test]
    fn short_burst_is_rejected() {
        let mut s = PttSession::new(timing(500, 1000, 1000));
        s.advance(true, ms(0));
        s.advance(true, ms(400));
        assert_eq!(s.advance(false, ms(450)), Transition::Disarmed);
        assert_eq!(s.phase(), SessionPhase::Idle);

        // The next burst restarts the debounce from scratch
        assert_eq!(s.advance(true, ms(600)), Transition::Armed);
        assert_eq!(s.advance(true, ms(1000)), Transition::None);
        assert_eq!(s.advance(true, ms(1100)), Transition::Keyed);
    }

    #[test]
    fn zero_delay_keys_on_first_active_frame() {
        let mut s = PttSession::new(timing(0, 100, 100));
        assert_eq!(s.advance(true, ms(10)), Transition::Keyed);
    }

    #[test]
    fn release_waits_for_min_hold() {
        // silence timeout shorter than the hold time
        let mut s = PttSession::new(timing(0, 100, 1000));
        s.advance(true, ms(0));
        assert_eq!(s.advance(false, ms(500)), Transition::None);
        assert_eq!(s.advance(false, ms(1000)), Transition::None);
        assert_eq!(s.advance(false, ms(1001)), Transition::Released);
    }

    #[test]
    fn speech_resets_silence_timer() {
        let mut s = PttSession::new(timing(0, 300, 0));
        s.advance(true, ms(0));
        assert_eq!(s.advance(false, ms(200)), Transition::None);
        assert_eq!(s.advance(true, ms(250)), Transition::None);
        assert_eq!(s.advance(false, ms(500)), Transition::None);
        assert_eq!(s.advance(false, ms(551)), Transition::Released);
    }

    #[test]
    fn release_uses_strict_comparison() {
        let mut s = PttSession::new(timing(0, 100, 0));
        s.advance(true, ms(0));
        assert_eq!(s.advance(false, ms(100)), Transition::None);
        assert_eq!(s.advance(false, ms(101)), Transition::Released);
    }

    #[test]
    fn force_idle_reports_previous_key() {
        let mut s = PttSession::new(timing(0, 100, 100));
        assert!(!s.force_idle());
        s.advance(true, ms(0));
        assert!(s.force_idle());
        assert_eq!(s.tag(), PhaseTag::Idle);
    }
}
