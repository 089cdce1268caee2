//! Channel identity and the lock-free status block each capture thread publishes.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

/// One of the two radios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    A,
    B,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::A, ChannelId::B];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            ChannelId::A => 0,
            ChannelId::B => 1,
        }
    }

    /// The radio this channel's audio is relayed to.
    #[inline]
    pub fn other(self) -> ChannelId {
        match self {
            ChannelId::A => ChannelId::B,
            ChannelId::B => ChannelId::A,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::A => f.write_str("A"),
            ChannelId::B => f.write_str("B"),
        }
    }
}

/// Coarse session phase as seen from outside the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PhaseTag {
    Idle = 0,
    Pending = 1,
    Keyed = 2,
}

impl PhaseTag {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PhaseTag::Pending,
            2 => PhaseTag::Keyed,
            _ => PhaseTag::Idle,
        }
    }
}

/// Counters and phase for one source channel.
///
/// Written by the channel's capture thread (and render thread for underruns),
/// read by the controller. Every field is an atomic so readers never observe a
/// torn value.
#[derive(Debug, Default)]
pub struct ChannelStatus {
    phase: AtomicU8,
    last_rms: AtomicU32,
    peak_rms: AtomicU32,
    sessions: AtomicU64,
    truncated_frames: AtomicU64,
    underruns: AtomicU64,
}

impl ChannelStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&self, phase: PhaseTag) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn phase(&self) -> PhaseTag {
        PhaseTag::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether this channel currently holds the paired radio's PTT.
    pub fn is_keyed(&self) -> bool {
        self.phase() == PhaseTag::Keyed
    }

    pub fn observe_rms(&self, rms: f32) {
        self.last_rms.store(rms.to_bits(), Ordering::Relaxed);
        // Single writer, so load-compare-store is enough.
        let peak = f32::from_bits(self.peak_rms.load(Ordering::Relaxed));
        if rms > peak {
            self.peak_rms.store(rms.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn last_rms(&self) -> f32 {
        f32::from_bits(self.last_rms.load(Ordering::Relaxed))
    }

    pub fn peak_rms(&self) -> f32 {
        f32::from_bits(self.peak_rms.load(Ordering::Relaxed))
    }

    pub fn session_started(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub fn add_truncated(&self, frames: u64) {
        self.truncated_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn truncated_frames(&self) -> u64 {
        self.truncated_frames.load(Ordering::Relaxed)
    }

    pub fn underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}
