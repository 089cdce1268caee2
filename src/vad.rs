//! Energy-gate voice activity detection.
//!
//! RMS of the raw (pre-gain) block against a fixed per-channel threshold.

use crate::audio::frame::AudioFrame;

/// Per-frame detector output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activity {
    pub rms: f32,
    /// Instantaneous threshold test, before any debounce
    pub active: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VoiceDetector {
    threshold: f32,
}

impl VoiceDetector {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    #[inline]
    pub fn classify(&self, frame: &AudioFrame) -> Activity {
        let rms = frame.rms();
        Activity {
            rms,
            active: rms > self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tone(level: f32) -> AudioFrame {
        let samples = (0..256).map(|i| if i % 2 == 0 { level } else { -level }).collect();
        AudioFrame::new(samples, Duration::ZERO)
    }

    #[test]
    fn above_threshold_is_active() {
        let vad = VoiceDetector::new(0.02);
        let activity = vad.classify(&tone(0.05));
        assert!(activity.active);
        assert!((activity.rms - 0.05).abs() < 1e-6);
    }

    #[test]
    fn threshold_itself_is_not_active() {
        let vad = VoiceDetector::new(0.25);
        assert!(!vad.classify(&tone(0.25)).active);
    }

    #[test]
    fn silence_is_inactive() {
        let vad = VoiceDetector::new(0.0);
        assert!(!vad.classify(&AudioFrame::silence(128, Duration::ZERO)).active);
    }
}
