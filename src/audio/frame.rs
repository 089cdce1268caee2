//! Mono audio blocks passed between capture, render and the recorder.

use std::time::Duration;

/// One block of mono samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    /// Monotonic time since the relay started
    pub captured_at: Duration,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, captured_at: Duration) -> Self {
        Self {
            samples,
            captured_at,
        }
    }

    pub fn silence(len: usize, captured_at: Duration) -> Self {
        Self::new(vec![0.0; len], captured_at)
    }

    /// Normalise mono S16 samples as read from ALSA.
    pub fn from_i16(pcm: &[i16], captured_at: Duration) -> Self {
        let samples = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::new(samples, captured_at)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square energy. Zero for an empty frame.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }

    pub fn scaled(&self, gain: f32) -> AudioFrame {
        AudioFrame::new(
            self.samples.iter().map(|s| s * gain).collect(),
            self.captured_at,
        )
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0.0)
    }

    /// Write as S16 into `out`, clamping. Samples past `out.len()` are ignored
    /// and any remainder of `out` is zeroed.
    pub fn write_i16(&self, out: &mut [i16]) {
        let padded = self.samples.iter().copied().chain(std::iter::repeat(0.0));
        for (dst, src) in out.iter_mut().zip(padded) {
            *dst = sample_to_i16(src);
        }
    }
}

#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_signal_is_its_magnitude() {
        let frame = AudioFrame::new(vec![0.05, -0.05, 0.05, -0.05], Duration::ZERO);
        assert!((frame.rms() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn rms_of_empty_frame_is_zero() {
        assert_eq!(AudioFrame::new(Vec::new(), Duration::ZERO).rms(), 0.0);
    }

    #[test]
    fn scaling_keeps_timestamp() {
        let at = Duration::from_millis(46);
        let frame = AudioFrame::new(vec![0.5, -1.0], at).scaled(0.5);
        assert_eq!(frame.samples, vec![0.25, -0.5]);
        assert_eq!(frame.captured_at, at);
    }

    #[test]
    fn i16_conversion_clamps_and_pads() {
        let frame = AudioFrame::new(vec![2.0, -2.0, 0.5], Duration::ZERO);
        let mut out = [7i16; 5];
        frame.write_i16(&mut out);
        assert_eq!(out, [32767, -32767, 16384, 0, 0]);
    }

    #[test]
    fn from_i16_normalises() {
        let frame = AudioFrame::from_i16(&[16384, -32768], Duration::ZERO);
        assert_eq!(frame.samples, vec![0.5, -1.0]);
    }
}
