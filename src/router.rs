//! Relay router: one capture path per source channel.
//!
//! A `CapturePath` runs on the source channel's capture thread. For every frame
//! it updates the VOX session, taps the recorder, and feeds the paired
//! channel's render queue: gain-scaled audio while keyed, silence otherwise, so
//! the render side always sees frames at the capture cadence.
//!
//! Nothing here blocks. PTT changes and finished recordings leave as
//! `try_send` messages for the controller.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::audio::frame::AudioFrame;
use crate::audio::frame_queue::FrameSender;
use crate::channel::{ChannelId, ChannelStatus, PhaseTag};
use crate::config::{ChannelConfig, VoxTiming};
use crate::protocol::ControlEvent;
use crate::recorder::Recorder;
use crate::state_machine::{PttSession, Transition};
use crate::vad::VoiceDetector;

pub struct CapturePath {
    source: ChannelId,
    label: String,
    input_gain: f32,
    /// `input_gain * volume_scale`
    relay_gain: f32,
    detector: VoiceDetector,
    session: PttSession,
    recorder: Option<Recorder>,
    output: FrameSender,
    control: mpsc::Sender<ControlEvent>,
    status: Arc<ChannelStatus>,
}

impl CapturePath {
    pub fn new(
        source: ChannelId,
        config: &ChannelConfig,
        timing: VoxTiming,
        recorder: Option<Recorder>,
        output: FrameSender,
        control: mpsc::Sender<ControlEvent>,
        status: Arc<ChannelStatus>,
    ) -> Self {
        Self {
            source,
            label: config.label.clone(),
            input_gain: config.input_gain,
            relay_gain: config.input_gain * config.volume_scale,
            detector: VoiceDetector::new(config.threshold),
            session: PttSession::new(timing),
            recorder,
            output,
            control,
            status,
        }
    }

    pub fn source(&self) -> ChannelId {
        self.source
    }

    pub fn session(&self) -> &PttSession {
        &self.session
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Handle one captured frame.
    pub fn process(&mut self, frame: AudioFrame) -> Transition {
        let now = frame.captured_at;
        let activity = self.detector.classify(&frame);
        self.status.observe_rms(activity.rms);
        log::trace!("[{}] RMS: {:.5}", self.label, activity.rms);

        let transition = self.session.advance(activity.active, now);
        self.status.set_phase(self.session.tag());
        let target = self.source.other();

        match transition {
            Transition::Keyed => {
                log::info!("[{}] Signal confirmed, PTT {} ON", self.label, target);
                self.status.session_started();
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.start(now);
                }
                self.notify(ControlEvent::Key { target, high: true });
            }
            Transition::Released => {
                log::info!("[{}] Silence, PTT {} OFF", self.label, target);
                self.notify(ControlEvent::Key {
                    target,
                    high: false,
                });
                self.close_recording();
            }
            Transition::Armed => {
                log::debug!("[{}] Above threshold, debouncing", self.label);
            }
            Transition::Disarmed => {
                log::debug!("[{}] Burst too short, ignored", self.label);
            }
            Transition::None => {}
        }

        if self.session.is_keyed() {
            if activity.active {
                if let Some(recorder) = self.recorder.as_mut() {
                    if !recorder.append(frame.scaled(self.input_gain)) {
                        self.status.add_truncated(1);
                    }
                }
            }
            self.output.push(frame.scaled(self.relay_gain));
        } else {
            self.output.push(AudioFrame::silence(frame.len(), now));
        }

        transition
    }

    /// Force the session idle on the way out. An open recording is discarded,
    /// never written half-finished.
    pub fn shutdown(&mut self) {
        let target = self.source.other();
        if self.session.force_idle() {
            log::warn!("[{}] Stopping while keyed, PTT {} OFF", self.label, target);
            self.notify(ControlEvent::Key {
                target,
                high: false,
            });
        }
        if let Some(recorder) = self.recorder.as_mut() {
            let lost = recorder.discard();
            if lost > 0 {
                log::warn!(
                    "[{}] Discarded in-flight recording ({} frames)",
                    self.label,
                    lost
                );
            }
        }
        self.status.set_phase(PhaseTag::Idle);
    }

    fn close_recording(&mut self) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        let Some(finished) = recorder.stop() else {
            return;
        };
        if finished.truncated > 0 {
            log::warn!(
                "[{}] Recording hit its length cap, {} frames not saved",
                self.label,
                finished.truncated
            );
        }
        if finished.frames.is_empty() {
            return;
        }
        self.notify(ControlEvent::SessionClosed(finished));
    }

    fn notify(&self, event: ControlEvent) {
        match self.control.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                // Key events are re-applied by the controller's reconcile tick.
                log::warn!(
                    "[{}] Control queue full, dropped {}",
                    self.label,
                    event_kind(&event)
                );
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("[{}] Controller gone", self.label);
            }
        }
    }
}

fn event_kind(event: &ControlEvent) -> &'static str {
    match event {
        ControlEvent::Key { high: true, .. } => "PTT on",
        ControlEvent::Key { high: false, .. } => "PTT off",
        ControlEvent::SessionClosed(_) => "recording",
        ControlEvent::StreamFailed { .. } => "stream failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame_queue::{FrameReceiver, frame_queue};
    use chrono::Local;
    use std::time::Duration;

    fn channel() -> ChannelConfig {
        ChannelConfig {
            name: "HT_A".into(),
            label: "HT A → HT B".into(),
            capture_device: "null".into(),
            playback_device: "null".into(),
            ptt_pin: 17,
            ptt_active_low: false,
            threshold: 0.02,
            input_gain: 0.8,
            volume_scale: 0.5,
        }
    }

    fn timing() -> VoxTiming {
        VoxTiming {
            activation_delay: Duration::from_millis(100),
            silence_timeout: Duration::from_millis(100),
            min_hold_time: Duration::from_millis(100),
        }
    }

    fn build(
        depth: usize,
    ) -> (CapturePath, FrameReceiver, mpsc::Receiver<ControlEvent>, Arc<ChannelStatus>) {
        let (tx, rx) = frame_queue(depth);
        let (ctl_tx, ctl_rx) = mpsc::channel(16);
        let status = Arc::new(ChannelStatus::new());
        let recorder = Recorder::new(ChannelId::A, "HT_A", 100, Local::now());
        let path = CapturePath::new(
            ChannelId::A,
            &channel(),
            timing(),
            Some(recorder),
            tx,
            ctl_tx,
            status.clone(),
        );
        (path, rx, ctl_rx, status)
    }

    fn frame(level: f32, at_ms: u64) -> AudioFrame {
        AudioFrame::new(vec![level; 32], Duration::from_millis(at_ms))
    }

    #[test]
    fn relays_scaled_audio_only_while_keyed() {
        let (mut path, mut rx, mut ctl, status) = build(16);

        assert_eq!(path.process(frame(0.5, 0)), Transition::Armed);
        assert!(rx.pop().unwrap().is_silent());

        assert_eq!(path.process(frame(0.5, 100)), Transition::Keyed);
        let relayed = rx.pop().unwrap();
        assert!((relayed.samples[0] - 0.5 * 0.8 * 0.5).abs() < 1e-6);
        assert!(status.is_keyed());

        match ctl.try_recv().unwrap() {
            ControlEvent::Key { target, high } => {
                assert_eq!(target, ChannelId::B);
                assert!(high);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn release_sends_recording_after_ptt_off() {
        let (mut path, _rx, mut ctl, status) = build(64);
        path.process(frame(0.5, 0));
        path.process(frame(0.5, 100));
        path.process(frame(0.5, 120));
        path.process(frame(0.0, 150));
        assert_eq!(path.process(frame(0.0, 250)), Transition::Released);
        assert!(!status.is_keyed());

        let events: Vec<ControlEvent> = std::iter::from_fn(|| ctl.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], ControlEvent::Key { high: false, .. }));
        match &events[2] {
            ControlEvent::SessionClosed(rec) => {
                // keying frame and the one after it; silent frames are not recorded
                assert_eq!(rec.frames.len(), 2);
                assert!((rec.frames[0].samples[0] - 0.4).abs() < 1e-6);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(status.sessions(), 1);
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (mut path, rx, _ctl, _status) = build(2);
        for i in 0..5 {
            path.process(frame(0.0, i * 23));
        }
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.stats().dropped(), 3);
    }

    #[test]
    fn shutdown_discards_open_recording() {
        let (mut path, _rx, mut ctl, status) = build(16);
        path.process(frame(0.5, 0));
        path.process(frame(0.5, 100));
        assert!(path.recorder().unwrap().is_recording());

        path.shutdown();

        assert!(!path.recorder().unwrap().is_recording());
        assert!(!path.session().is_keyed());
        assert_eq!(status.phase(), PhaseTag::Idle);
        let events: Vec<ControlEvent> = std::iter::from_fn(|| ctl.try_recv().ok()).collect();
        assert!(matches!(events.last(), Some(ControlEvent::Key { high: false, .. })));
        assert!(!events.iter().any(|e| matches!(e, ControlEvent::SessionClosed(_))));
    }
}
