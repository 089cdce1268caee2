//! The control side of the relay.
//!
//! Owns both PTT lines and the recording sink. Audio threads only send it
//! [`ControlEvent`]s; GPIO writes and disk I/O happen here so they can never
//! stall a capture period.

use std::path::PathBuf;
use std::sync::Arc;

use embedded_hal::digital::{OutputPin, PinState};
use tokio::task::JoinSet;

use crate::audio::frame_queue::QueueStats;
use crate::channel::{ChannelId, ChannelStatus};
use crate::error::RecordingError;
use crate::protocol::ControlEvent;
use crate::recorder::{FinishedRecording, RecordingSink};

/// What the main loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

type WriteResult = (ChannelId, Result<Option<PathBuf>, RecordingError>);

pub struct Controller<P: OutputPin> {
    /// Indexed by the radio the line keys
    pins: [P; 2],
    /// Last level successfully written, `None` after a failed write
    applied: [Option<bool>; 2],
    statuses: [Arc<ChannelStatus>; 2],
    labels: [String; 2],
    queue_stats: Option<[Arc<QueueStats>; 2]>,
    sink: Option<Arc<RecordingSink>>,
    writes: JoinSet<WriteResult>,
    /// Set once shutdown starts; lines stay released from then on
    closing: bool,
    saved: u64,
    write_failures: u64,
}

impl<P: OutputPin> Controller<P> {
    /// Takes ownership of both lines and drives them to the released level.
    pub fn new(
        pins: [P; 2],
        statuses: [Arc<ChannelStatus>; 2],
        labels: [String; 2],
        sink: Option<RecordingSink>,
    ) -> Self {
        let mut controller = Self {
            pins,
            applied: [None, None],
            statuses,
            labels,
            queue_stats: None,
            sink: sink.map(Arc::new),
            writes: JoinSet::new(),
            closing: false,
            saved: 0,
            write_failures: 0,
        };
        controller.release_all();
        controller
    }

    /// Queue counters to include in the periodic status line.
    pub fn attach_queues(&mut self, stats: [Arc<QueueStats>; 2]) {
        self.queue_stats = Some(stats);
    }

    /// Level last written to `channel`'s PTT line, if the write succeeded.
    pub fn pin_state(&self, channel: ChannelId) -> Option<bool> {
        self.applied[channel.index()]
    }

    pub fn saved_recordings(&self) -> u64 {
        self.saved
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn handle_event(&mut self, event: ControlEvent) -> Flow {
        match event {
            ControlEvent::Key { target, high } => {
                if high && self.closing {
                    log::debug!("Shutting down, ignoring PTT {} ON", target);
                } else {
                    self.drive(target, high);
                }
                Flow::Continue
            }
            ControlEvent::SessionClosed(recording) => {
                self.persist(recording);
                self.reap_writes();
                Flow::Continue
            }
            ControlEvent::StreamFailed {
                channel,
                direction,
                error,
            } => {
                log::error!(
                    "[{}] {:?} stream failed: {}",
                    self.labels[channel.index()],
                    direction,
                    error
                );
                Flow::Shutdown
            }
        }
    }

    /// Bring every line in line with the phase its source channel reports.
    ///
    /// Covers Key events dropped on a full control queue and GPIO writes
    /// that failed earlier.
    pub fn reconcile(&mut self) {
        if !self.closing {
            for target in ChannelId::ALL {
                let desired = self.statuses[target.other().index()].is_keyed();
                let applied = self.applied[target.index()];
                if applied == Some(desired) {
                    continue;
                }
                if applied.is_some() {
                    log::warn!(
                        "PTT {} out of sync with {}, correcting",
                        target,
                        self.labels[target.other().index()]
                    );
                }
                self.drive(target, desired);
            }
        }
        self.reap_writes();
    }

    /// One line per channel. Queue counters name the direction they belong to:
    /// `dropped` is this channel's audio on its way out, `underruns` is this
    /// channel's render side starving for the other channel's audio.
    pub fn status_line(&self, id: ChannelId) -> String {
        let other = id.other();
        let status = &self.statuses[id.index()];
        let dropped = self
            .queue_stats
            .as_ref()
            .map_or(0, |q| q[other.index()].dropped());
        format!(
            "[{}] {:?} rms={:.4} peak={:.4} sessions={} truncated={} | {}->{} dropped={} | {}->{} underruns={}",
            self.labels[id.index()],
            status.phase(),
            status.last_rms(),
            status.peak_rms(),
            status.sessions(),
            status.truncated_frames(),
            id,
            other,
            dropped,
            other,
            id,
            status.underruns(),
        )
    }

    pub fn log_status(&self) {
        for id in ChannelId::ALL {
            log::info!("{}", self.status_line(id));
        }
    }

    /// Release both lines now and ignore any later request to key.
    ///
    /// Call before joining the audio threads so a stuck thread can't hold a
    /// transmitter keyed.
    pub fn begin_shutdown(&mut self) {
        self.closing = true;
        self.release_all();
    }

    /// Release both lines and wait for recordings still being written.
    pub async fn shutdown(&mut self) {
        self.closing = true;
        self.release_all();

        if !self.writes.is_empty() {
            log::info!("Waiting for {} recording(s) to finish writing", self.writes.len());
        }
        while let Some(joined) = self.writes.join_next().await {
            self.finish_write(joined);
        }

        log::info!(
            "Controller stopped: {} recording(s) saved, {} failed",
            self.saved,
            self.write_failures
        );
    }

    fn release_all(&mut self) {
        for id in ChannelId::ALL {
            self.drive(id, false);
        }
    }

    fn drive(&mut self, target: ChannelId, high: bool) {
        let i = target.index();
        match self.pins[i].set_state(PinState::from(high)) {
            Ok(()) => {
                if self.applied[i] != Some(high) {
                    log::info!(
                        "PTT {} ({}) {}",
                        target,
                        self.labels[i],
                        if high { "ON" } else { "OFF" }
                    );
                }
                self.applied[i] = Some(high);
            }
            Err(e) => {
                log::error!("PTT {} write failed: {:?}", target, e);
                self.applied[i] = None;
            }
        }
    }

    fn persist(&mut self, recording: FinishedRecording) {
        let Some(sink) = self.sink.clone() else {
            log::debug!(
                "Recording disabled, dropping {} frames from {}",
                recording.frames.len(),
                recording.name
            );
            return;
        };
        let channel = recording.channel;
        self.writes
            .spawn_blocking(move || (channel, sink.persist(&recording)));
    }

    fn reap_writes(&mut self) {
        while let Some(joined) = self.writes.try_join_next() {
            self.finish_write(joined);
        }
    }

    fn finish_write(&mut self, joined: Result<WriteResult, tokio::task::JoinError>) {
        match joined {
            Ok((_, Ok(Some(path)))) => {
                self.saved += 1;
                log::info!("Saved recording {}", path.display());
            }
            Ok((_, Ok(None))) => {}
            Ok((channel, Err(e))) => {
                self.write_failures += 1;
                log::error!("[{}] Failed to save recording: {}", self.labels[channel.index()], e);
            }
            Err(e) => {
                self.write_failures += 1;
                log::error!("Recording writer task failed: {}", e);
            }
        }
    }
}
