//! The relay's audio threads.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O so the control
//! task can never delay a period.
//!
//! - capture-X: ALSA capture X -> VAD/PTT session -> queue to Y
//! - render-Y: queue to Y -> ALSA playback Y (silence on underrun)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use alsa::pcm::PCM;
use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use super::alsa_device::{self, AlsaParams};
use super::capture::capture_thread;
use super::frame_queue::{FrameReceiver, QueueStats, frame_queue};
use super::render::render_thread;
use crate::channel::{ChannelId, ChannelStatus};
use crate::config::Config;
use crate::protocol::{ControlEvent, StreamDirection};
use crate::recorder::Recorder;
use crate::router::CapturePath;

pub struct RelaySystem {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    /// Indexed by destination channel
    queue_stats: [Arc<QueueStats>; 2],
}

impl RelaySystem {
    /// Open all four PCM devices, then start the audio threads.
    ///
    /// Any device that fails to open aborts startup before a thread runs.
    pub fn start(
        config: &Config,
        control: mpsc::Sender<ControlEvent>,
        statuses: &[Arc<ChannelStatus>; 2],
    ) -> Result<Self> {
        let rate = config.audio.sample_rate;
        let block = config.audio.block_size;

        let open_capture = |id: ChannelId| -> Result<PCM> {
            let ch = config.channel(id);
            let (pcm, params) = alsa_device::open_capture(&ch.capture_device, rate, block)
                .with_context(|| {
                    format!("Channel {} ({}) capture endpoint '{}'", id, ch.label, ch.capture_device)
                })?;
            warn_period(id, &params, block);
            Ok(pcm)
        };
        let open_playback = |id: ChannelId| -> Result<PCM> {
            let ch = config.channel(id);
            let (pcm, params) = alsa_device::open_playback(&ch.playback_device, rate, block)
                .with_context(|| {
                    format!(
                        "Channel {} ({}) render endpoint '{}'",
                        id, ch.label, ch.playback_device
                    )
                })?;
            warn_period(id, &params, block);
            Ok(pcm)
        };

        let capture_a = open_capture(ChannelId::A)?;
        let capture_b = open_capture(ChannelId::B)?;
        let playback_a = open_playback(ChannelId::A)?;
        let playback_b = open_playback(ChannelId::B)?;

        let (to_a, for_a) = frame_queue(config.audio.queue_depth);
        let (to_b, for_b) = frame_queue(config.audio.queue_depth);
        let queue_stats = [to_a.stats(), to_b.stats()];

        let clock = Instant::now();
        let epoch = Local::now();
        let running = Arc::new(AtomicBool::new(true));

        let build_path = |id: ChannelId, output| {
            let ch = config.channel(id);
            let recorder = config
                .recording
                .enabled
                .then(|| Recorder::new(id, &ch.name, config.max_record_frames(), epoch));
            CapturePath::new(
                id,
                ch,
                config.timing,
                recorder,
                output,
                control.clone(),
                statuses[id.index()].clone(),
            )
        };
        let path_a = build_path(ChannelId::A, to_b);
        let path_b = build_path(ChannelId::B, to_a);

        log::info!(
            "RelaySystem starting: rate: {}Hz, block: {}, queue depth: {}",
            rate,
            block,
            config.audio.queue_depth,
        );

        let mut system = Self {
            running,
            handles: Vec::with_capacity(4),
            queue_stats,
        };

        // Render first so the queues are being drained when capture begins.
        system.spawn_render(config, ChannelId::A, playback_a, for_a, statuses, &control)?;
        system.spawn_render(config, ChannelId::B, playback_b, for_b, statuses, &control)?;
        system.spawn_capture(config, capture_a, path_a, clock, &control)?;
        system.spawn_capture(config, capture_b, path_b, clock, &control)?;

        Ok(system)
    }

    fn spawn_capture(
        &mut self,
        config: &Config,
        pcm: PCM,
        path: CapturePath,
        clock: Instant,
        control: &mpsc::Sender<ControlEvent>,
    ) -> Result<()> {
        let channel = path.source();
        let running = self.running.clone();
        let control = control.clone();
        let block = config.audio.block_size;
        let handle = thread::Builder::new()
            .name(format!("capture-{}", config.channel(channel).name))
            .spawn(move || {
                if let Err(e) = capture_thread(pcm, block, path, clock, &running) {
                    log::error!("Capture thread {} error: {:#}", channel, e);
                    report_failure(&control, channel, StreamDirection::Capture, e);
                }
            })?;
        self.handles.push(handle);
        Ok(())
    }

    fn spawn_render(
        &mut self,
        config: &Config,
        channel: ChannelId,
        pcm: PCM,
        rx: FrameReceiver,
        statuses: &[Arc<ChannelStatus>; 2],
        control: &mpsc::Sender<ControlEvent>,
    ) -> Result<()> {
        let running = self.running.clone();
        let control = control.clone();
        let status = statuses[channel.index()].clone();
        let block = config.audio.block_size;
        let handle = thread::Builder::new()
            .name(format!("render-{}", config.channel(channel).name))
            .spawn(move || {
                if let Err(e) = render_thread(channel, pcm, block, rx, &status, &running) {
                    log::error!("Render thread {} error: {:#}", channel, e);
                    report_failure(&control, channel, StreamDirection::Render, e);
                }
            })?;
        self.handles.push(handle);
        Ok(())
    }

    pub fn queue_stats(&self) -> [Arc<QueueStats>; 2] {
        self.queue_stats.clone()
    }

    /// Signal threads to stop and wait for them to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("audio").to_string();
            if handle.join().is_err() {
                log::error!("Audio thread {} panicked", name);
            }
        }
    }

    /// Stop the threads, giving up after `timeout`.
    ///
    /// Returns `false` if some thread had not exited in time. The join then
    /// carries on in the background and the caller proceeds without it.
    pub async fn stop_within(self, timeout: Duration) -> bool {
        let mut relay = self;
        finish_within(timeout, move || relay.stop()).await
    }
}

/// Run blocking `work` on its own thread and wait at most `timeout` for it.
async fn finish_within<F>(timeout: Duration, work: F) -> bool
where
    F: FnOnce() + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("relay-stop".into())
        .spawn(move || {
            work();
            let _ = done_tx.send(());
        });
    if let Err(e) = spawned {
        log::error!("Failed to spawn stop thread: {}", e);
        return false;
    }
    matches!(time::timeout(timeout, done_rx).await, Ok(Ok(())))
}

impl Drop for RelaySystem {
    fn drop(&mut self) {
        self.stop();
    }
}

fn warn_period(channel: ChannelId, params: &AlsaParams, block: usize) {
    if params.period_size != block {
        log::warn!(
            "Channel {}: period negotiated as {} frames, frames stay {} samples",
            channel,
            params.period_size,
            block
        );
    }
}

fn report_failure(
    control: &mpsc::Sender<ControlEvent>,
    channel: ChannelId,
    direction: StreamDirection,
    error: anyhow::Error,
) {
    let event = ControlEvent::StreamFailed {
        channel,
        direction,
        error: format!("{:#}", error),
    };
    // The controller may already be joining this thread, so never wait here.
    if control.try_send(event).is_err() {
        log::warn!("Stream failure on {} not delivered to the controller", channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finish_within_reports_completed_work() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = flag.clone();
        let finished = finish_within(Duration::from_secs(5), move || {
            seen.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(finished);
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn finish_within_gives_up_on_a_stuck_join() {
        let started = Instant::now();
        let finished = finish_within(Duration::from_millis(50), || {
            thread::sleep(Duration::from_secs(5));
        })
        .await;
        assert!(!finished);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
