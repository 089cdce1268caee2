use std::sync::atomic::{AtomicBool, Ordering};

use alsa::pcm::PCM;
use anyhow::{Result, anyhow};

use super::frame_queue::FrameReceiver;
use crate::channel::{ChannelId, ChannelStatus};

/// Fill `out` with the next queued frame, or silence if the queue is empty.
/// Returns whether a frame was available.
pub fn fill_block(rx: &mut FrameReceiver, status: &ChannelStatus, out: &mut [i16]) -> bool {
    match rx.pop() {
        Some(frame) => {
            frame.write_i16(out);
            true
        }
        None => {
            out.fill(0);
            status.underrun();
            false
        }
    }
}

pub fn render_thread(
    channel: ChannelId,
    pcm: PCM,
    block_size: usize,
    mut rx: FrameReceiver,
    status: &ChannelStatus,
    running: &AtomicBool,
) -> Result<()> {
    let io = pcm.io_i16()?;
    let mut block = vec![0i16; block_size];

    log::info!("Render {} started: block={}", channel, block_size);

    while running.load(Ordering::Relaxed) {
        fill_block(&mut rx, status, &mut block);

        // Short writes and XRUNs: retry the remainder, give up on the block
        // after a few recoveries rather than spin.
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < block.len() {
            match io.writei(&block[frames_written..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error on {}: {}, recovering...", channel, e);
                    retry_count += 1;
                    if let Err(e2) = pcm.prepare() {
                        return Err(anyhow!("Failed to recover PCM playback: {}", e2));
                    }
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            block.len() - frames_written
                        );
                        break;
                    }
                }
            }
        }
    }

    log::info!("Render {} stopped", channel);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFrame;
    use crate::audio::frame_queue::frame_queue;
    use std::time::Duration;

    #[test]
    fn empty_queue_renders_silence_and_counts_underrun() {
        let (_tx, mut rx) = frame_queue(4);
        let status = ChannelStatus::new();
        let mut out = [5i16; 8];

        assert!(!fill_block(&mut rx, &status, &mut out));
        assert_eq!(out, [0; 8]);
        assert_eq!(status.underruns(), 1);
    }

    #[test]
    fn queued_frame_is_rendered() {
        let (mut tx, mut rx) = frame_queue(4);
        let status = ChannelStatus::new();
        tx.push(AudioFrame::new(vec![0.5; 8], Duration::ZERO));
        let mut out = [0i16; 8];

        assert!(fill_block(&mut rx, &status, &mut out));
        assert_eq!(out, [16384; 8]);
        assert_eq!(status.underruns(), 0);
    }
}
