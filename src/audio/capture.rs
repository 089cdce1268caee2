use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use alsa::pcm::PCM;
use anyhow::{Result, anyhow};

use super::frame::AudioFrame;
use crate::router::CapturePath;

/// Read one period at a time from `pcm` and hand each block to `path`.
///
/// The blocking `readi` paces the loop at the hardware block rate. On exit,
/// for any reason, the session is forced idle.
pub fn capture_thread(
    pcm: PCM,
    block_size: usize,
    mut path: CapturePath,
    clock: Instant,
    running: &AtomicBool,
) -> Result<()> {
    let result = read_loop(&pcm, block_size, &mut path, clock, running);
    path.shutdown();
    result
}

fn read_loop(
    pcm: &PCM,
    block_size: usize,
    path: &mut CapturePath,
    clock: Instant,
    running: &AtomicBool,
) -> Result<()> {
    let io = pcm.io_i16()?;
    let mut read_buf = vec![0i16; block_size];

    log::info!("Capture {} started: block={}", path.source(), block_size);

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(0) => continue,
            Ok(frames) => {
                let frame = AudioFrame::from_i16(&read_buf[..frames], clock.elapsed());
                path.process(frame);
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    return Err(anyhow!("Failed to recover PCM capture: {}", e2));
                }
            }
        }
    }

    log::info!("Capture {} stopped", path.source());
    Ok(())
}
