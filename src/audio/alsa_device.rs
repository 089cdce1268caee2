//! ALSA PCM device wrappers for mono capture and playback.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result, bail};

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    /// Period size in frames
    pub period_size: usize,
}

/// Open a PCM device for capture, one channel, S16_LE.
pub fn open_capture(
    device: &str,
    sample_rate: u32,
    period_size: usize,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Capture, sample_rate, period_size, "Capture")
}

/// Open a PCM device for playback, one channel, S16_LE.
pub fn open_playback(
    device: &str,
    sample_rate: u32,
    period_size: usize,
) -> Result<(PCM, AlsaParams)> {
    open_pcm(device, Direction::Playback, sample_rate, period_size, "Playback")
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    period_size: usize,
    dir_name: &str,
) -> Result<(PCM, AlsaParams)> {
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(Format::S16LE)?;
        hwp.set_channels(1)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(period_size as alsa::pcm::Frames, ValueOr::Nearest)?;
        hwp.set_buffer_size_near((period_size * 4) as alsa::pcm::Frames)?;
        pcm.hw_params(&hwp)
            .with_context(|| format!("Failed to apply {} params on '{}'", dir_name, device))?;
    }

    let (actual_rate, actual_period) = {
        let hwp = pcm.hw_params_current()?;
        (hwp.get_rate()?, hwp.get_period_size()? as usize)
    };

    // Timers and recordings assume the configured rate.
    if actual_rate != sample_rate {
        bail!(
            "{} device '{}' runs at {} Hz, configured {} Hz",
            dir_name,
            device,
            actual_rate,
            sample_rate
        );
    }

    log::info!(
        "ALSA {}: device={}, rate={}, period_size={}",
        dir_name,
        device,
        actual_rate,
        actual_period,
    );

    Ok((
        pcm,
        AlsaParams {
            period_size: actual_period,
        },
    ))
}
