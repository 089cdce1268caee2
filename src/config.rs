use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::channel::ChannelId;
use crate::error::ConfigError;

/// One radio: where its audio comes from and goes to, and which pin keys it.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Short identity used in artifact names (e.g. "HT_A")
    pub name: String,
    /// Human-readable label for logs
    pub label: String,
    pub capture_device: String,
    pub playback_device: String,
    /// GPIO line that keys this radio's transmitter
    pub ptt_pin: u32,
    pub ptt_active_low: bool,
    /// RMS above which a capture frame counts as voice
    pub threshold: f32,
    /// Applied to captured audio before relaying and recording
    pub input_gain: f32,
    /// Applied on top of `input_gain` for the relayed audio only
    pub volume_scale: f32,
}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// Samples per frame, also the ALSA period size
    pub block_size: usize,
    /// Frames buffered per direction
    pub queue_depth: usize,
}

/// VOX hysteresis timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxTiming {
    pub activation_delay: Duration,
    pub silence_timeout: Duration,
    pub min_hold_time: Duration,
}

#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Longest session kept in memory; later frames are not recorded
    pub max_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioBackend {
    /// GPIO character device (`/dev/gpiochipN`)
    Cdev,
    DryRun,
}

impl FromStr for GpioBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cdev" => Ok(GpioBackend::Cdev),
            "dry-run" | "dry_run" => Ok(GpioBackend::DryRun),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpioConfig {
    pub backend: GpioBackend,
    /// Chip whose line offsets `ptt_pin` refers to
    pub chip: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub channels: [ChannelConfig; 2],
    pub audio: AudioSettings,
    pub timing: VoxTiming,
    pub recording: RecordingConfig,
    pub gpio: GpioConfig,
    pub reconcile_interval: Duration,
    pub status_interval: Duration,
    /// Longest shutdown waits for the audio threads to exit
    pub stop_timeout: Duration,
}

/// The record buffer is preallocated on the capture thread, so its size is capped.
const MAX_RECORD_SECONDS: f64 = 600.0;

fn parse<T: FromStr>(key: &'static str, value: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Parse { key, value })
}

fn parse_seconds(key: &'static str, value: &'static str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse(key, value)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Range {
        key,
        reason: e.to_string(),
    })
}

fn unit_range(key: &'static str, v: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ConfigError::Range {
            key,
            reason: format!("{} not in [0, 1]", v),
        })
    }
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, ConfigError> {
        let channel_a = ChannelConfig {
            name: env!("CHANNEL_A_NAME").to_string(),
            label: env!("CHANNEL_A_LABEL").to_string(),
            capture_device: env!("CHANNEL_A_CAPTURE_DEVICE").to_string(),
            playback_device: env!("CHANNEL_A_PLAYBACK_DEVICE").to_string(),
            ptt_pin: parse("CHANNEL_A_PTT_PIN", env!("CHANNEL_A_PTT_PIN"))?,
            ptt_active_low: parse("CHANNEL_A_PTT_ACTIVE_LOW", env!("CHANNEL_A_PTT_ACTIVE_LOW"))?,
            threshold: parse("CHANNEL_A_THRESHOLD", env!("CHANNEL_A_THRESHOLD"))?,
            input_gain: parse("CHANNEL_A_INPUT_GAIN", env!("CHANNEL_A_INPUT_GAIN"))?,
            volume_scale: parse("CHANNEL_A_VOLUME_SCALE", env!("CHANNEL_A_VOLUME_SCALE"))?,
        };
        let channel_b = ChannelConfig {
            name: env!("CHANNEL_B_NAME").to_string(),
            label: env!("CHANNEL_B_LABEL").to_string(),
            capture_device: env!("CHANNEL_B_CAPTURE_DEVICE").to_string(),
            playback_device: env!("CHANNEL_B_PLAYBACK_DEVICE").to_string(),
            ptt_pin: parse("CHANNEL_B_PTT_PIN", env!("CHANNEL_B_PTT_PIN"))?,
            ptt_active_low: parse("CHANNEL_B_PTT_ACTIVE_LOW", env!("CHANNEL_B_PTT_ACTIVE_LOW"))?,
            threshold: parse("CHANNEL_B_THRESHOLD", env!("CHANNEL_B_THRESHOLD"))?,
            input_gain: parse("CHANNEL_B_INPUT_GAIN", env!("CHANNEL_B_INPUT_GAIN"))?,
            volume_scale: parse("CHANNEL_B_VOLUME_SCALE", env!("CHANNEL_B_VOLUME_SCALE"))?,
        };

        let config = Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),
            channels: [channel_a, channel_b],
            audio: AudioSettings {
                sample_rate: parse("AUDIO_SAMPLE_RATE", env!("AUDIO_SAMPLE_RATE"))?,
                block_size: parse("AUDIO_BLOCK_SIZE", env!("AUDIO_BLOCK_SIZE"))?,
                queue_depth: parse("AUDIO_QUEUE_DEPTH", env!("AUDIO_QUEUE_DEPTH"))?,
            },
            timing: VoxTiming {
                activation_delay: parse_seconds(
                    "VOX_ACTIVATION_DELAY",
                    env!("VOX_ACTIVATION_DELAY"),
                )?,
                silence_timeout: parse_seconds("VOX_SILENCE_TIMEOUT", env!("VOX_SILENCE_TIMEOUT"))?,
                min_hold_time: parse_seconds("VOX_MIN_HOLD_TIME", env!("VOX_MIN_HOLD_TIME"))?,
            },
            recording: RecordingConfig {
                enabled: parse("RECORDING_ENABLED", env!("RECORDING_ENABLED"))?,
                directory: PathBuf::from(env!("RECORDING_DIRECTORY")),
                max_seconds: parse("RECORDING_MAX_SECONDS", env!("RECORDING_MAX_SECONDS"))?,
            },
            gpio: GpioConfig {
                backend: env!("GPIO_BACKEND").parse()?,
                chip: PathBuf::from(env!("GPIO_CHIP")),
            },
            reconcile_interval: Duration::from_millis(parse(
                "SUPERVISOR_RECONCILE_INTERVAL_MS",
                env!("SUPERVISOR_RECONCILE_INTERVAL_MS"),
            )?),
            status_interval: Duration::from_secs(parse(
                "SUPERVISOR_STATUS_INTERVAL_SECS",
                env!("SUPERVISOR_STATUS_INTERVAL_SECS"),
            )?),
            stop_timeout: Duration::from_millis(parse(
                "SUPERVISOR_STOP_TIMEOUT_MS",
                env!("SUPERVISOR_STOP_TIMEOUT_MS"),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelConfig {
        &self.channels[id.index()]
    }

    /// Range checks that `FromStr` alone can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for ch in &self.channels {
            unit_range("threshold", ch.threshold)?;
            unit_range("input_gain", ch.input_gain)?;
            unit_range("volume_scale", ch.volume_scale)?;
        }
        if self.channels[0].ptt_pin == self.channels[1].ptt_pin {
            return Err(ConfigError::Range {
                key: "ptt_pin",
                reason: "both channels use the same pin".to_string(),
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Range {
                key: "sample_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.audio.block_size == 0 {
            return Err(ConfigError::Range {
                key: "block_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.audio.queue_depth == 0 {
            return Err(ConfigError::Range {
                key: "queue_depth",
                reason: "must be positive".to_string(),
            });
        }
        let max_seconds = self.recording.max_seconds;
        if !(0.0..=MAX_RECORD_SECONDS).contains(&max_seconds) {
            return Err(ConfigError::Range {
                key: "max_seconds",
                reason: format!("{} not in [0, {}]", max_seconds, MAX_RECORD_SECONDS),
            });
        }
        if self.reconcile_interval.is_zero() || self.status_interval.is_zero() {
            return Err(ConfigError::Range {
                key: "supervisor",
                reason: "intervals must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Frames a recording may hold before it stops growing.
    pub fn max_record_frames(&self) -> usize {
        let frames = self.recording.max_seconds * self.audio.sample_rate as f64
            / self.audio.block_size as f64;
        frames.ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_config_is_valid() {
        let config = Config::new().unwrap();
        assert_ne!(config.channel(ChannelId::A).name, config.channel(ChannelId::B).name);
        assert!(config.audio.block_size > 0);
    }

    #[test]
    fn rejects_gain_above_one() {
        let mut config = Config::new().unwrap();
        config.channels[1].input_gain = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Range { key: "input_gain", .. })
        ));
    }

    #[test]
    fn rejects_shared_ptt_pin() {
        let mut config = Config::new().unwrap();
        config.channels[1].ptt_pin = config.channels[0].ptt_pin;
        assert!(config.validate().is_err());
    }

    #[test]
    fn record_cap_rounds_up_to_whole_frames() {
        let mut config = Config::new().unwrap();
        config.audio.sample_rate = 44100;
        config.audio.block_size = 1024;
        config.recording.max_seconds = 30.0;
        // 30 s * 44100 / 1024 = 1291.99...
        assert_eq!(config.max_record_frames(), 1292);
    }

    #[test]
    fn rejects_unbounded_record_cap() {
        let mut config = Config::new().unwrap();
        config.recording.max_seconds = 1e9;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Range { key: "max_seconds", .. })
        ));
        config.recording.max_seconds = f64::NAN;
        assert!(config.validate().is_err());
        config.recording.max_seconds = 600.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backend_names() {
        assert_eq!("cdev".parse::<GpioBackend>().unwrap(), GpioBackend::Cdev);
        assert_eq!("dry-run".parse::<GpioBackend>().unwrap(), GpioBackend::DryRun);
        assert!("wiringpi".parse::<GpioBackend>().is_err());
    }
}
