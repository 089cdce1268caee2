use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    application: Application,
    audio: Audio,
    vox: Vox,
    recording: Recording,
    gpio: Gpio,
    supervisor: Supervisor,
    channel_a: Channel,
    channel_b: Channel,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Audio {
    sample_rate: u32,
    block_size: usize,
    queue_depth: usize,
}

#[derive(Deserialize)]
struct Vox {
    activation_delay: f64,
    silence_timeout: f64,
    min_hold_time: f64,
}

#[derive(Deserialize)]
struct Recording {
    enabled: bool,
    directory: String,
    max_seconds: f64,
}

#[derive(Deserialize)]
struct Gpio {
    backend: String,
    chip: String,
}

#[derive(Deserialize)]
struct Supervisor {
    reconcile_interval_ms: u64,
    status_interval_secs: u64,
    stop_timeout_ms: u64,
}

#[derive(Deserialize)]
struct Channel {
    name: String,
    label: String,
    capture_device: String,
    playback_device: String,
    ptt_pin: u32,
    ptt_active_low: bool,
    threshold: f32,
    input_gain: f32,
    volume_scale: f32,
}

fn emit_channel(prefix: &str, ch: &Channel) {
    println!("cargo:rustc-env={}_NAME={}", prefix, ch.name);
    println!("cargo:rustc-env={}_LABEL={}", prefix, ch.label);
    println!("cargo:rustc-env={}_CAPTURE_DEVICE={}", prefix, ch.capture_device);
    println!("cargo:rustc-env={}_PLAYBACK_DEVICE={}", prefix, ch.playback_device);
    println!("cargo:rustc-env={}_PTT_PIN={}", prefix, ch.ptt_pin);
    println!("cargo:rustc-env={}_PTT_ACTIVE_LOW={}", prefix, ch.ptt_active_low);
    println!("cargo:rustc-env={}_THRESHOLD={}", prefix, ch.threshold);
    println!("cargo:rustc-env={}_INPUT_GAIN={}", prefix, ch.input_gain);
    println!("cargo:rustc-env={}_VOLUME_SCALE={}", prefix, ch.volume_scale);
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 音频配置
    println!("cargo:rustc-env=AUDIO_SAMPLE_RATE={}", config.audio.sample_rate);
    println!("cargo:rustc-env=AUDIO_BLOCK_SIZE={}", config.audio.block_size);
    println!("cargo:rustc-env=AUDIO_QUEUE_DEPTH={}", config.audio.queue_depth);

    // VOX 定时
    println!("cargo:rustc-env=VOX_ACTIVATION_DELAY={}", config.vox.activation_delay);
    println!("cargo:rustc-env=VOX_SILENCE_TIMEOUT={}", config.vox.silence_timeout);
    println!("cargo:rustc-env=VOX_MIN_HOLD_TIME={}", config.vox.min_hold_time);

    // 录音
    println!("cargo:rustc-env=RECORDING_ENABLED={}", config.recording.enabled);
    println!("cargo:rustc-env=RECORDING_DIRECTORY={}", config.recording.directory);
    println!("cargo:rustc-env=RECORDING_MAX_SECONDS={}", config.recording.max_seconds);

    // GPIO
    println!("cargo:rustc-env=GPIO_BACKEND={}", config.gpio.backend);
    println!("cargo:rustc-env=GPIO_CHIP={}", config.gpio.chip);

    println!(
        "cargo:rustc-env=SUPERVISOR_RECONCILE_INTERVAL_MS={}",
        config.supervisor.reconcile_interval_ms
    );
    println!(
        "cargo:rustc-env=SUPERVISOR_STATUS_INTERVAL_SECS={}",
        config.supervisor.status_interval_secs
    );
    println!(
        "cargo:rustc-env=SUPERVISOR_STOP_TIMEOUT_MS={}",
        config.supervisor.stop_timeout_ms
    );

    emit_channel("CHANNEL_A", &config.channel_a);
    emit_channel("CHANNEL_B", &config.channel_b);
}
