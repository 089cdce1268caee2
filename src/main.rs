use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use vox_relay::audio::RelaySystem;
use vox_relay::channel::{ChannelId, ChannelStatus};
use vox_relay::config::Config;
use vox_relay::controller::{Controller, Flow};
use vox_relay::gpio::open_ptt;
use vox_relay::protocol::ControlEvent;
use vox_relay::recorder::RecordingSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，默认 info 级别
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 加载配置
    let config = Config::new().context("Invalid configuration")?;
    log::info!("{} v{} starting", config.app_name, config.app_version);
    for id in ChannelId::ALL {
        let ch = config.channel(id);
        log::info!(
            "[{}] {}: capture='{}' playback='{}' ptt={} threshold={} gain={} volume={}",
            id,
            ch.label,
            ch.capture_device,
            ch.playback_device,
            ch.ptt_pin,
            ch.threshold,
            ch.input_gain,
            ch.volume_scale,
        );
    }

    let sink = if config.recording.enabled {
        let sink = RecordingSink::new(&config.recording.directory, config.audio.sample_rate);
        sink.ensure_directory().with_context(|| {
            format!(
                "Failed to create recording directory {}",
                sink.directory().display()
            )
        })?;
        log::info!(
            "Recording to {} (max {}s per session)",
            sink.directory().display(),
            config.recording.max_seconds
        );
        Some(sink)
    } else {
        log::info!("Recording disabled");
        None
    };

    // PTT 引脚，每个电台一个
    let pins = [
        open_ptt(&config.gpio, config.channel(ChannelId::A))
            .with_context(|| format!("PTT line for {}", config.channel(ChannelId::A).label))?,
        open_ptt(&config.gpio, config.channel(ChannelId::B))
            .with_context(|| format!("PTT line for {}", config.channel(ChannelId::B).label))?,
    ];

    let statuses = [Arc::new(ChannelStatus::new()), Arc::new(ChannelStatus::new())];
    let labels = [
        config.channel(ChannelId::A).label.clone(),
        config.channel(ChannelId::B).label.clone(),
    ];
    let mut controller = Controller::new(pins, statuses.clone(), labels, sink);

    // 音频线程 -> 控制器的事件通道
    let (tx_control, mut rx_control) = mpsc::channel::<ControlEvent>(64);

    let relay = match RelaySystem::start(&config, tx_control, &statuses) {
        Ok(relay) => relay,
        Err(e) => {
            controller.shutdown().await;
            return Err(e.context("Failed to start audio"));
        }
    };
    controller.attach_queues(relay.queue_stats());
    log::info!("Relay running. Press Ctrl+C to stop.");

    let mut reconcile_tick = time::interval(config.reconcile_interval);
    reconcile_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut status_tick = time::interval(config.status_interval);
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    status_tick.tick().await;

    let terminate = terminate_signal();
    tokio::pin!(terminate);

    let mut failure = None;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            _ = &mut terminate => {
                log::info!("Received SIGTERM, shutting down...");
                break;
            }

            Some(event) = rx_control.recv() => {
                if let ControlEvent::StreamFailed { channel, direction, error } = &event {
                    failure = Some(format!("{:?} stream on channel {} failed: {}", direction, channel, error));
                }
                if controller.handle_event(event) == Flow::Shutdown {
                    break;
                }
            }

            _ = reconcile_tick.tick() => {
                controller.reconcile();
            }

            _ = status_tick.tick() => {
                controller.log_status();
            }
        }
    }

    // 先释放 PTT，再停音频线程（限时），最后处理剩余事件
    controller.begin_shutdown();
    if !relay.stop_within(config.stop_timeout).await {
        log::error!(
            "Audio threads still running after {:?}, continuing shutdown",
            config.stop_timeout
        );
    }
    while let Ok(event) = rx_control.try_recv() {
        controller.handle_event(event);
    }
    controller.log_status();
    controller.shutdown().await;

    match failure {
        Some(reason) => Err(anyhow::anyhow!(reason)),
        None => {
            log::info!("Shutdown complete");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            log::warn!("SIGTERM handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
