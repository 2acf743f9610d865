use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uvcam_core::{capability, frame_interval, Coordinator, UvcDevice};
use uvcam_hw::sim::{self, SimulatedSensor};

mod config;
mod host;

use config::Config;
use host::HostHandle;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        target_board = %config.target,
        max_frame_bytes = config.coordinator.max_frame_bytes,
        "uvcamd starting"
    );

    let model = sim::model_for_pid(config.sensor_pid)
        .ok_or_else(|| anyhow!("no simulated sensor with PID {:#x}", config.sensor_pid))?;
    tracing::info!(sensor = model.name, "selected camera board");

    let coordinator = Coordinator::new(SimulatedSensor::new(model), config.coordinator);
    capability::log_capabilities(coordinator.formats());

    let mut device = host::HostLoop::new();
    device.configure(0, coordinator.into_device_config())?;
    device.init()?;
    let host = device.handle().context("transport did not start")?;

    tracing::info!("UVC device initialized; host attached");

    tokio::select! {
        result = stream(&host, &config) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    host.stop_stream().await?;
    tracing::info!("uvcamd shutting down");
    Ok(())
}

/// Act as the USB host: commit the configured stream and pull frames at the
/// negotiated interval.
async fn stream(host: &HostHandle, config: &Config) -> Result<()> {
    host.start_stream(config.stream)
        .await
        .with_context(|| format!("stream {} refused", config.stream))?;

    let interval = frame_interval(config.stream.frame_rate);
    let mut ticker = tokio::time::interval(Duration::from_nanos(interval as u64 * 100));
    let mut sent = 0u64;
    let mut bytes = 0u64;
    let mut empty = 0u64;

    while config.frames == 0 || sent < config.frames {
        ticker.tick().await;
        match host.request_frame().await? {
            Some(frame) => {
                sent += 1;
                bytes += frame.len as u64;
                tracing::debug!(
                    seq = frame.sequence,
                    len = frame.len,
                    width = frame.width,
                    height = frame.height,
                    jpeg = frame.jpeg,
                    "frame"
                );
            }
            None => empty += 1,
        }
    }

    tracing::info!(
        frames = sent,
        avg_len = if sent > 0 { bytes / sent } else { 0 },
        empty_polls = empty,
        "stream complete"
    );
    Ok(())
}
