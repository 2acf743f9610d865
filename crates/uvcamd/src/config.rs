use uvcam_core::{CoordinatorConfig, StreamRequest, Target};
use uvcam_hw::sim::parse_pid;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Board family; sets the default transfer buffer size.
    pub target: Target,
    pub coordinator: CoordinatorConfig,
    /// Product ID of the simulated sensor (default: OV2640).
    pub sensor_pid: u16,
    /// Stream the simulated host commits.
    pub stream: StreamRequest,
    /// Frames to pull before stopping; 0 streams until Ctrl-C.
    pub frames: u64,
}

impl Config {
    /// Load configuration from `UVCAM_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let target = env_parse("UVCAM_TARGET", Target::Esp32S3);
        let defaults = CoordinatorConfig::for_target(target);

        Self {
            target,
            coordinator: CoordinatorConfig {
                xclk_freq_hz: env_parse("UVCAM_XCLK_HZ", defaults.xclk_freq_hz),
                fb_count: env_parse("UVCAM_FB_COUNT", defaults.fb_count),
                max_frame_bytes: env_parse("UVCAM_MAX_FRAME_BYTES", defaults.max_frame_bytes),
            },
            sensor_pid: std::env::var("UVCAM_SENSOR_PID")
                .ok()
                .and_then(|v| parse_pid(&v).ok())
                .unwrap_or(0x26),
            stream: env_parse("UVCAM_STREAM", StreamRequest::mjpeg(640, 480, 30)),
            frames: env_parse("UVCAM_FRAMES", 90),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
