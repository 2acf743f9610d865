use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Microcontroller family; decides how much RAM the transport buffer gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    Esp32S3,
    Esp32,
}

impl Target {
    /// Largest encoded frame the transport buffer holds on this target.
    pub const fn max_frame_bytes(self) -> usize {
        match self {
            Target::Esp32S3 => 75 * 1024,
            Target::Esp32 => 60 * 1024,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Esp32S3 => "esp32s3",
            Target::Esp32 => "esp32",
        })
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "esp32s3" => Ok(Target::Esp32S3),
            "esp32" => Ok(Target::Esp32),
            other => Err(format!("unknown target {other:?} (expected esp32s3 or esp32)")),
        }
    }
}

/// Fixed board parameters the coordinator is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Sensor master clock.
    pub xclk_freq_hz: u32,
    /// Frame buffers the sensor driver allocates.
    pub fb_count: u8,
    /// Transport buffer size; larger encoded frames are dropped.
    pub max_frame_bytes: usize,
}

impl CoordinatorConfig {
    pub const DEFAULT_XCLK_HZ: u32 = 20_000_000;
    pub const DEFAULT_FB_COUNT: u8 = 2;

    pub const fn for_target(target: Target) -> Self {
        Self {
            xclk_freq_hz: Self::DEFAULT_XCLK_HZ,
            fb_count: Self::DEFAULT_FB_COUNT,
            max_frame_bytes: target.max_frame_bytes(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::for_target(Target::Esp32S3)
    }
}
