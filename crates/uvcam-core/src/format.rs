//! UVC format identifiers and stream requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uvcam_hw::PixelFormat;

/// 100 ns ticks per second.
pub const INTERVAL_TICKS_PER_SEC: u32 = 10_000_000;

/// Frame interval in 100 ns units for a frame rate.
///
/// # Panics
///
/// A zero frame rate is a caller bug; the transport only forwards rates it
/// advertised.
pub fn frame_interval(frame_rate: u32) -> u32 {
    assert!(frame_rate > 0, "frame rate must be non-zero");
    INTERVAL_TICKS_PER_SEC / frame_rate
}

/// Video formats the UVC transport can report in a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UvcFormat {
    Unknown,
    Mjpeg,
    Yuy2,
    Nv12,
    Gray8,
}

impl UvcFormat {
    pub const fn name(self) -> &'static str {
        match self {
            UvcFormat::Unknown => "UNKNOWN",
            UvcFormat::Mjpeg => "MJPEG",
            UvcFormat::Yuy2 => "YUY2",
            UvcFormat::Nv12 => "NV12",
            UvcFormat::Gray8 => "GRAY8",
        }
    }

    /// UVC format of frames the sensor produces in `format`.
    pub const fn from_pixel_format(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Jpeg => UvcFormat::Mjpeg,
            PixelFormat::Yuv422 => UvcFormat::Yuy2,
            PixelFormat::Grayscale => UvcFormat::Gray8,
            PixelFormat::Rgb565 => UvcFormat::Unknown,
        }
    }
}

impl fmt::Display for UvcFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the host asked for when it committed a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    pub format: UvcFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl StreamRequest {
    pub const fn mjpeg(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            format: UvcFormat::Mjpeg,
            width,
            height,
            frame_rate,
        }
    }
}

impl fmt::Display for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{}@{}",
            self.format, self.width, self.height, self.frame_rate
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseStreamError {
    #[error("expected WIDTHxHEIGHT@FPS, got {0:?}")]
    Malformed(String),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("frame rate must be non-zero")]
    ZeroFrameRate,
}

/// Parses `"640x480@30"` as an MJPEG request.
impl FromStr for StreamRequest {
    type Err = ParseStreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseStreamError::Malformed(s.to_string());
        let (size, rate) = s.trim().split_once('@').ok_or_else(malformed)?;
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(malformed)?;

        let number = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| ParseStreamError::InvalidNumber(v.to_string()))
        };
        let frame_rate = number(rate)?;
        if frame_rate == 0 {
            return Err(ParseStreamError::ZeroFrameRate);
        }
        Ok(Self::mjpeg(number(width)?, number(height)?, frame_rate))
    }
}
