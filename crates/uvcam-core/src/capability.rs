//! Formats and frames advertised to the host in the streaming descriptors.

use crate::format::UvcFormat;
use serde::Serialize;

/// One advertised frame descriptor: a resolution at one discrete rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameCapability {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// 100 ns units.
    pub interval: u32,
}

/// A format descriptor and its frame descriptors.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormatCapabilities {
    pub format: UvcFormat,
    pub frames: &'static [FrameCapability],
}

impl FormatCapabilities {
    pub fn find(&self, width: u32, height: u32, frame_rate: u32) -> Option<&'static FrameCapability> {
        self.frames
            .iter()
            .find(|f| f.width == width && f.height == height && f.frame_rate == frame_rate)
    }
}

/// Descriptor index of the MJPEG format.
pub const MJPEG_FORMAT_INDEX: usize = 0;

/// MJPEG frames, default (VGA) first.
pub const MJPEG_FRAMES: [FrameCapability; 4] = [
    FrameCapability { width: 640, height: 480, frame_rate: 30, interval: 333_333 },
    FrameCapability { width: 320, height: 240, frame_rate: 30, interval: 333_333 },
    FrameCapability { width: 480, height: 320, frame_rate: 30, interval: 333_333 },
    FrameCapability { width: 1280, height: 720, frame_rate: 15, interval: 666_666 },
];

pub static FORMATS: &[FormatCapabilities] = &[FormatCapabilities {
    format: UvcFormat::Mjpeg,
    frames: &MJPEG_FRAMES,
}];

/// Find the advertised frame matching a request exactly.
pub fn find_frame(
    formats: &[FormatCapabilities],
    format: UvcFormat,
    width: u32,
    height: u32,
    frame_rate: u32,
) -> Option<&'static FrameCapability> {
    formats
        .iter()
        .filter(|f| f.format == format)
        .find_map(|f| f.find(width, height, frame_rate))
}

/// Log the advertised descriptor set.
pub fn log_capabilities(formats: &[FormatCapabilities]) {
    tracing::info!("====== UVC Configuration Information ======");
    for (fi, fmt) in formats.iter().enumerate() {
        tracing::info!(index = fi + 1, format = %fmt.format, "format");
        for (i, frame) in fmt.frames.iter().enumerate() {
            tracing::info!(
                index = i + 1,
                width = frame.width,
                height = frame.height,
                fps = frame.frame_rate,
                interval = frame.interval,
                "frame"
            );
        }
    }
}
