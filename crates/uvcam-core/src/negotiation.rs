//! Maps a host stream request onto a sensor configuration.

use crate::capability::{self, FormatCapabilities};
use crate::config::CoordinatorConfig;
use crate::format::{frame_interval, StreamRequest, UvcFormat};
use serde::Serialize;
use thiserror::Error;
use uvcam_hw::{FrameSize, PixelFormat, SensorConfig, SensorError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("unsupported format {0}: only MJPEG is streamed")]
    UnsupportedFormat(UvcFormat),
    #[error("unsupported frame {width}x{height}@{frame_rate}")]
    UnsupportedFrame {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    #[error("camera init failed: {0}")]
    Sensor(#[from] SensorError),
}

impl NegotiationError {
    /// True if the request itself was refused, as opposed to the hardware
    /// failing to come up.
    pub fn is_unsupported(&self) -> bool {
        !matches!(self, NegotiationError::Sensor(_))
    }
}

/// The stream the host committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NegotiatedParameters {
    pub format: UvcFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// 100 ns units.
    pub frame_interval: u32,
}

/// Accepted request plus the sensor settings that serve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    pub params: NegotiatedParameters,
    pub sensor: SensorConfig,
}

/// Validate a request and derive the sensor configuration for it.
///
/// Pure: touches no hardware. Panics on a zero frame rate.
pub fn plan_stream(
    request: &StreamRequest,
    formats: &[FormatCapabilities],
    config: &CoordinatorConfig,
) -> Result<StreamPlan, NegotiationError> {
    let interval = frame_interval(request.frame_rate);

    tracing::info!(
        format = %request.format,
        width = request.width,
        height = request.height,
        fps = request.frame_rate,
        interval,
        "UVC negotiation"
    );

    if request.format != UvcFormat::Mjpeg {
        return Err(NegotiationError::UnsupportedFormat(request.format));
    }

    let unsupported = || NegotiationError::UnsupportedFrame {
        width: request.width,
        height: request.height,
        frame_rate: request.frame_rate,
    };

    capability::find_frame(
        formats,
        request.format,
        request.width,
        request.height,
        request.frame_rate,
    )
    .ok_or_else(unsupported)?;

    let frame_size = FrameSize::from_dimensions(request.width, request.height).ok_or_else(unsupported)?;

    Ok(StreamPlan {
        params: NegotiatedParameters {
            format: request.format,
            width: request.width,
            height: request.height,
            frame_rate: request.frame_rate,
            frame_interval: interval,
        },
        sensor: SensorConfig {
            xclk_freq_hz: config.xclk_freq_hz,
            pixel_format: PixelFormat::Jpeg,
            frame_size,
            jpeg_quality: frame_size.jpeg_quality(),
            fb_count: config.fb_count,
        },
    })
}
