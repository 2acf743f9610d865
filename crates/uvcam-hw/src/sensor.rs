//! Camera sensor driver boundary.
//!
//! The coordinator never programs registers itself. It talks to the sensor
//! driver through [`CameraSensor`], which mirrors the init / capture / return /
//! parameter-set calls a microcontroller camera library exposes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor init failed: {0}")]
    InitFailed(String),
    #[error("no sensor detected on the camera bus")]
    NoSensor,
    #[error("format not supported: {0}")]
    FormatNotSupported(PixelFormat),
    #[error("sensor control failed: {0}")]
    ControlFailed(String),
}

/// Pixel formats a sensor can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb565,
    Yuv422,
    Grayscale,
    /// Hardware JPEG compression.
    Jpeg,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Grayscale => "GRAYSCALE",
            PixelFormat::Jpeg => "JPEG",
        };
        f.write_str(name)
    }
}

/// Discrete output sizes the sensor driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameSize {
    /// 320x240
    Qvga,
    /// 480x320
    Hvga,
    /// 640x480
    Vga,
    /// 800x600
    Svga,
    /// 1280x720
    Hd,
    /// 1920x1080
    Fhd,
}

impl FrameSize {
    pub const ALL: [FrameSize; 6] = [
        FrameSize::Qvga,
        FrameSize::Hvga,
        FrameSize::Vga,
        FrameSize::Svga,
        FrameSize::Hd,
        FrameSize::Fhd,
    ];

    /// Exact-match lookup of a pixel geometry. No rounding to the nearest size.
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|size| size.dimensions() == (width, height))
    }

    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            FrameSize::Qvga => (320, 240),
            FrameSize::Hvga => (480, 320),
            FrameSize::Vga => (640, 480),
            FrameSize::Svga => (800, 600),
            FrameSize::Hd => (1280, 720),
            FrameSize::Fhd => (1920, 1080),
        }
    }

    /// JPEG quality used for this size (0-63, lower is better quality).
    ///
    /// Larger frames trade quality for a bounded encoded size so they still
    /// fit the transport buffer.
    pub const fn jpeg_quality(self) -> u8 {
        match self {
            FrameSize::Qvga | FrameSize::Hvga => 10,
            FrameSize::Vga => 12,
            FrameSize::Svga => 14,
            FrameSize::Hd | FrameSize::Fhd => 16,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FrameSize::Qvga => "QVGA",
            FrameSize::Hvga => "HVGA",
            FrameSize::Vga => "VGA",
            FrameSize::Svga => "SVGA",
            FrameSize::Hd => "HD",
            FrameSize::Fhd => "FHD",
        }
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{} ({w}x{h})", self.name())
    }
}

/// Everything the driver needs to bring the sensor up.
///
/// Two configs comparing equal means the hardware does not need to be
/// reinitialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub xclk_freq_hz: u32,
    pub pixel_format: PixelFormat,
    pub frame_size: FrameSize,
    pub jpeg_quality: u8,
    pub fb_count: u8,
}

/// Static description of a sensor model, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub name: String,
    pub product_id: u16,
    pub supported_formats: Vec<PixelFormat>,
}

impl SensorInfo {
    pub fn supports(&self, format: PixelFormat) -> bool {
        self.supported_formats.contains(&format)
    }
}

/// A frame buffer checked out of the driver's pool.
pub trait SensorFrame {
    /// Encoded bytes, borrowed from driver-owned memory.
    fn data(&self) -> &[u8];
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;
    /// Capture time relative to sensor start.
    fn timestamp(&self) -> Duration;

    fn len(&self) -> usize {
        self.data().len()
    }

    fn is_empty(&self) -> bool {
        self.data().is_empty()
    }
}

/// Image-tuning handle of an initialized sensor.
///
/// Resolution, pixel format and clock must not be changed through this
/// handle; those require a full reinit.
pub trait SensorControl {
    fn product_id(&self) -> u16;
    fn set_vflip(&mut self, enable: bool) -> Result<(), SensorError>;
    fn set_hmirror(&mut self, enable: bool) -> Result<(), SensorError>;
    /// -2..=2
    fn set_brightness(&mut self, level: i8) -> Result<(), SensorError>;
    /// -2..=2
    fn set_saturation(&mut self, level: i8) -> Result<(), SensorError>;
}

/// Camera driver as seen by the coordinator.
pub trait CameraSensor {
    type Frame: SensorFrame;
    type Control: SensorControl;

    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError>;
    fn deinit(&mut self);
    /// Reclaim every buffer currently checked out, without waiting for the
    /// holders to return them.
    fn return_all(&mut self);
    /// Next ready frame, or `None` when nothing has been captured yet.
    fn get_frame(&mut self) -> Option<Self::Frame>;
    fn return_frame(&mut self, frame: Self::Frame);
    /// Tuning handle; `None` if the driver is not initialized.
    fn sensor(&mut self) -> Option<&mut Self::Control>;
    fn sensor_info(&self, product_id: u16) -> Option<SensorInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_exact_lookup() {
        assert_eq!(FrameSize::from_dimensions(640, 480), Some(FrameSize::Vga));
        assert_eq!(FrameSize::from_dimensions(1280, 720), Some(FrameSize::Hd));
        assert_eq!(FrameSize::from_dimensions(640, 481), None);
        assert_eq!(FrameSize::from_dimensions(480, 640), None);
    }

    #[test]
    fn test_quality_never_improves_with_size() {
        let mut by_area = FrameSize::ALL.to_vec();
        by_area.sort_by_key(|s| {
            let (w, h) = s.dimensions();
            w * h
        });
        for pair in by_area.windows(2) {
            assert!(pair[0].jpeg_quality() <= pair[1].jpeg_quality());
        }
    }

    #[test]
    fn test_sensor_info_supports() {
        let info = SensorInfo {
            name: "OV2640".into(),
            product_id: 0x26,
            supported_formats: vec![PixelFormat::Jpeg, PixelFormat::Rgb565],
        };
        assert!(info.supports(PixelFormat::Jpeg));
        assert!(!info.supports(PixelFormat::Grayscale));
    }
}
