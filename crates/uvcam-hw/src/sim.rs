//! Simulated camera sensor.
//!
//! Behaves like a small hardware frame-buffer pool: `fb_count` buffers, a
//! non-blocking `get_frame` that comes back empty once every buffer is
//! checked out, and a product ID that selects the post-init quirks. Each
//! frame carries a real JPEG test pattern encoded once per init and shared
//! by all buffers, so handing out a frame never copies pixel data.
//!
//! Call counters make the driver traffic observable from tests and the CLI.

use crate::sensor::{
    CameraSensor, PixelFormat, SensorConfig, SensorControl, SensorError, SensorFrame, SensorInfo,
};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use std::num::ParseIntError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A sensor model the simulator can impersonate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimModel {
    pub name: &'static str,
    pub product_id: u16,
    pub formats: &'static [PixelFormat],
}

const JPEG_CAPABLE: &[PixelFormat] = &[
    PixelFormat::Jpeg,
    PixelFormat::Rgb565,
    PixelFormat::Yuv422,
    PixelFormat::Grayscale,
];

pub const OV2640: SimModel = SimModel { name: "OV2640", product_id: 0x26, formats: JPEG_CAPABLE };
pub const OV3660: SimModel = SimModel { name: "OV3660", product_id: 0x3660, formats: JPEG_CAPABLE };
pub const OV5640: SimModel = SimModel { name: "OV5640", product_id: 0x5640, formats: JPEG_CAPABLE };
pub const GC0308: SimModel = SimModel {
    name: "GC0308",
    product_id: 0x9b,
    formats: &[PixelFormat::Rgb565, PixelFormat::Yuv422, PixelFormat::Grayscale],
};
pub const GC032A: SimModel = SimModel {
    name: "GC032A",
    product_id: 0x232a,
    formats: &[PixelFormat::Rgb565, PixelFormat::Yuv422, PixelFormat::Grayscale],
};

pub const MODELS: [SimModel; 5] = [OV2640, OV3660, OV5640, GC0308, GC032A];

/// Find a simulated model by product ID.
pub fn model_for_pid(product_id: u16) -> Option<SimModel> {
    MODELS.into_iter().find(|m| m.product_id == product_id)
}

/// Parse a product ID written as `0x3660` or plain decimal.
pub fn parse_pid(value: &str) -> Result<u16, ParseIntError> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

/// Driver calls observed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorCounters {
    pub inits: u32,
    pub deinits: u32,
    pub return_alls: u32,
    pub frames_out: u64,
    pub frames_returned: u64,
    /// Buffers taken back by `return_all` rather than `return_frame`.
    pub frames_reclaimed: u64,
    /// `deinit` calls made while buffers were still checked out.
    pub deinits_with_outstanding: u32,
}

impl SensorCounters {
    /// Buffers neither returned nor reclaimed.
    pub fn outstanding(&self) -> u64 {
        self.frames_out - self.frames_returned - self.frames_reclaimed
    }
}

/// Tuning registers of the simulated sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimControl {
    pub product_id: u16,
    pub vflip: bool,
    pub hmirror: bool,
    pub brightness: i8,
    pub saturation: i8,
}

impl SimControl {
    fn new(product_id: u16) -> Self {
        Self {
            product_id,
            vflip: false,
            // Power-on default on these parts is mirrored.
            hmirror: true,
            brightness: 0,
            saturation: 0,
        }
    }
}

fn check_level(what: &str, level: i8) -> Result<(), SensorError> {
    if (-2..=2).contains(&level) {
        Ok(())
    } else {
        Err(SensorError::ControlFailed(format!("{what} level {level} out of range")))
    }
}

impl SensorControl for SimControl {
    fn product_id(&self) -> u16 {
        self.product_id
    }

    fn set_vflip(&mut self, enable: bool) -> Result<(), SensorError> {
        self.vflip = enable;
        Ok(())
    }

    fn set_hmirror(&mut self, enable: bool) -> Result<(), SensorError> {
        self.hmirror = enable;
        Ok(())
    }

    fn set_brightness(&mut self, level: i8) -> Result<(), SensorError> {
        check_level("brightness", level)?;
        self.brightness = level;
        Ok(())
    }

    fn set_saturation(&mut self, level: i8) -> Result<(), SensorError> {
        check_level("saturation", level)?;
        self.saturation = level;
        Ok(())
    }
}

/// One checked-out buffer.
#[derive(Debug, Clone)]
pub struct SimFrame {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    format: PixelFormat,
    timestamp: Duration,
}

impl SensorFrame for SimFrame {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

pub struct SimulatedSensor {
    model: SimModel,
    config: Option<SensorConfig>,
    control: Option<SimControl>,
    payload: Option<Arc<[u8]>>,
    forced_len: Option<usize>,
    checked_out: usize,
    started: Instant,
    starved: bool,
    fail_next_init: Option<String>,
    counters: SensorCounters,
}

impl SimulatedSensor {
    pub fn new(model: SimModel) -> Self {
        Self {
            model,
            config: None,
            control: None,
            payload: None,
            forced_len: None,
            checked_out: 0,
            started: Instant::now(),
            starved: false,
            fail_next_init: None,
            counters: SensorCounters::default(),
        }
    }

    /// Serve frames of exactly `len` bytes instead of an encoded pattern.
    pub fn with_payload_len(mut self, len: usize) -> Self {
        self.forced_len = Some(len);
        self
    }

    /// Change the forced payload length; takes effect on the next init.
    pub fn set_payload_len(&mut self, len: Option<usize>) {
        self.forced_len = len;
    }

    /// Make the next `init` fail with the given reason.
    pub fn fail_next_init(&mut self, reason: impl Into<String>) {
        self.fail_next_init = Some(reason.into());
    }

    /// A starved sensor never has a frame ready.
    pub fn set_starved(&mut self, starved: bool) {
        self.starved = starved;
    }

    pub fn counters(&self) -> SensorCounters {
        self.counters
    }

    pub fn active_config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    pub fn controls(&self) -> Option<&SimControl> {
        self.control.as_ref()
    }

    pub fn checked_out(&self) -> usize {
        self.checked_out
    }

    fn build_payload(&self, config: &SensorConfig) -> Result<Arc<[u8]>, SensorError> {
        if let Some(len) = self.forced_len {
            return Ok(synthetic_jpeg(len).into());
        }
        let (width, height) = config.frame_size.dimensions();
        match config.pixel_format {
            PixelFormat::Jpeg => encode_test_pattern(width, height, config.jpeg_quality).map(Into::into),
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => {
                Ok(vec![0u8; (width * height * 2) as usize].into())
            }
            PixelFormat::Grayscale => Ok(vec![0u8; (width * height) as usize].into()),
        }
    }
}

impl CameraSensor for SimulatedSensor {
    type Frame = SimFrame;
    type Control = SimControl;

    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        if self.config.is_some() {
            return Err(SensorError::InitFailed("camera already initialized".into()));
        }
        if let Some(reason) = self.fail_next_init.take() {
            return Err(SensorError::InitFailed(reason));
        }
        if config.fb_count == 0 {
            return Err(SensorError::InitFailed("fb_count must be at least 1".into()));
        }

        self.payload = Some(self.build_payload(config)?);
        self.control = Some(SimControl::new(self.model.product_id));
        self.config = Some(*config);
        self.checked_out = 0;
        self.started = Instant::now();
        self.counters.inits += 1;

        tracing::debug!(
            sensor = self.model.name,
            frame_size = %config.frame_size,
            quality = config.jpeg_quality,
            "simulated sensor initialized"
        );
        Ok(())
    }

    fn deinit(&mut self) {
        if self.checked_out > 0 {
            tracing::warn!(checked_out = self.checked_out, "deinit with frames still checked out");
            self.counters.deinits_with_outstanding += 1;
        }
        self.config = None;
        self.control = None;
        self.payload = None;
        self.checked_out = 0;
        self.counters.deinits += 1;
    }

    fn return_all(&mut self) {
        self.counters.frames_reclaimed += self.checked_out as u64;
        self.checked_out = 0;
        self.counters.return_alls += 1;
    }

    fn get_frame(&mut self) -> Option<SimFrame> {
        let config = self.config.as_ref()?;
        if self.starved || self.checked_out >= config.fb_count as usize {
            return None;
        }
        let data = self.payload.clone()?;
        let (width, height) = config.frame_size.dimensions();

        self.checked_out += 1;
        self.counters.frames_out += 1;

        Some(SimFrame {
            data,
            width,
            height,
            format: config.pixel_format,
            timestamp: self.started.elapsed(),
        })
    }

    fn return_frame(&mut self, frame: SimFrame) {
        drop(frame);
        self.checked_out = self.checked_out.saturating_sub(1);
        self.counters.frames_returned += 1;
    }

    fn sensor(&mut self) -> Option<&mut SimControl> {
        self.control.as_mut()
    }

    fn sensor_info(&self, product_id: u16) -> Option<SensorInfo> {
        let model = model_for_pid(product_id)?;
        Some(SensorInfo {
            name: model.name.to_string(),
            product_id,
            supported_formats: model.formats.to_vec(),
        })
    }
}

/// SOI marker, zero fill, EOI marker. Always at least 4 bytes.
fn synthetic_jpeg(len: usize) -> Vec<u8> {
    let len = len.max(4);
    let mut data = vec![0u8; len];
    data[..2].copy_from_slice(&[0xFF, 0xD8]);
    data[len - 2..].copy_from_slice(&[0xFF, 0xD9]);
    data
}

/// Encode a color-bar gradient at the given sensor JPEG quality (0-63,
/// lower is better).
pub fn encode_test_pattern(width: u32, height: u32, quality: u8) -> Result<Vec<u8>, SensorError> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let bar = (x * 8 / width.max(1)) as u8;
        let shade = (y * 255 / height.max(1)) as u8;
        Rgb([
            if bar & 1 != 0 { 255 - shade } else { shade / 4 },
            if bar & 2 != 0 { 255 - shade } else { shade / 4 },
            if bar & 4 != 0 { 255 - shade } else { shade / 4 },
        ])
    });

    // Sensor scale runs the opposite way to the encoder's 1-100 scale.
    let encoder_quality = 100u8.saturating_sub(quality.min(63) * 3 / 2).max(1);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, encoder_quality)
        .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| SensorError::InitFailed(format!("JPEG encode failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::FrameSize;

    fn jpeg_config(frame_size: FrameSize, fb_count: u8) -> SensorConfig {
        SensorConfig {
            xclk_freq_hz: 20_000_000,
            pixel_format: PixelFormat::Jpeg,
            frame_size,
            jpeg_quality: frame_size.jpeg_quality(),
            fb_count,
        }
    }

    #[test]
    fn test_pool_exhaustion_returns_none() {
        let mut s = SimulatedSensor::new(OV2640).with_payload_len(1024);
        s.init(&jpeg_config(FrameSize::Vga, 2)).unwrap();

        let a = s.get_frame().unwrap();
        let _b = s.get_frame().unwrap();
        assert!(s.get_frame().is_none());

        s.return_frame(a);
        assert!(s.get_frame().is_some());
        assert_eq!(s.counters().frames_out, 3);
        assert_eq!(s.counters().frames_returned, 1);
    }

    #[test]
    fn test_get_frame_before_init_is_none() {
        let mut s = SimulatedSensor::new(OV2640);
        assert!(s.get_frame().is_none());
        assert!(s.sensor().is_none());
    }

    #[test]
    fn test_double_init_rejected() {
        let mut s = SimulatedSensor::new(OV2640).with_payload_len(16);
        let cfg = jpeg_config(FrameSize::Qvga, 1);
        s.init(&cfg).unwrap();
        assert!(matches!(s.init(&cfg), Err(SensorError::InitFailed(_))));
    }

    #[test]
    fn test_return_all_reclaims_outstanding() {
        let mut s = SimulatedSensor::new(OV3660).with_payload_len(16);
        s.init(&jpeg_config(FrameSize::Qvga, 2)).unwrap();
        let _a = s.get_frame().unwrap();
        let _b = s.get_frame().unwrap();
        s.return_all();
        assert_eq!(s.checked_out(), 0);
        assert_eq!(s.counters().frames_reclaimed, 2);
        assert_eq!(s.counters().outstanding(), 0);
    }

    #[test]
    fn test_frames_share_one_buffer() {
        let mut s = SimulatedSensor::new(OV2640).with_payload_len(64);
        s.init(&jpeg_config(FrameSize::Qvga, 2)).unwrap();
        let a = s.get_frame().unwrap();
        let b = s.get_frame().unwrap();
        assert_eq!(a.data().as_ptr(), b.data().as_ptr());
        assert_eq!(a.len(), 64);
        assert_eq!(&a.data()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encoded_pattern_is_jpeg() {
        let jpeg = encode_test_pattern(320, 240, 10).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_control_range_checked() {
        let mut c = SimControl::new(0x26);
        assert!(c.set_brightness(2).is_ok());
        assert!(c.set_saturation(-3).is_err());
        assert_eq!(c.saturation, 0);
    }

    #[test]
    fn test_payload_len_change_applies_on_next_init() {
        let mut s = SimulatedSensor::new(OV2640).with_payload_len(100);
        let cfg = jpeg_config(FrameSize::Qvga, 1);
        s.init(&cfg).unwrap();
        s.set_payload_len(Some(200));
        let f = s.get_frame().unwrap();
        assert_eq!(f.len(), 100);
        s.return_frame(f);

        s.deinit();
        s.init(&cfg).unwrap();
        let f = s.get_frame().unwrap();
        assert_eq!(f.len(), 200);
        s.return_frame(f);

        s.deinit();
        s.set_payload_len(None);
        s.init(&cfg).unwrap();
        let f = s.get_frame().unwrap();
        assert_ne!(f.len(), 200);
        assert_eq!(&f.data()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("0x3660"), Ok(0x3660));
        assert_eq!(parse_pid("0X26"), Ok(0x26));
        assert_eq!(parse_pid(" 155 "), Ok(0x9b));
        assert!(parse_pid("0xzz").is_err());
        assert!(parse_pid("0x10000").is_err());
        assert_eq!(parse_pid("0x232a").ok().and_then(model_for_pid), Some(GC032A));
    }

    #[test]
    fn test_sensor_info_for_known_and_unknown() {
        let s = SimulatedSensor::new(GC0308);
        let info = s.sensor_info(0x9b).unwrap();
        assert_eq!(info.name, "GC0308");
        assert!(!info.supports(PixelFormat::Jpeg));
        assert!(s.sensor_info(0x1234).is_none());
    }
}
