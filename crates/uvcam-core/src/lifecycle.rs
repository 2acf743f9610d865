//! Sensor bring-up and reconfiguration.
//!
//! Tracks the configuration the hardware is running with so a host that
//! re-commits the same stream does not pay for a full sensor reinit.

use uvcam_hw::{
    apply_corrections, CameraSensor, PixelFormat, SensorConfig, SensorControl, SensorError,
};

/// What `configure` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureOutcome {
    /// Already running with this config.
    Unchanged,
    /// First bring-up.
    Initialized,
    /// Torn down a different config and brought this one up.
    Reconfigured,
}

#[derive(Debug, Default)]
pub struct SensorLifecycle {
    active: Option<SensorConfig>,
    teardowns: u32,
    inits: u32,
}

impl SensorLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// Config the hardware is currently running with.
    pub fn active(&self) -> Option<&SensorConfig> {
        self.active.as_ref()
    }

    /// Successful hardware initializations so far.
    pub fn inits(&self) -> u32 {
        self.inits
    }

    /// Teardowns of a running configuration so far.
    pub fn teardowns(&self) -> u32 {
        self.teardowns
    }

    /// Whether bringing up `config` would tear down the running sensor.
    pub fn needs_teardown(&self, config: &SensorConfig) -> bool {
        matches!(&self.active, Some(active) if active != config)
    }

    /// Bring the sensor up with `config`, reinitializing only if it differs
    /// from what is already running.
    ///
    /// On failure the sensor is left uninitialized. No retry.
    pub fn configure<S: CameraSensor>(
        &mut self,
        sensor: &mut S,
        config: SensorConfig,
    ) -> Result<ConfigureOutcome, SensorError> {
        let outcome = match self.active {
            Some(active) if active == config => {
                tracing::debug!("camera already initialized");
                return Ok(ConfigureOutcome::Unchanged);
            }
            Some(_) => {
                self.teardown(sensor);
                tracing::info!("camera RESTART");
                ConfigureOutcome::Reconfigured
            }
            None => ConfigureOutcome::Initialized,
        };

        Self::bring_up(sensor, &config)?;
        self.active = Some(config);
        self.inits += 1;
        Ok(outcome)
    }

    /// Reclaim every checked-out buffer, then release the hardware.
    pub fn teardown<S: CameraSensor>(&mut self, sensor: &mut S) {
        if self.active.take().is_some() {
            sensor.return_all();
            sensor.deinit();
            self.teardowns += 1;
        }
    }

    fn bring_up<S: CameraSensor>(sensor: &mut S, config: &SensorConfig) -> Result<(), SensorError> {
        sensor.init(config)?;

        match Self::post_init(sensor, config) {
            Ok(()) => Ok(()),
            Err(e) => {
                // The driver came up but cannot serve this stream; release it
                // so the next negotiation starts from a clean init.
                sensor.deinit();
                Err(e)
            }
        }
    }

    fn post_init<S: CameraSensor>(sensor: &mut S, config: &SensorConfig) -> Result<(), SensorError> {
        let control = sensor.sensor().ok_or(SensorError::NoSensor)?;
        let quirk = apply_corrections(control)?;
        let product_id = control.product_id();

        let info = sensor.sensor_info(product_id);
        let name = info.as_ref().map_or("unknown", |i| i.name.as_str());
        tracing::info!(
            sensor = name,
            pid = %format!("{product_id:#x}"),
            quirk = quirk.is_some(),
            "camera sensor"
        );

        let jpeg = info.as_ref().is_some_and(|i| i.supports(PixelFormat::Jpeg));
        if config.pixel_format != PixelFormat::Jpeg || !jpeg {
            tracing::error!(sensor = name, "JPEG format is not supported");
            return Err(SensorError::FormatNotSupported(PixelFormat::Jpeg));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uvcam_hw::sim::{self, SimulatedSensor};
    use uvcam_hw::FrameSize;

    fn cfg(frame_size: FrameSize) -> SensorConfig {
        SensorConfig {
            xclk_freq_hz: 20_000_000,
            pixel_format: PixelFormat::Jpeg,
            frame_size,
            jpeg_quality: frame_size.jpeg_quality(),
            fb_count: 2,
        }
    }

    fn sensor() -> SimulatedSensor {
        SimulatedSensor::new(sim::OV2640).with_payload_len(256)
    }

    #[test]
    fn test_first_configure_initializes() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        assert_eq!(lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap(), ConfigureOutcome::Initialized);
        assert!(lc.is_initialized());
        assert_eq!(s.counters().inits, 1);
        assert_eq!(s.counters().deinits, 0);
    }

    #[test]
    fn test_same_config_is_noop() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap();
        assert_eq!(lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap(), ConfigureOutcome::Unchanged);
        assert_eq!(s.counters().inits, 1);
        assert_eq!(lc.teardowns(), 0);
    }

    #[test]
    fn test_any_field_change_reconfigures() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        let base = cfg(FrameSize::Vga);
        lc.configure(&mut s, base).unwrap();

        let changed = SensorConfig { jpeg_quality: 20, ..base };
        assert!(lc.needs_teardown(&changed));
        assert_eq!(lc.configure(&mut s, changed).unwrap(), ConfigureOutcome::Reconfigured);
        assert_eq!(lc.teardowns(), 1);
        assert_eq!(s.counters().inits, 2);
        assert_eq!(s.counters().deinits, 1);
    }

    #[test]
    fn test_reconfigure_drains_buffers_before_deinit() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap();
        let _held = s.get_frame().unwrap();
        let _held2 = s.get_frame().unwrap();

        lc.configure(&mut s, cfg(FrameSize::Hd)).unwrap();
        let c = s.counters();
        assert_eq!(c.return_alls, 1);
        assert_eq!(c.frames_reclaimed, 2);
        assert_eq!(c.deinits_with_outstanding, 0);
    }

    #[test]
    fn test_quirks_applied_after_init() {
        let mut s = SimulatedSensor::new(sim::OV3660).with_payload_len(64);
        let mut lc = SensorLifecycle::new();
        lc.configure(&mut s, cfg(FrameSize::Qvga)).unwrap();
        let c = s.controls().unwrap();
        assert!(c.vflip);
        assert_eq!(c.brightness, 1);
        assert_eq!(c.saturation, -2);
    }

    #[test]
    fn test_init_failure_leaves_uninitialized() {
        let mut s = sensor();
        s.fail_next_init("SCCB timeout");
        let mut lc = SensorLifecycle::new();
        let err = lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap_err();
        assert!(matches!(err, SensorError::InitFailed(_)));
        assert!(!lc.is_initialized());

        // Not sticky: the next attempt goes through.
        assert_eq!(lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap(), ConfigureOutcome::Initialized);
    }

    #[test]
    fn test_sensor_without_jpeg_fails() {
        let mut s = SimulatedSensor::new(sim::GC0308).with_payload_len(64);
        let mut lc = SensorLifecycle::new();
        let err = lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap_err();
        assert_eq!(err, SensorError::FormatNotSupported(PixelFormat::Jpeg));
        assert!(!lc.is_initialized());
        // Hardware released so a later init is not refused as a double init.
        assert_eq!(s.counters().deinits, 1);
        assert!(s.active_config().is_none());
    }

    #[test]
    fn test_non_jpeg_config_fails() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        let raw = SensorConfig { pixel_format: PixelFormat::Yuv422, ..cfg(FrameSize::Qvga) };
        assert_eq!(
            lc.configure(&mut s, raw).unwrap_err(),
            SensorError::FormatNotSupported(PixelFormat::Jpeg)
        );
    }

    #[test]
    fn test_failed_reconfigure_after_success() {
        let mut s = sensor();
        let mut lc = SensorLifecycle::new();
        lc.configure(&mut s, cfg(FrameSize::Vga)).unwrap();
        s.fail_next_init("brownout");
        assert!(lc.configure(&mut s, cfg(FrameSize::Hd)).is_err());
        assert!(!lc.is_initialized());
        assert_eq!(lc.teardowns(), 1);
    }
}
