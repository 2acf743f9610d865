//! Sensor quirks database.
//!
//! Maps a sensor product ID to the image corrections it needs right after
//! init (flip, mirror, brightness, saturation). Quirk files are embedded at
//! compile time from `contrib/sensors/*.toml`.

use crate::sensor::{SensorControl, SensorError};
use serde::Deserialize;
use std::sync::OnceLock;

const QUIRK_OV3660: &str = include_str!("../../../contrib/sensors/ov3660.toml");
const QUIRK_OV2640: &str = include_str!("../../../contrib/sensors/ov2640.toml");
const QUIRK_GC0308: &str = include_str!("../../../contrib/sensors/gc0308.toml");
const QUIRK_GC032A: &str = include_str!("../../../contrib/sensors/gc032a.toml");

static QUIRK_DB: OnceLock<Vec<QuirkFile>> = OnceLock::new();

/// One `contrib/sensors/*.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct QuirkFile {
    pub sensor: SensorId,
    #[serde(default)]
    pub corrections: Corrections,
}

/// Identification fields from the `[sensor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorId {
    pub product_id: u16,
    pub name: String,
}

/// Post-init adjustments from the `[corrections]` section.
///
/// Unset fields leave the driver default alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Corrections {
    pub vflip: Option<bool>,
    pub hmirror: Option<bool>,
    pub brightness: Option<i8>,
    pub saturation: Option<i8>,
}

impl Corrections {
    /// Applied to every sensor before its own quirk: the reference camera
    /// boards mount the sensor upside down.
    pub const BASELINE: Corrections = Corrections {
        vflip: Some(true),
        hmirror: None,
        brightness: None,
        saturation: None,
    };

    pub fn apply<C: SensorControl + ?Sized>(&self, control: &mut C) -> Result<(), SensorError> {
        if let Some(level) = self.brightness {
            control.set_brightness(level)?;
        }
        if let Some(level) = self.saturation {
            control.set_saturation(level)?;
        }
        if let Some(enable) = self.vflip {
            control.set_vflip(enable)?;
        }
        if let Some(enable) = self.hmirror {
            control.set_hmirror(enable)?;
        }
        Ok(())
    }
}

fn quirk_db() -> &'static Vec<QuirkFile> {
    QUIRK_DB.get_or_init(|| {
        let mut db = Vec::new();
        for src in [QUIRK_OV3660, QUIRK_OV2640, QUIRK_GC0308, QUIRK_GC032A] {
            match toml::from_str::<QuirkFile>(src) {
                Ok(q) => db.push(q),
                Err(e) => tracing::error!(error = %e, "bad sensor quirk TOML"),
            }
        }
        db
    })
}

/// Look up a quirk by sensor product ID.
pub fn lookup_quirk(product_id: u16) -> Option<&'static QuirkFile> {
    quirk_db().iter().find(|q| q.sensor.product_id == product_id)
}

/// List all known quirks.
pub fn list_quirks() -> &'static [QuirkFile] {
    quirk_db()
}

/// Apply the baseline corrections plus whatever the sensor's quirk asks for.
///
/// Returns the quirk that matched, if any.
pub fn apply_corrections<C: SensorControl + ?Sized>(
    control: &mut C,
) -> Result<Option<&'static QuirkFile>, SensorError> {
    Corrections::BASELINE.apply(control)?;

    let quirk = lookup_quirk(control.product_id());
    if let Some(q) = quirk {
        tracing::debug!(sensor = %q.sensor.name, corrections = ?q.corrections, "applying sensor quirk");
        q.corrections.apply(control)?;
    }
    Ok(quirk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        pid: u16,
        calls: Vec<String>,
    }

    impl SensorControl for Recorder {
        fn product_id(&self) -> u16 {
            self.pid
        }
        fn set_vflip(&mut self, enable: bool) -> Result<(), SensorError> {
            self.calls.push(format!("vflip={enable}"));
            Ok(())
        }
        fn set_hmirror(&mut self, enable: bool) -> Result<(), SensorError> {
            self.calls.push(format!("hmirror={enable}"));
            Ok(())
        }
        fn set_brightness(&mut self, level: i8) -> Result<(), SensorError> {
            self.calls.push(format!("brightness={level}"));
            Ok(())
        }
        fn set_saturation(&mut self, level: i8) -> Result<(), SensorError> {
            self.calls.push(format!("saturation={level}"));
            Ok(())
        }
    }

    fn run(pid: u16) -> Vec<String> {
        let mut r = Recorder { pid, ..Default::default() };
        apply_corrections(&mut r).unwrap();
        r.calls
    }

    #[test]
    fn test_all_embedded_quirks_parse() {
        let names: Vec<_> = list_quirks().iter().map(|q| q.sensor.name.as_str()).collect();
        assert_eq!(names, vec!["OV3660", "OV2640", "GC0308", "GC032A"]);
    }

    #[test]
    fn test_ov3660_corrections() {
        assert_eq!(
            run(0x3660),
            vec!["vflip=true", "brightness=1", "saturation=-2", "vflip=true"]
        );
    }

    #[test]
    fn test_ov2640_corrections() {
        assert_eq!(run(0x26), vec!["vflip=true", "vflip=true"]);
    }

    #[test]
    fn test_gc0308_clears_mirror() {
        assert_eq!(run(0x9b), vec!["vflip=true", "hmirror=false"]);
    }

    #[test]
    fn test_gc032a_corrections() {
        assert_eq!(run(0x232a), vec!["vflip=true", "vflip=true"]);
    }

    #[test]
    fn test_unknown_sensor_gets_baseline_only() {
        let mut r = Recorder { pid: 0x5640, ..Default::default() };
        let quirk = apply_corrections(&mut r).unwrap();
        assert!(quirk.is_none());
        assert_eq!(r.calls, vec!["vflip=true"]);
    }

    #[test]
    fn test_control_failure_propagates() {
        struct Broken;
        impl SensorControl for Broken {
            fn product_id(&self) -> u16 {
                0x26
            }
            fn set_vflip(&mut self, _: bool) -> Result<(), SensorError> {
                Err(SensorError::ControlFailed("SCCB write".into()))
            }
            fn set_hmirror(&mut self, _: bool) -> Result<(), SensorError> {
                Ok(())
            }
            fn set_brightness(&mut self, _: i8) -> Result<(), SensorError> {
                Ok(())
            }
            fn set_saturation(&mut self, _: i8) -> Result<(), SensorError> {
                Ok(())
            }
        }
        assert!(apply_corrections(&mut Broken).is_err());
    }
}
