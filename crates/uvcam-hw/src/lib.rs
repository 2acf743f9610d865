//! uvcam-hw: Camera sensor boundary for the UVC bridge.
//!
//! Defines the driver interface the coordinator calls, the per-sensor
//! quirks database, and a simulated sensor for host-side runs.

pub mod quirks;
pub mod sensor;
pub mod sim;

pub use quirks::{apply_corrections, lookup_quirk, Corrections};
pub use sensor::{
    CameraSensor, FrameSize, PixelFormat, SensorConfig, SensorControl, SensorError, SensorFrame,
    SensorInfo,
};
pub use sim::SimulatedSensor;
