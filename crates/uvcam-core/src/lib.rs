//! uvcam-core: Negotiation and frame-lifecycle coordinator for a UVC webcam.
//!
//! Sits between the USB class driver and the camera sensor driver: accepts
//! or refuses the stream the host commits, brings the sensor up with
//! matching settings, and lends encoded frames to the transport one at a
//! time.

pub mod capability;
pub mod config;
pub mod coordinator;
pub mod exchange;
pub mod format;
pub mod lifecycle;
pub mod negotiation;
pub mod transport;

pub use capability::{FormatCapabilities, FrameCapability, FORMATS, MJPEG_FRAMES};
pub use config::{CoordinatorConfig, Target};
pub use coordinator::Coordinator;
pub use exchange::{ExchangeStats, FrameDescriptor};
pub use format::{frame_interval, StreamRequest, UvcFormat};
pub use negotiation::{NegotiatedParameters, NegotiationError};
pub use transport::{DeviceConfig, TransportError, UvcDevice, UvcStreamHandler};
