//! Boundary with the USB UVC class driver.
//!
//! The class driver owns enumeration, descriptors and endpoint transfers.
//! It calls into a [`UvcStreamHandler`] from its own task, one callback at a
//! time, and is set up once at boot through [`UvcDevice`].

use crate::capability::FormatCapabilities;
use crate::exchange::FrameDescriptor;
use crate::format::StreamRequest;
use crate::negotiation::NegotiationError;
use thiserror::Error;

/// Callbacks the class driver invokes while the host drives a stream.
///
/// Calls never overlap, and frame requests and releases strictly alternate.
pub trait UvcStreamHandler {
    /// Host committed a stream. An error aborts the stream start.
    fn on_stream_start(&mut self, request: &StreamRequest) -> Result<(), NegotiationError>;

    /// Next frame to send, or `None` to be polled again later.
    fn on_frame_request(&mut self) -> Option<FrameDescriptor>;

    /// Encoded bytes behind the frame last handed out.
    fn frame_data(&self, frame: &FrameDescriptor) -> Option<&[u8]>;

    /// The driver is done with the frame last handed out.
    fn on_frame_release(&mut self, frame: FrameDescriptor);

    /// Host stopped streaming.
    fn on_stream_stop(&mut self);
}

/// One-time registration of a UVC function.
pub struct DeviceConfig {
    /// Size of the driver's transfer buffer; no frame larger than this is
    /// ever handed over.
    pub buffer_size: usize,
    /// Formats and frames advertised in the descriptors.
    pub formats: &'static [FormatCapabilities],
    pub handler: Box<dyn UvcStreamHandler + Send>,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("UVC index {0} out of range")]
    InvalidIndex(u8),
    #[error("UVC index {0} already configured")]
    AlreadyConfigured(u8),
    #[error("UVC device not configured")]
    NotConfigured,
    #[error("UVC device already initialized")]
    AlreadyInitialized,
    #[error("transfer buffer must not be empty")]
    EmptyBuffer,
    #[error("no format advertised")]
    NoFormats,
    #[error("stream not started")]
    NotStreaming,
    #[error("stream rejected: {0}")]
    StreamRejected(#[from] NegotiationError),
    #[error("failed to spawn transport task: {0}")]
    Spawn(std::io::Error),
    #[error("transport task exited")]
    ChannelClosed,
}

/// Registration side of the class driver.
pub trait UvcDevice {
    /// Register the callbacks and transfer buffer for UVC function `index`.
    fn configure(&mut self, index: u8, config: DeviceConfig) -> Result<(), TransportError>;

    /// Start the USB stack. Called once, after every `configure`.
    fn init(&mut self) -> Result<(), TransportError>;
}
