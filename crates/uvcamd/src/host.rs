//! Host-side UVC transport.
//!
//! Stands in for the USB class driver: owns the registered stream handler on
//! a dedicated thread (the driver's task context), copies each lent frame
//! into the fixed transfer buffer, and gives it back. Requests arrive from
//! the async side over a channel, so callbacks never overlap.

use tokio::sync::{mpsc, oneshot};
use uvcam_core::{DeviceConfig, StreamRequest, TransportError, UvcDevice, UvcStreamHandler};

/// Only one UVC function is exposed.
const UVC_FUNCTIONS: u8 = 1;

/// What the host received for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub sequence: u64,
    pub len: usize,
    pub width: u32,
    pub height: u32,
    /// Payload starts with a JPEG SOI marker.
    pub jpeg: bool,
}

enum HostRequest {
    Start {
        request: StreamRequest,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Frame {
        reply: oneshot::Sender<Result<Option<FrameInfo>, TransportError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to the transport thread.
#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostRequest>,
}

impl HostHandle {
    /// Commit a stream, as a host does with a VS_COMMIT_CONTROL request.
    pub async fn start_stream(&self, request: StreamRequest) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostRequest::Start { request, reply }).await?;
        rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    /// Pull one frame through the transfer buffer. `Ok(None)` means no frame
    /// was ready.
    pub async fn request_frame(&self) -> Result<Option<FrameInfo>, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostRequest::Frame { reply }).await?;
        rx.await.map_err(|_| TransportError::ChannelClosed)?
    }

    pub async fn stop_stream(&self) -> Result<(), TransportError> {
        let (reply, rx) = oneshot::channel();
        self.send(HostRequest::Stop { reply }).await?;
        rx.await.map_err(|_| TransportError::ChannelClosed)
    }

    async fn send(&self, req: HostRequest) -> Result<(), TransportError> {
        self.tx.send(req).await.map_err(|_| TransportError::ChannelClosed)
    }
}

/// Registration front of the host transport.
#[derive(Default)]
pub struct HostLoop {
    pending: Option<DeviceConfig>,
    handle: Option<HostHandle>,
}

impl HostLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the running transport, once `init` has succeeded.
    pub fn handle(&self) -> Option<HostHandle> {
        self.handle.clone()
    }
}

impl UvcDevice for HostLoop {
    fn configure(&mut self, index: u8, config: DeviceConfig) -> Result<(), TransportError> {
        if index >= UVC_FUNCTIONS {
            return Err(TransportError::InvalidIndex(index));
        }
        if self.pending.is_some() || self.handle.is_some() {
            return Err(TransportError::AlreadyConfigured(index));
        }
        if config.buffer_size == 0 {
            return Err(TransportError::EmptyBuffer);
        }
        if config.formats.is_empty() {
            return Err(TransportError::NoFormats);
        }
        self.pending = Some(config);
        Ok(())
    }

    fn init(&mut self) -> Result<(), TransportError> {
        if self.handle.is_some() {
            return Err(TransportError::AlreadyInitialized);
        }
        let config = self.pending.take().ok_or(TransportError::NotConfigured)?;
        let (tx, rx) = mpsc::channel::<HostRequest>(4);

        std::thread::Builder::new()
            .name("uvc-transport".into())
            .spawn(move || run(config, rx))
            .map_err(TransportError::Spawn)?;

        self.handle = Some(HostHandle { tx });
        Ok(())
    }
}

fn run(config: DeviceConfig, mut rx: mpsc::Receiver<HostRequest>) {
    let DeviceConfig {
        buffer_size,
        mut handler,
        ..
    } = config;
    let mut buffer = vec![0u8; buffer_size];
    let mut streaming = false;

    tracing::info!(buffer_size, "transport thread started");
    while let Some(req) = rx.blocking_recv() {
        match req {
            HostRequest::Start { request, reply } => {
                if streaming {
                    handler.on_stream_stop();
                }
                let result = handler.on_stream_start(&request).map_err(TransportError::from);
                streaming = result.is_ok();
                let _ = reply.send(result);
            }
            HostRequest::Frame { reply } => {
                let result = if streaming {
                    Ok(transfer(handler.as_mut(), &mut buffer))
                } else {
                    Err(TransportError::NotStreaming)
                };
                let _ = reply.send(result);
            }
            HostRequest::Stop { reply } => {
                if streaming {
                    handler.on_stream_stop();
                    streaming = false;
                }
                let _ = reply.send(());
            }
        }
    }
    if streaming {
        handler.on_stream_stop();
    }
    tracing::info!("transport thread exiting");
}

/// One get / copy / return cycle.
fn transfer(handler: &mut (dyn UvcStreamHandler + Send), buffer: &mut [u8]) -> Option<FrameInfo> {
    let frame = handler.on_frame_request()?;

    let copied = match handler.frame_data(&frame) {
        Some(data) if data.len() <= buffer.len() => {
            buffer[..data.len()].copy_from_slice(data);
            Some(data.len())
        }
        Some(data) => {
            tracing::error!(len = data.len(), capacity = buffer.len(), "frame overflows transfer buffer");
            None
        }
        None => {
            tracing::error!(seq = frame.sequence, "handler lost the lent frame");
            None
        }
    };
    handler.on_frame_release(frame);

    let len = copied?;
    tracing::trace!(seq = frame.sequence, len, "frame sent");
    Some(FrameInfo {
        sequence: frame.sequence,
        len,
        width: frame.width,
        height: frame.height,
        jpeg: buffer[..len].starts_with(&[0xFF, 0xD8]),
    })
}
