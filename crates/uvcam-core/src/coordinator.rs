//! The object the class driver's callbacks land on.
//!
//! Owns the negotiated stream, the sensor lifecycle and the frame slot.
//! Built once at boot and handed to the transport.

use crate::capability::{FormatCapabilities, FORMATS};
use crate::config::CoordinatorConfig;
use crate::exchange::{ExchangeStats, FrameDescriptor, FrameExchange};
use crate::format::StreamRequest;
use crate::lifecycle::{ConfigureOutcome, SensorLifecycle};
use crate::negotiation::{self, NegotiatedParameters, NegotiationError};
use crate::transport::{DeviceConfig, UvcStreamHandler};
use uvcam_hw::CameraSensor;

pub struct Coordinator<S: CameraSensor> {
    sensor: S,
    config: CoordinatorConfig,
    formats: &'static [FormatCapabilities],
    negotiated: Option<NegotiatedParameters>,
    lifecycle: SensorLifecycle,
    exchange: FrameExchange<S::Frame>,
}

impl<S: CameraSensor> Coordinator<S> {
    pub fn new(sensor: S, config: CoordinatorConfig) -> Self {
        Self {
            sensor,
            config,
            formats: FORMATS,
            negotiated: None,
            lifecycle: SensorLifecycle::new(),
            exchange: FrameExchange::new(config.max_frame_bytes),
        }
    }

    /// Advertise a different descriptor set.
    pub fn with_formats(mut self, formats: &'static [FormatCapabilities]) -> Self {
        self.formats = formats;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn formats(&self) -> &'static [FormatCapabilities] {
        self.formats
    }

    /// Stream most recently accepted from the host. Set as soon as a request
    /// passes validation, even if the sensor then fails to come up.
    pub fn negotiated(&self) -> Option<&NegotiatedParameters> {
        self.negotiated.as_ref()
    }

    pub fn lifecycle(&self) -> &SensorLifecycle {
        &self.lifecycle
    }

    pub fn exchange_stats(&self) -> ExchangeStats {
        self.exchange.stats()
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Release the hardware. The coordinator can be started again afterwards.
    pub fn shutdown(&mut self) {
        self.exchange.abandon();
        self.lifecycle.teardown(&mut self.sensor);
    }

    /// Registration record for the class driver, consuming the coordinator.
    pub fn into_device_config(self) -> DeviceConfig
    where
        Self: Send + 'static,
    {
        DeviceConfig {
            buffer_size: self.config.max_frame_bytes,
            formats: self.formats,
            handler: Box::new(self),
        }
    }
}

impl<S: CameraSensor> UvcStreamHandler for Coordinator<S> {
    fn on_stream_start(&mut self, request: &StreamRequest) -> Result<(), NegotiationError> {
        let plan = match negotiation::plan_stream(request, self.formats, &self.config) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "stream request rejected");
                return Err(e);
            }
        };

        self.negotiated = Some(plan.params);

        tracing::info!(
            frame_size = %plan.sensor.frame_size,
            quality = plan.sensor.jpeg_quality,
            "initializing camera with MJPEG format"
        );

        if self.lifecycle.needs_teardown(&plan.sensor) {
            if let Some(stale) = self.exchange.abandon() {
                tracing::warn!(seq = stale.sequence, "frame still lent at reconfigure; reclaiming");
            }
        }

        match self.lifecycle.configure(&mut self.sensor, plan.sensor) {
            Ok(outcome) => {
                if outcome != ConfigureOutcome::Unchanged {
                    tracing::info!(?outcome, "camera ready");
                }
                self.exchange.reset_stats();
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "camera init failed");
                Err(e.into())
            }
        }
    }

    fn on_frame_request(&mut self) -> Option<FrameDescriptor> {
        self.exchange.acquire(&mut self.sensor)
    }

    fn frame_data(&self, frame: &FrameDescriptor) -> Option<&[u8]> {
        self.exchange.payload(frame)
    }

    fn on_frame_release(&mut self, frame: FrameDescriptor) {
        self.exchange.release(&mut self.sensor, frame);
    }

    fn on_stream_stop(&mut self) {
        let stats = self.exchange.stats();
        tracing::info!(
            delivered = stats.delivered,
            empty_polls = stats.empty_polls,
            oversized = stats.oversized,
            "camera stop"
        );
        if self.exchange.is_lent() {
            tracing::warn!("stream stopped with a frame still lent");
        }
    }
}
