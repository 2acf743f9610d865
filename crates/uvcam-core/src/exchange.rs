//! Single-buffered frame hand-off between the sensor pool and the transport.
//!
//! At most one sensor buffer is lent to the transport at a time. The
//! transport sees a [`FrameDescriptor`] and reads the bytes straight out of
//! the sensor buffer through [`FrameExchange::payload`]; nothing is copied
//! on this side.

use crate::format::UvcFormat;
use serde::Serialize;
use std::time::Duration;
use uvcam_hw::{CameraSensor, SensorFrame};

/// Transport-facing view of the outstanding frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    /// Identifies this lend; a release must present the same value.
    pub sequence: u64,
    pub len: usize,
    pub width: u32,
    pub height: u32,
    pub format: UvcFormat,
    pub timestamp: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeStats {
    pub delivered: u64,
    /// Requests made while the sensor had nothing ready.
    pub empty_polls: u64,
    /// Frames dropped for not fitting the transport buffer.
    pub oversized: u64,
}

struct Lent<F> {
    descriptor: FrameDescriptor,
    frame: F,
}

pub struct FrameExchange<F> {
    lent: Option<Lent<F>>,
    next_sequence: u64,
    max_frame_bytes: usize,
    stats: ExchangeStats,
}

impl<F: SensorFrame> FrameExchange<F> {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            lent: None,
            next_sequence: 1,
            max_frame_bytes,
            stats: ExchangeStats::default(),
        }
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ExchangeStats::default();
    }

    pub fn is_lent(&self) -> bool {
        self.lent.is_some()
    }

    /// Take the next ready frame from the sensor and lend it out.
    ///
    /// `None` means "try again later": either nothing was ready or the frame
    /// was too large for the transport buffer and went straight back to the
    /// pool.
    ///
    /// # Panics
    ///
    /// If the previous frame has not been released.
    pub fn acquire<S>(&mut self, sensor: &mut S) -> Option<FrameDescriptor>
    where
        S: CameraSensor<Frame = F>,
    {
        assert!(
            self.lent.is_none(),
            "frame acquired while sequence {} is still lent",
            self.lent.as_ref().map_or(0, |l| l.descriptor.sequence)
        );

        let Some(frame) = sensor.get_frame() else {
            self.stats.empty_polls += 1;
            return None;
        };

        if frame.len() > self.max_frame_bytes {
            tracing::error!(
                len = frame.len(),
                max = self.max_frame_bytes,
                "frame size is larger than max frame size"
            );
            sensor.return_frame(frame);
            self.stats.oversized += 1;
            return None;
        }

        let descriptor = FrameDescriptor {
            sequence: self.next_sequence,
            len: frame.len(),
            width: frame.width(),
            height: frame.height(),
            format: UvcFormat::from_pixel_format(frame.format()),
            timestamp: frame.timestamp(),
        };
        self.next_sequence += 1;
        self.stats.delivered += 1;
        tracing::trace!(seq = descriptor.sequence, len = descriptor.len, "frame lent");

        self.lent = Some(Lent { descriptor, frame });
        Some(descriptor)
    }

    /// Bytes of the lent frame, or `None` if `descriptor` is not the one
    /// currently lent.
    pub fn payload(&self, descriptor: &FrameDescriptor) -> Option<&[u8]> {
        self.lent
            .as_ref()
            .filter(|l| l.descriptor == *descriptor)
            .map(|l| l.frame.data())
    }

    /// Return the lent frame to the sensor pool.
    ///
    /// # Panics
    ///
    /// If `descriptor` is not the frame returned by the latest `acquire`.
    /// That is a bug in the caller, never a runtime condition.
    pub fn release<S>(&mut self, sensor: &mut S, descriptor: FrameDescriptor)
    where
        S: CameraSensor<Frame = F>,
    {
        match self.lent.take() {
            Some(lent) if lent.descriptor == descriptor => {
                tracing::trace!(seq = descriptor.sequence, "frame returned");
                sensor.return_frame(lent.frame);
            }
            Some(lent) => panic!(
                "released frame {} does not match lent frame {}",
                descriptor.sequence, lent.descriptor.sequence
            ),
            None => panic!(
                "released frame {} but no frame is lent",
                descriptor.sequence
            ),
        }
    }

    /// Forget the lent frame without returning it. Only valid when the sensor
    /// is about to reclaim every buffer itself.
    pub fn abandon(&mut self) -> Option<FrameDescriptor> {
        self.lent.take().map(|l| l.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uvcam_hw::sim::{self, SimFrame, SimulatedSensor};
    use uvcam_hw::{FrameSize, PixelFormat, SensorConfig};

    const MAX: usize = 75 * 1024;

    fn running(payload_len: usize) -> SimulatedSensor {
        let mut s = SimulatedSensor::new(sim::OV2640).with_payload_len(payload_len);
        s.init(&SensorConfig {
            xclk_freq_hz: 20_000_000,
            pixel_format: PixelFormat::Jpeg,
            frame_size: FrameSize::Vga,
            jpeg_quality: 12,
            fb_count: 2,
        })
        .unwrap();
        s
    }

    #[test]
    fn test_acquire_release_cycle() {
        let mut s = running(4096);
        let mut x = FrameExchange::<SimFrame>::new(MAX);

        let d = x.acquire(&mut s).unwrap();
        assert_eq!(d.len, 4096);
        assert_eq!((d.width, d.height), (640, 480));
        assert_eq!(d.format, UvcFormat::Mjpeg);
        assert_eq!(x.payload(&d).unwrap().len(), 4096);

        x.release(&mut s, d);
        assert_eq!(s.counters().frames_returned, 1);
        assert_eq!(s.counters().outstanding(), 0);
        assert!(!x.is_lent());
    }

    #[test]
    fn test_payload_aliases_sensor_buffer() {
        let mut s = running(128);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let d = x.acquire(&mut s).unwrap();
        let probe = s.get_frame().unwrap();
        assert_eq!(x.payload(&d).unwrap().as_ptr(), probe.data().as_ptr());
        s.return_frame(probe);
        x.release(&mut s, d);
    }

    #[test]
    fn test_no_frame_ready() {
        let mut s = running(128);
        s.set_starved(true);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        assert!(x.acquire(&mut s).is_none());
        assert!(x.acquire(&mut s).is_none());
        assert_eq!(x.stats().empty_polls, 2);
        assert_eq!(s.counters().frames_returned, 0);
    }

    #[test]
    fn test_oversized_frame_dropped_and_returned_once() {
        let mut s = running(MAX + 1);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        assert!(x.acquire(&mut s).is_none());
        assert_eq!(s.counters().frames_out, 1);
        assert_eq!(s.counters().frames_returned, 1);
        assert_eq!(x.stats().oversized, 1);
        assert!(!x.is_lent());
    }

    #[test]
    fn test_frame_exactly_max_is_delivered() {
        let mut s = running(MAX);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let d = x.acquire(&mut s).unwrap();
        assert_eq!(d.len, MAX);
        x.release(&mut s, d);
    }

    #[test]
    fn test_sequences_advance() {
        let mut s = running(64);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let a = x.acquire(&mut s).unwrap();
        x.release(&mut s, a);
        let b = x.acquire(&mut s).unwrap();
        assert_eq!(b.sequence, a.sequence + 1);
        assert!(x.payload(&a).is_none());
        x.release(&mut s, b);
        assert_eq!(x.stats().delivered, 2);
    }

    #[test]
    #[should_panic(expected = "does not match lent frame")]
    fn test_stale_release_panics() {
        let mut s = running(64);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let a = x.acquire(&mut s).unwrap();
        x.release(&mut s, a);
        let _b = x.acquire(&mut s).unwrap();
        x.release(&mut s, a);
    }

    #[test]
    #[should_panic(expected = "no frame is lent")]
    fn test_double_release_panics() {
        let mut s = running(64);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let a = x.acquire(&mut s).unwrap();
        x.release(&mut s, a);
        x.release(&mut s, a);
    }

    #[test]
    #[should_panic(expected = "still lent")]
    fn test_second_acquire_panics() {
        let mut s = running(64);
        let mut x = FrameExchange::<SimFrame>::new(MAX);
        let _a = x.acquire(&mut s).unwrap();
        let _ = x.acquire(&mut s);
    }
}
