//! Frame output: the frame-delivery side of a capture session.
//!
//! A session calls [`FrameOutput::deliver`] from its delivery thread for every
//! captured buffer. The output forwards the frame to the consumer, records the
//! frame in the rate counter and posts the new rate to the presentation task.
//! Nothing else happens on this path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::presenter::Presenter;
use crate::rate::{FrameRateCounter, FrameRateSnapshot};

/// One captured frame handed to the downstream consumer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data as delivered by the device
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Position of the frame within its session, starting at 0
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Downstream consumer of captured frames. Called on the frame-delivery
/// thread, so implementations must return quickly.
pub trait FrameConsumer: Send + Sync {
    fn on_frame(&self, frame: &Frame);
}

impl<F> FrameConsumer for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn on_frame(&self, frame: &Frame) {
        self(frame)
    }
}

/// Delivery counters shared across session instances of one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Frames forwarded to the consumer
    pub frames_delivered: u64,
    /// Frames that arrived while the output was detached
    pub frames_discarded: u64,
}

#[derive(Default)]
pub(crate) struct StatsInner {
    frames_delivered: AtomicU64,
    frames_discarded: AtomicU64,
}

impl StatsInner {
    pub(crate) fn to_stats(&self) -> CaptureStats {
        CaptureStats {
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Everything a live output needs to route a frame.
pub(crate) struct Delivery {
    pub(crate) consumer: Arc<dyn FrameConsumer>,
    pub(crate) counter: Arc<FrameRateCounter>,
    pub(crate) presenter: Presenter,
    pub(crate) epoch: u64,
    pub(crate) target_fps: u32,
    pub(crate) rate_tolerance: u32,
}

struct OutputShared {
    delivery: RwLock<Option<Delivery>>,
    sequence: AtomicU64,
    next_rate_check: Mutex<Option<Instant>>,
    stats: Arc<StatsInner>,
}

/// Frame sink attached to a capture session.
///
/// Cloned into the platform session; all clones share one gate. While the
/// gate is closed every delivered buffer is discarded.
#[derive(Clone)]
pub struct FrameOutput {
    shared: Arc<OutputShared>,
}

impl FrameOutput {
    pub(crate) fn new(stats: Arc<StatsInner>) -> Self {
        Self {
            shared: Arc::new(OutputShared {
                delivery: RwLock::new(None),
                sequence: AtomicU64::new(0),
                next_rate_check: Mutex::new(None),
                stats,
            }),
        }
    }

    /// Open the gate and start routing frames.
    pub(crate) fn open(&self, delivery: Delivery) {
        let first_check = Instant::now() + delivery.counter.window();
        *self
            .shared
            .next_rate_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(first_check);
        *self
            .shared
            .delivery
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(delivery);
    }

    /// Close the gate. Blocks until any in-flight delivery has finished, so
    /// no consumer callback runs after this returns.
    pub(crate) fn close(&self) {
        self.shared
            .delivery
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_open(&self) -> bool {
        self.shared
            .delivery
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Hand one captured buffer to the pipeline. Returns `false` when the
    /// frame was discarded because the output is detached.
    pub fn deliver(&self, data: Bytes, width: u32, height: u32) -> bool {
        let guard = self
            .shared
            .delivery
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(delivery) = guard.as_ref() else {
            self.shared
                .stats
                .frames_discarded
                .fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let now = Instant::now();
        let frame = Frame {
            data,
            width,
            height,
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
            captured_at: now,
        };
        trace!("Delivering frame {} ({}x{})", frame.sequence, width, height);

        delivery.consumer.on_frame(&frame);
        let snapshot = delivery.counter.record_event(now);
        self.shared
            .stats
            .frames_delivered
            .fetch_add(1, Ordering::Relaxed);
        delivery.presenter.rate_updated(delivery.epoch, snapshot.fps);

        self.check_rate(delivery, snapshot, now);
        true
    }

    /// Warn at most once per window when the measured rate falls short.
    fn check_rate(&self, delivery: &Delivery, snapshot: FrameRateSnapshot, now: Instant) {
        let mut next = self
            .shared
            .next_rate_check
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *next {
            Some(at) if now >= at => {
                *next = Some(now + delivery.counter.window());
                if !snapshot.meets(delivery.target_fps, delivery.rate_tolerance) {
                    warn!(
                        "Capture rate degraded: fps={} < target {}",
                        snapshot.fps, delivery.target_fps
                    );
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::NoopObserver;
    use tokio_util::sync::CancellationToken;

    fn delivery(consumer: Arc<dyn FrameConsumer>, counter: Arc<FrameRateCounter>) -> Delivery {
        Delivery {
            consumer,
            counter,
            presenter: Presenter::spawn(Arc::new(NoopObserver), CancellationToken::new()),
            epoch: 0,
            target_fps: 30,
            rate_tolerance: 2,
        }
    }

    #[tokio::test]
    async fn test_closed_output_discards_frames() {
        let stats = Arc::new(StatsInner::default());
        let output = FrameOutput::new(Arc::clone(&stats));

        assert!(!output.is_open());
        assert!(!output.deliver(Bytes::from_static(b"frame"), 2, 2));
        assert_eq!(stats.to_stats().frames_discarded, 1);
        assert_eq!(stats.to_stats().frames_delivered, 0);
    }

    #[tokio::test]
    async fn test_open_output_forwards_and_counts() {
        let stats = Arc::new(StatsInner::default());
        let output = FrameOutput::new(Arc::clone(&stats));
        let counter = Arc::new(FrameRateCounter::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let consumer = move |frame: &Frame| sink.lock().unwrap().push(frame.sequence);
        output.open(delivery(Arc::new(consumer), Arc::clone(&counter)));

        assert!(output.deliver(Bytes::from_static(b"a"), 2, 2));
        assert!(output.deliver(Bytes::from_static(b"b"), 2, 2));

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(counter.recorded(), 2);
        assert_eq!(stats.to_stats().frames_delivered, 2);

        output.close();
        assert!(!output.deliver(Bytes::from_static(b"c"), 2, 2));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_check_with_unbounded_tolerance() {
        let stats = Arc::new(StatsInner::default());
        let output = FrameOutput::new(Arc::clone(&stats));
        let counter = Arc::new(FrameRateCounter::new());
        let mut lenient = delivery(Arc::new(|_: &Frame| {}), Arc::clone(&counter));
        lenient.rate_tolerance = u32::MAX;
        output.open(lenient);

        let now = Instant::now();
        *output.shared.next_rate_check.lock().unwrap() = Some(now);
        let guard = output.shared.delivery.read().unwrap();
        let active = guard.as_ref().unwrap();
        output.check_rate(active, FrameRateSnapshot { fps: 1 }, now);
        drop(guard);

        assert!(output.deliver(Bytes::from_static(b"a"), 2, 2));
        assert_eq!(stats.to_stats().frames_delivered, 1);
    }
}
