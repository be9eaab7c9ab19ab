//! Rolling frame-rate measurement.
//!
//! The counter keeps the timestamps of recent frames and reports how many of
//! them fall inside the last window (one second by default). Producers on the
//! frame-delivery thread and readers on the presentation side share it through
//! a single mutex, so the append-evict-count sequence is never observed half
//! done.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default measurement window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Frames per second at the moment of the last recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameRateSnapshot {
    pub fps: u32,
}

impl FrameRateSnapshot {
    /// Whether the measured rate is within `tolerance` frames of `target`.
    pub fn meets(&self, target: u32, tolerance: u32) -> bool {
        self.fps.saturating_add(tolerance) >= target
    }
}

struct CounterState {
    events: VecDeque<Instant>,
    recorded: u64,
}

/// Thread-safe rolling count of events within the last window.
pub struct FrameRateCounter {
    window: Duration,
    state: Mutex<CounterState>,
}

impl Default for FrameRateCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRateCounter {
    pub fn new() -> Self {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(CounterState {
                events: VecDeque::new(),
                recorded: 0,
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record one event at `now`, evict everything older than `now - window`
    /// and return the resulting rate.
    pub fn record_event(&self, now: Instant) -> FrameRateSnapshot {
        let window = self.window;
        let mut state = self.lock();
        state.events.push_back(now);
        state.recorded += 1;
        // Concurrent producers can append slightly out of order, so a
        // front-only pop is not enough.
        state
            .events
            .retain(|&t| now.saturating_duration_since(t) <= window);
        FrameRateSnapshot {
            fps: state.events.len() as u32,
        }
    }

    /// Record one event at the current instant.
    pub fn record(&self) -> FrameRateSnapshot {
        self.record_event(Instant::now())
    }

    /// Number of stored events no older than `now - window`.
    pub fn rate_at(&self, now: Instant) -> u32 {
        let window = self.window;
        let state = self.lock();
        state
            .events
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) <= window)
            .count() as u32
    }

    pub fn current_rate(&self) -> u32 {
        self.rate_at(Instant::now())
    }

    pub fn snapshot(&self) -> FrameRateSnapshot {
        FrameRateSnapshot {
            fps: self.current_rate(),
        }
    }

    /// Total events recorded since creation or the last reset.
    pub fn recorded(&self) -> u64 {
        self.lock().recorded
    }

    pub fn reset(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.recorded = 0;
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
