//! Time source for polling and filename timestamps.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Supplies monotonic time, wall-clock time and sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic now, used for timeouts.
    fn now(&self) -> Instant;

    /// Local wall-clock time, used for output filenames.
    fn local_now(&self) -> chrono::DateTime<chrono::Local>;

    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real time via `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> chrono::DateTime<chrono::Local> {
        chrono::Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when slept on or advanced by hand.
///
/// `sleep` returns immediately after advancing, so polling loops run
/// without real delay.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    start_local: chrono::DateTime<chrono::Local>,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Starts at the current local time.
    pub fn new() -> Self {
        Self::starting_at(chrono::Local::now())
    }

    /// Starts at the given local time.
    pub fn starting_at(local: chrono::DateTime<chrono::Local>) -> Self {
        Self {
            start: Instant::now(),
            start_local: local,
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Moves time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    /// Total time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn local_now(&self) -> chrono::DateTime<chrono::Local> {
        let offset = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.start_local + offset
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.advance(duration);
    }
}
