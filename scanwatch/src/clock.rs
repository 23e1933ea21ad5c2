//! Time source for the scheduler.
//!
//! The scheduler never reads the wall clock or sleeps directly; it goes
//! through [`Clock`] so cycles can be driven in tests without real waiting.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Injected time source.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current instant in the exchange time zone.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Suspend for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Utc::now` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: FixedOffset,
}

impl SystemClock {
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.zone)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock.
///
/// `sleep` returns immediately, advances the current instant by the
/// requested duration, and records it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Jump to a specific instant.
    pub fn set(&self, instant: DateTime<FixedOffset>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    /// Durations passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        if let Ok(mut now) = self.now.lock() {
            if let Ok(step) = chrono::Duration::from_std(duration) {
                *now = *now + step;
            }
        }
    }
}
