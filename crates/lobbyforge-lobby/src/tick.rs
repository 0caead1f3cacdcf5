//! Fixed-rate tick scheduler for lobby actors.
//!
//! Sits inside the actor's `tokio::select!` loop next to the command
//! channel. Overruns skip ahead rather than bursting to catch up.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};

/// Drives one lobby's tick loop.
pub struct TickScheduler {
    tick_duration: Duration,
    tick_count: u64,
    next_tick: Instant,
}

impl TickScheduler {
    /// Creates a scheduler ticking at `tick_rate_hz` (at least 1 Hz).
    ///
    /// The first tick is delayed by a random amount up to `max_jitter` so
    /// lobbies created together don't tick in lockstep. Jitter is drawn in
    /// whole microseconds; anything below 1µs means no jitter.
    pub fn new(tick_rate_hz: u32, max_jitter: Duration) -> Self {
        let tick_duration = Duration::from_secs_f64(1.0 / tick_rate_hz.max(1) as f64);
        let max_jitter_us = u64::try_from(max_jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = if max_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..max_jitter_us))
        } else {
            Duration::ZERO
        };

        tracing::trace!(rate_hz = tick_rate_hz, ?jitter, "tick scheduler created");

        Self {
            tick_duration,
            tick_count: 0,
            next_tick: Instant::now() + tick_duration + jitter,
        }
    }

    /// Waits until the next tick is due and returns its number, starting
    /// at 1.
    pub async fn wait_for_tick(&mut self) -> u64 {
        time::sleep_until(self.next_tick).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(self.next_tick);

        self.tick_count += 1;
        let ticks_skipped = late_by.as_nanos() / self.tick_duration.as_nanos();
        if ticks_skipped > 0 {
            tracing::warn!(
                tick = self.tick_count,
                skipped = ticks_skipped as u64,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        // Always schedule from now, not from the missed deadline.
        self.next_tick = now + self.tick_duration;

        self.tick_count
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }
}
