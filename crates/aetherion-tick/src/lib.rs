//! Periodic clock for polling room deadlines.
//!
//! Rooms keep their lobby and countdown deadlines as plain data. Something
//! has to wake up and ask them whether a deadline has passed; that is this
//! crate. The clock only decides *when* to poll. What happens on a poll is
//! up to the caller:
//!
//! ```ignore
//! let mut clock = TickScheduler::with_rate(10);
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         _ = clock.wait_for_tick() => coordinator.lock().await.advance_rooms(Instant::now()),
//!     }
//! }
//! ```
//!
//! A rate of 0 disables the clock; [`TickScheduler::wait_for_tick`] then
//! pends forever, which keeps `select!` loops valid.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Clock configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Polls per second. 0 disables the clock.
    pub tick_rate_hz: u32,
    /// Random delay (0..max µs) added to the first tick only.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 0,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Caps the rate at [`Self::MAX_TICK_RATE_HZ`].
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self
    }

    /// Gap between ticks, or `None` when disabled.
    pub fn tick_duration(&self) -> Option<Duration> {
        (self.tick_rate_hz > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz)))
    }
}

/// Returned by each completed [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// `true` if this tick woke more than 10% of a period late.
    pub overrun: bool,
    /// Whole periods that were skipped because of the late wake-up.
    pub ticks_skipped: u64,
}

/// Fixed-rate wake-up clock with skip-ahead on overrun.
///
/// A late tick never triggers a burst of make-up ticks: the next tick is
/// scheduled one period after the late wake-up. Deadline consumers already
/// handle being polled late, so nothing is lost.
#[derive(Debug)]
pub struct TickScheduler {
    tick_duration: Option<Duration>,
    tick_count: u64,
    next_tick: Option<Instant>,
    total_skipped: u64,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let tick_duration = config.tick_duration();

        let next_tick = tick_duration.map(|d| {
            let jitter = if config.initial_jitter_us > 0 {
                Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
            } else {
                Duration::ZERO
            };
            Instant::now() + d + jitter
        });

        match tick_duration {
            Some(d) => debug!(rate_hz = config.tick_rate_hz, period_ms = d.as_millis() as u64, "tick clock created"),
            None => debug!("tick clock disabled"),
        }

        Self {
            tick_duration,
            tick_count: 0,
            next_tick,
            total_skipped: 0,
        }
    }

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Sleeps until the next tick is due. Pends forever when disabled.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (next, period) = match (self.next_tick, self.tick_duration) {
            (Some(next), Some(period)) => (next, period),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }
        self.total_skipped += ticks_skipped;
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, overrun, "tick fired");
        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.tick_duration.is_none()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    pub fn tick_duration(&self) -> Option<Duration> {
        self.tick_duration
    }
}
