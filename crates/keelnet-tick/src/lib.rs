//! Fixed-rate clock for the Keelnet server pump.
//!
//! The server does its application work in ticks: each tick drains the
//! shared receive queue into the dispatcher, then flushes every
//! connection's send queue. [`TickScheduler`] decides when a tick starts
//! and keeps a few counters about how long the work took.
//!
//! A late wake-up never triggers a burst of catch-up ticks. The missed
//! periods are counted as skipped and the next deadline is one period
//! after *now*. A pump that fell behind catches up by draining more in
//! one tick.
//!
//! ```ignore
//! let mut clock = TickScheduler::new(TickConfig::with_rate(1000));
//! loop {
//!     clock.wait_for_tick().await;
//!     pump_once();
//!     clock.end_tick();
//! }
//! ```

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second, `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    /// Upper bound (µs) of a random delay before the first tick.
    pub initial_jitter_us: u64,
    /// A tick whose work takes at least this share of the period is
    /// logged as slow. `0.0..=1.0`.
    pub budget_warn_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1000,
            initial_jitter_us: 0,
            budget_warn_threshold: 0.8,
        }
    }
}

impl TickConfig {
    pub const MAX_TICK_RATE_HZ: u32 = 10_000;

    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Self::default()
        }
    }

    /// Clamps the rate and threshold into range.
    pub fn validated(self) -> Self {
        let hz = self.tick_rate_hz.clamp(1, Self::MAX_TICK_RATE_HZ);
        if hz != self.tick_rate_hz {
            tracing::warn!(requested = self.tick_rate_hz, used = hz, "tick rate out of range");
        }
        Self {
            tick_rate_hz: hz,
            initial_jitter_us: self.initial_jitter_us,
            budget_warn_threshold: self.budget_warn_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

/// What [`TickScheduler::wait_for_tick`] reports about the tick it started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1 for the first tick.
    pub number: u64,
    /// Woke more than a tenth of a period after the deadline.
    pub overrun: bool,
    /// Whole periods that went by without a tick.
    pub skipped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub fired: u64,
    pub late: u64,
    pub skipped_total: u64,
    pub longest_work: Duration,
    /// Work time over period, for the last finished tick.
    pub last_load: f64,
}

pub struct TickScheduler {
    config: TickConfig,
    period: Duration,
    deadline: TokioInstant,
    ticks: u64,
    started: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let period = config.period();
        let jitter = if config.initial_jitter_us == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        };

        tracing::debug!(
            hz = config.tick_rate_hz,
            period_us = period.as_micros() as u64,
            jitter_us = jitter.as_micros() as u64,
            "tick clock ready"
        );

        Self {
            config,
            period,
            deadline: TokioInstant::now() + period + jitter,
            ticks: 0,
            started: None,
            stats: TickStats::default(),
        }
    }

    /// Sleeps until the next deadline, then starts timing the tick's work.
    pub async fn wait_for_tick(&mut self) -> Tick {
        let deadline = self.deadline;
        time::sleep_until(deadline).await;

        let woke = TokioInstant::now();
        let late_by = woke.saturating_duration_since(deadline);
        let overrun = late_by > self.period / 10;
        let skipped = if overrun {
            (late_by.as_nanos() / self.period.as_nanos()) as u64
        } else {
            0
        };

        self.deadline = woke + self.period;
        self.ticks += 1;
        self.started = Some(Instant::now());

        self.stats.fired += 1;
        self.stats.skipped_total += skipped;
        if overrun {
            self.stats.late += 1;
            tracing::debug!(tick = self.ticks, skipped, "late tick");
        }

        Tick {
            number: self.ticks,
            overrun,
            skipped,
        }
    }

    /// Stops the work timer started by `wait_for_tick`. Does nothing if no
    /// tick is in progress.
    pub fn end_tick(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let work = started.elapsed();
        let load = work.as_secs_f64() / self.period.as_secs_f64();

        self.stats.last_load = load;
        self.stats.longest_work = self.stats.longest_work.max(work);
        if load >= self.config.budget_warn_threshold {
            tracing::warn!(
                tick = self.ticks,
                work_us = work.as_micros() as u64,
                period_us = self.period.as_micros() as u64,
                "slow tick"
            );
        }
    }

    pub fn ticks_fired(&self) -> u64 {
        self.ticks
    }

    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }
}
