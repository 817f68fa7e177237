//! Integration tests for the pump clock.
//!
//! Every async test runs with `start_paused = true`: Tokio's clock only
//! moves when all tasks are idle, so `sleep_until` deadlines resolve
//! instantly and deterministically.

use std::time::Duration;

use keelnet_tick::{TickConfig, TickScheduler};

fn no_jitter(rate: u32) -> TickConfig {
    TickConfig {
        initial_jitter_us: 0,
        ..TickConfig::with_rate(rate)
    }
}

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::new(no_jitter(20));
    assert_eq!(s.ticks_fired(), 0);
    assert_eq!(s.tick_rate_hz(), 20);
    assert_eq!(s.period(), Duration::from_millis(50));
    assert_eq!(s.stats().fired, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_numbers_from_one() {
    let mut s = TickScheduler::new(no_jitter(20));
    let first = s.wait_for_tick().await;
    let second = s.wait_for_tick().await;

    assert_eq!(first.number, 1);
    assert_eq!(second.number, 2);
    assert!(!first.overrun);
    assert_eq!(s.ticks_fired(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_respects_period() {
    let mut s = TickScheduler::new(no_jitter(20));
    let start = tokio::time::Instant::now();

    for _ in 0..5 {
        s.wait_for_tick().await;
    }

    assert_eq!(start.elapsed(), Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_skips_instead_of_bursting() {
    let mut s = TickScheduler::new(no_jitter(20));
    s.wait_for_tick().await;

    // Stall for three and a half periods.
    tokio::time::advance(Duration::from_millis(175)).await;
    let late = s.wait_for_tick().await;
    assert!(late.overrun);
    assert_eq!(late.skipped, 2);

    // The next tick is one full period after the late one, not immediate.
    let before = tokio::time::Instant::now();
    let next = s.wait_for_tick().await;
    assert!(!next.overrun);
    assert_eq!(before.elapsed(), Duration::from_millis(50));

    assert_eq!(s.stats().late, 1);
    assert_eq!(s.stats().skipped_total, 2);
}

#[tokio::test(start_paused = true)]
async fn test_end_tick_updates_utilization() {
    let mut s = TickScheduler::new(no_jitter(20));
    s.wait_for_tick().await;
    s.end_tick();

    assert!(s.stats().last_load >= 0.0);
    assert_eq!(s.stats().fired, 1);
}

#[test]
fn test_end_tick_without_tick_is_noop() {
    let mut s = TickScheduler::new(no_jitter(20));
    s.end_tick();
    assert_eq!(s.stats().longest_work, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_tick_within_bound() {
    let cfg = TickConfig {
        initial_jitter_us: 5_000,
        ..TickConfig::with_rate(100)
    };
    let mut s = TickScheduler::new(cfg);
    let start = tokio::time::Instant::now();
    s.wait_for_tick().await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(10));
    assert!(elapsed < Duration::from_millis(15));
}
