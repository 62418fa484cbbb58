//! Step tick time base.
//!
//! The embassy time driver (TIM2 at 1 MHz) already gives a monotonic
//! microsecond counter, so the step tick is a [`PeriodicTick`] on top of it
//! rather than a second hardware timer.

use embassy_time::Instant;
use etch_rs::config::TICK_PERIOD_US;
use etch_rs::{Clock, PeriodicTick};

/// Microsecond clock backed by `embassy_time`.
#[derive(Debug, Clone, Copy)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

/// Tick that elapses once per motor step period.
pub fn step_tick() -> PeriodicTick<EmbassyClock> {
    PeriodicTick::new(EmbassyClock, TICK_PERIOD_US)
}
