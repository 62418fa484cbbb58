//! Step period edge.
//!
//! The control loop polls a [`TickSource`] instead of blocking on it. A tick is
//! a single bit: it reads as elapsed once the period has passed and stays that
//! way until acknowledged. It is not a counter, so a loop that stalls for
//! several periods sees one tick, not several.

/// Periodic edge polled by the control loop.
pub trait TickSource {
    /// `true` once the current period has elapsed and has not been acknowledged.
    fn has_elapsed(&self) -> bool;

    /// Clear the elapsed edge. A no-op when the tick has not elapsed.
    fn acknowledge(&mut self);
}

/// Free-running microsecond time base.
pub trait Clock {
    fn now_micros(&self) -> u64;
}

/// [`TickSource`] that elapses every `period_us` on a [`Clock`].
///
/// Deadlines advance on a fixed grid anchored at construction, so
/// acknowledgement jitter does not accumulate into drift. When the loop
/// falls more than one period behind, the deadline jumps to the next grid
/// point in the future and the skipped periods are lost.
pub struct PeriodicTick<C: Clock> {
    clock: C,
    period_us: u64,
    deadline_us: u64,
}

impl<C: Clock> PeriodicTick<C> {
    /// Start a tick whose first period ends `period_us` from now.
    ///
    /// # Arguments
    ///
    /// * `clock` - Time base to poll
    /// * `period_us` - Period length in microseconds; zero is treated as one
    pub fn new(clock: C, period_us: u64) -> Self {
        let period_us = period_us.max(1);
        let deadline_us = clock.now_micros().saturating_add(period_us);
        Self {
            clock,
            period_us,
            deadline_us,
        }
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    /// Time at which the current period ends.
    pub fn deadline_us(&self) -> u64 {
        self.deadline_us
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock> TickSource for PeriodicTick<C> {
    fn has_elapsed(&self) -> bool {
        self.clock.now_micros() >= self.deadline_us
    }

    fn acknowledge(&mut self) {
        let now = self.clock.now_micros();
        if now < self.deadline_us {
            return;
        }

        // Whole periods that ended at or before `now`
        let passed = (now - self.deadline_us) / self.period_us + 1;
        if passed > 1 {
            trace!("tick: {} periods missed", passed - 1);
        }
        self.deadline_us = self
            .deadline_us
            .saturating_add(passed.saturating_mul(self.period_us));
    }
}
