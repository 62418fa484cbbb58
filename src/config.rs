//! Compile-time sizing for the control loop.

/// Command queue depth.
///
/// Large enough to absorb a burst of host bytes plus a tick's worth of slack.
/// With 256 entries the post-removal depth always fits in one status byte.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Status queue depth. Refilled at most once per tick, so it can be smaller.
pub const STATUS_QUEUE_CAPACITY: usize = 128;

/// Step period in microseconds (one motor step per period).
pub const TICK_PERIOD_US: u64 = 1024;

/// Interval between statistics heartbeats in the firmware log.
pub const HEARTBEAT_PERIOD_SECS: u64 = 60;
