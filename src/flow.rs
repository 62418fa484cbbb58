//! The step control loop.
//!
//! [`FlowController::poll`] is called forever from the firmware main loop. Each
//! call runs three stages in a fixed order, sharing the two queues:
//!
//! 1. **Ingress** - pull at most one byte from the host into the command queue,
//!    but only if the queue has room. A full queue leaves the byte with the
//!    link, so nothing the controller accepted is ever dropped.
//! 2. **Step** - on an elapsed tick, acknowledge it first, then pop one command,
//!    drive the motors with it and record the remaining command depth as a
//!    status byte. A full status queue drops the new sample instead.
//! 3. **Egress** - push status bytes to the host in FIFO order until the link
//!    stops accepting. The byte that was refused stays at the front.
//!
//! Nothing here blocks, so one poll costs a bounded amount of time.

use crate::config::{COMMAND_QUEUE_CAPACITY, STATUS_QUEUE_CAPACITY};
use crate::link::HostLink;
use crate::motor::{MotorSink, StepCommand};
use crate::queue::ByteQueue;
use crate::tick::TickSource;

/// What a single [`FlowController::poll`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Iteration {
    /// A host byte was moved into the command queue
    pub received: bool,
    /// The command that drove the motors on this tick
    pub stepped: Option<StepCommand>,
    /// Status byte generated on this tick, whether or not it was queued
    pub status: Option<u8>,
    /// Status bytes delivered to the link
    pub sent: usize,
}

/// Running totals since start-up, for the heartbeat log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlowStats {
    pub ticks: u32,
    pub bytes_received: u32,
    pub steps: u32,
    pub statuses_dropped: u32,
    pub bytes_sent: u32,
    pub send_stalls: u32,
}

/// Owns the queues and the three collaborators of the step loop.
///
/// `CMD` and `STATUS` are the command and status queue capacities.
///
/// # Example
///
/// ```rust,ignore
/// let mut flow: FlowController<_, _, _> = FlowController::new(link, tick, motors);
/// loop {
///     flow.poll();
///     embassy_futures::yield_now().await;
/// }
/// ```
pub struct FlowController<
    L,
    T,
    M,
    const CMD: usize = COMMAND_QUEUE_CAPACITY,
    const STATUS: usize = STATUS_QUEUE_CAPACITY,
> {
    link: L,
    tick: T,
    motors: M,
    commands: ByteQueue<CMD>,
    status: ByteQueue<STATUS>,
    stats: FlowStats,
}

impl<L, T, M, const CMD: usize, const STATUS: usize> FlowController<L, T, M, CMD, STATUS>
where
    L: HostLink,
    T: TickSource,
    M: MotorSink,
{
    /// Create a controller with both queues empty.
    pub fn new(link: L, tick: T, motors: M) -> Self {
        Self {
            link,
            tick,
            motors,
            commands: ByteQueue::new(),
            status: ByteQueue::new(),
            stats: FlowStats::default(),
        }
    }

    /// Run one loop iteration: ingress, tick-gated step, egress.
    pub fn poll(&mut self) -> Iteration {
        let mut iteration = Iteration {
            received: self.ingress(),
            ..Iteration::default()
        };

        if let Some((step, status)) = self.step() {
            iteration.stepped = Some(step);
            iteration.status = Some(status);
        }

        iteration.sent = self.egress();
        iteration
    }

    /// Pull at most one host byte into the command queue.
    ///
    /// Returns `true` if a byte was queued. The link is not asked at all while
    /// the command queue is full.
    pub fn ingress(&mut self) -> bool {
        if self.commands.is_full() {
            return false;
        }

        let Some(byte) = self.link.try_receive_byte() else {
            return false;
        };

        // Room was checked above, so this cannot hand the byte back
        if self.commands.insert(byte).is_err() {
            warn!("flow: command queue rejected byte {}", byte);
            return false;
        }
        self.stats.bytes_received = self.stats.bytes_received.wrapping_add(1);
        true
    }

    /// Handle the tick edge, if it has elapsed.
    ///
    /// Returns the command that was stepped and the status sample taken for it.
    /// No tick, or a tick with an empty command queue, returns `None` and the
    /// motors keep their last pattern.
    pub fn step(&mut self) -> Option<(StepCommand, u8)> {
        if !self.tick.has_elapsed() {
            return None;
        }
        self.tick.acknowledge();
        self.stats.ticks = self.stats.ticks.wrapping_add(1);

        let step = StepCommand(self.commands.remove()?);
        self.motors.drive(step);
        self.stats.steps = self.stats.steps.wrapping_add(1);

        // Depth left after the pop, so the host sees how far ahead it is
        let status = u8::try_from(self.commands.len()).unwrap_or(u8::MAX);
        if self.status.insert(status).is_err() {
            self.stats.statuses_dropped = self.stats.statuses_dropped.wrapping_add(1);
            trace!("flow: status queue full, dropped depth {}", status);
        }

        Some((step, status))
    }

    /// Send queued status bytes until the link refuses one.
    ///
    /// Returns how many bytes were delivered. A refused byte stays at the front
    /// of the status queue for the next call.
    pub fn egress(&mut self) -> usize {
        let mut sent = 0;

        while let Some(byte) = self.status.peek() {
            if self.link.try_send_byte(byte).is_err() {
                self.stats.send_stalls = self.stats.send_stalls.wrapping_add(1);
                break;
            }
            self.status.remove();
            sent += 1;
        }

        self.stats.bytes_sent = self.stats.bytes_sent.wrapping_add(sent as u32);
        sent
    }

    /// Queued, not yet stepped commands.
    pub fn command_queue(&self) -> &ByteQueue<CMD> {
        &self.commands
    }

    /// Status bytes waiting for the link.
    pub fn status_queue(&self) -> &ByteQueue<STATUS> {
        &self.status
    }

    pub fn stats(&self) -> FlowStats {
        self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn tick(&self) -> &T {
        &self.tick
    }

    pub fn motors(&self) -> &M {
        &self.motors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::tests::FakeLink;
    use crate::motor::tests::FakePort;
    use crate::motor::MotorOutputs;
    use crate::tick::tests::FakeClock;
    use crate::tick::PeriodicTick;

    /// Tick that is raised by hand.
    #[derive(Debug, Default)]
    struct ManualTick {
        elapsed: bool,
        acknowledged: usize,
    }

    impl TickSource for ManualTick {
        fn has_elapsed(&self) -> bool {
            self.elapsed
        }

        fn acknowledge(&mut self) {
            if self.elapsed {
                self.acknowledged += 1;
            }
            self.elapsed = false;
        }
    }

    /// Records every step it is driven with.
    #[derive(Debug, Default)]
    struct RecordingMotors {
        steps: Vec<u8>,
    }

    impl MotorSink for RecordingMotors {
        fn drive(&mut self, step: StepCommand) {
            self.steps.push(step.0);
        }
    }

    type TestFlow<const CMD: usize, const STATUS: usize> =
        FlowController<FakeLink, ManualTick, RecordingMotors, CMD, STATUS>;

    fn flow<const CMD: usize, const STATUS: usize>(incoming: &[u8]) -> TestFlow<CMD, STATUS> {
        FlowController::new(
            FakeLink::with_incoming(incoming),
            ManualTick::default(),
            RecordingMotors::default(),
        )
    }

    fn raise_tick<const CMD: usize, const STATUS: usize>(flow: &mut TestFlow<CMD, STATUS>) {
        flow.tick.elapsed = true;
    }

    /// Pull every pending host byte into the command queue without ticking.
    fn fill<const CMD: usize, const STATUS: usize>(flow: &mut TestFlow<CMD, STATUS>) {
        while flow.ingress() {}
    }

    #[test]
    fn ingress_moves_one_byte_per_call() {
        let mut flow: TestFlow<4, 4> = flow(&[0x11, 0x22]);

        assert!(flow.ingress());
        assert_eq!(flow.command_queue().len(), 1);
        assert!(flow.ingress());
        assert!(!flow.ingress());
        assert_eq!(flow.command_queue().len(), 2);
    }

    #[test]
    fn full_command_queue_leaves_bytes_at_the_link() {
        let mut flow: TestFlow<4, 4> = flow(&[1, 2, 3, 4, 5, 6]);
        fill(&mut flow);
        assert!(flow.command_queue().is_full());

        let attempts = flow.link().receive_attempts;
        assert!(!flow.ingress());
        assert_eq!(flow.link().receive_attempts, attempts);
        assert_eq!(flow.link().incoming.front(), Some(&5));
        assert_eq!(flow.command_queue().len(), 4);

        // Room opens up after a step and the pending byte is taken next
        raise_tick(&mut flow);
        flow.step();
        assert!(flow.ingress());
        assert_eq!(flow.link().incoming.front(), Some(&6));
    }

    #[test]
    fn no_tick_means_no_step() {
        let mut flow: TestFlow<4, 4> = flow(&[0x11]);
        fill(&mut flow);

        assert_eq!(flow.step(), None);
        assert!(flow.motors().steps.is_empty());
        assert_eq!(flow.command_queue().len(), 1);
    }

    #[test]
    fn tick_steps_exactly_one_command() {
        let mut flow: TestFlow<8, 8> = flow(&[0x11, 0x22, 0x33]);
        fill(&mut flow);

        raise_tick(&mut flow);
        assert_eq!(flow.step(), Some((StepCommand(0x11), 2)));
        assert_eq!(flow.motors().steps, [0x11]);
        assert_eq!(flow.tick().acknowledged, 1);
        assert!(!flow.tick().has_elapsed());
    }

    #[test]
    fn status_is_the_depth_after_removal() {
        let mut flow: TestFlow<8, 8> = flow(&[1, 2, 3, 4, 5]);
        fill(&mut flow);
        let depth = flow.command_queue().len();

        raise_tick(&mut flow);
        let (_, status) = flow.step().unwrap();
        assert_eq!(status as usize, depth - 1);
        assert_eq!(flow.status_queue().peek(), Some(4));
    }

    #[test]
    fn empty_tick_is_acknowledged_without_status() {
        let mut flow: TestFlow<4, 4> = flow(&[]);

        raise_tick(&mut flow);
        assert_eq!(flow.step(), None);
        assert_eq!(flow.tick().acknowledged, 1);
        assert!(flow.status_queue().is_empty());
        assert_eq!(flow.stats().ticks, 1);
        assert_eq!(flow.stats().steps, 0);
    }

    #[test]
    fn steps_drive_the_ports_in_order_and_keep_foreign_bits() {
        let clock = FakeClock::default();
        let mut flow: FlowController<_, _, _, 4, 4> = FlowController::new(
            FakeLink::with_incoming(&[0x00, 0x5A, 0xFF]),
            PeriodicTick::new(clock.clone(), 1024),
            MotorOutputs::new(FakePort::with_value(0xC0), FakePort::with_value(0x03)),
        );
        for _ in 0..3 {
            flow.ingress();
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            clock.advance(1024);
            let iteration = flow.poll();
            let (motor1, motor2) = flow.motors().ports();
            seen.push((iteration.stepped, motor1.value, motor2.value));
        }

        assert_eq!(
            seen,
            [
                (Some(StepCommand(0x00)), 0xC0, 0x03),
                (Some(StepCommand(0x5A)), 0xCA, 0x53),
                (Some(StepCommand(0xFF)), 0xCF, 0xF3),
            ]
        );
    }

    #[test]
    fn full_status_queue_drops_the_new_sample() {
        let mut flow: TestFlow<8, 2> = flow(&[1, 2, 3, 4]);
        fill(&mut flow);
        flow.link_mut().accept = Some(0);

        for _ in 0..3 {
            raise_tick(&mut flow);
            flow.poll();
        }

        // Steps still happen; only the third status sample is lost
        assert_eq!(flow.motors().steps, [1, 2, 3]);
        assert_eq!(flow.status_queue().len(), 2);
        assert_eq!(flow.status_queue().peek(), Some(3));
        assert_eq!(flow.stats().statuses_dropped, 1);
    }

    #[test]
    fn egress_stops_at_first_refused_send() {
        let mut flow: TestFlow<8, 8> = flow(&[1, 2, 3, 4, 5]);
        fill(&mut flow);
        for _ in 0..4 {
            raise_tick(&mut flow);
            flow.step();
        }
        assert_eq!(flow.status_queue().len(), 4);

        // Third send is refused
        flow.link_mut().accept = Some(2);
        assert_eq!(flow.egress(), 2);
        assert_eq!(flow.link().sent, [4, 3]);
        assert_eq!(flow.link().send_attempts, 3);
        assert_eq!(flow.status_queue().len(), 2);
        assert_eq!(flow.status_queue().peek(), Some(2));

        // Retried on the next call, still in order
        flow.link_mut().accept = None;
        assert_eq!(flow.egress(), 2);
        assert_eq!(flow.link().sent, [4, 3, 2, 1]);
        assert!(flow.status_queue().is_empty());
        assert_eq!(flow.stats().send_stalls, 1);
    }

    #[test]
    fn egress_runs_without_a_tick() {
        let mut flow: TestFlow<4, 4> = flow(&[7, 8]);
        fill(&mut flow);
        flow.link_mut().accept = Some(0);
        raise_tick(&mut flow);
        flow.poll();
        assert_eq!(flow.status_queue().len(), 1);

        flow.link_mut().accept = None;
        let iteration = flow.poll();
        assert_eq!(iteration.stepped, None);
        assert_eq!(iteration.sent, 1);
        assert_eq!(flow.link().sent, [1]);
    }

    #[test]
    fn two_commands_then_idle_tick() {
        let mut flow: TestFlow<4, 4> = flow(&[]);
        flow.link_mut().incoming.extend([0x11, 0x22]);
        flow.link_mut().accept = Some(0);
        fill(&mut flow);

        raise_tick(&mut flow);
        let first = flow.poll();
        assert_eq!(first.stepped, Some(StepCommand(0x11)));
        assert_eq!(first.status, Some(1));

        raise_tick(&mut flow);
        let second = flow.poll();
        assert_eq!(second.stepped, Some(StepCommand(0x22)));
        assert_eq!(second.status, Some(0));

        raise_tick(&mut flow);
        let third = flow.poll();
        assert_eq!(third.stepped, None);
        assert_eq!(third.status, None);

        assert_eq!(flow.motors().steps, [0x11, 0x22]);
        assert_eq!(flow.status_queue().len(), 2);
        assert_eq!(flow.status_queue().peek(), Some(1));
    }

    #[test]
    fn poll_orders_ingress_before_step() {
        // A byte arriving in the same iteration as the tick is stepped immediately
        let mut flow: TestFlow<4, 4> = flow(&[0x42]);
        raise_tick(&mut flow);

        let iteration = flow.poll();
        assert!(iteration.received);
        assert_eq!(iteration.stepped, Some(StepCommand(0x42)));
        assert_eq!(iteration.status, Some(0));
        assert_eq!(iteration.sent, 1);
        assert_eq!(flow.link().sent, [0]);
    }

    #[test]
    fn status_saturates_for_deep_command_queues() {
        let bytes: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut flow: TestFlow<300, 4> = flow(&bytes);
        fill(&mut flow);
        assert_eq!(flow.command_queue().len(), 300);

        raise_tick(&mut flow);
        assert_eq!(flow.step().map(|(_, status)| status), Some(u8::MAX));
    }

    #[test]
    fn reference_capacity_status_fits_in_a_byte() {
        let bytes = [0xAA; COMMAND_QUEUE_CAPACITY];
        let mut flow: TestFlow<COMMAND_QUEUE_CAPACITY, STATUS_QUEUE_CAPACITY> = flow(&bytes);
        fill(&mut flow);
        assert!(flow.command_queue().is_full());

        raise_tick(&mut flow);
        assert_eq!(flow.step(), Some((StepCommand(0xAA), 255)));
    }

    #[test]
    fn stats_track_traffic() {
        let mut flow: TestFlow<4, 4> = flow(&[1, 2]);
        for _ in 0..2 {
            raise_tick(&mut flow);
            flow.poll();
        }

        let stats = flow.stats();
        assert_eq!(stats.bytes_received, 2);
        assert_eq!(stats.steps, 2);
        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.bytes_sent, 2);
        assert_eq!(stats.send_stalls, 0);
    }
}
