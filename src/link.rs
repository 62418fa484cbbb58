//! Nonblocking byte link to the USB host.
//!
//! The control loop never waits on the host. It asks for one byte and gets one
//! or nothing, and it offers one byte and is told whether the link took it.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::pipe::Pipe;

/// The link could not accept a byte right now; try again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WouldBlock;

/// Unframed byte stream to and from the host.
pub trait HostLink {
    /// Take the next byte the host sent, if one is waiting.
    fn try_receive_byte(&mut self) -> Option<u8>;

    /// Hand one byte to the link for delivery to the host.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The link accepted the byte
    /// * `Err(WouldBlock)` - The link is not ready; the byte was not taken
    fn try_send_byte(&mut self, byte: u8) -> Result<(), WouldBlock>;
}

/// [`HostLink`] over a pair of byte pipes.
///
/// Async tasks on the other side of the pipes move USB packets in and out;
/// the control loop only ever touches the pipes with `try_*` calls. While the
/// inbound pipe is full its writer stalls, which leaves the host's data in the
/// USB endpoint and pushes backpressure all the way to the host.
pub struct PipeLink<'p, M: RawMutex, const IN: usize, const OUT: usize> {
    inbound: &'p Pipe<M, IN>,
    outbound: &'p Pipe<M, OUT>,
}

impl<'p, M: RawMutex, const IN: usize, const OUT: usize> PipeLink<'p, M, IN, OUT> {
    /// # Arguments
    ///
    /// * `inbound` - Bytes from the host, filled by the USB OUT pump
    /// * `outbound` - Bytes for the host, drained by the USB IN pump
    pub const fn new(inbound: &'p Pipe<M, IN>, outbound: &'p Pipe<M, OUT>) -> Self {
        Self { inbound, outbound }
    }
}

impl<M: RawMutex, const IN: usize, const OUT: usize> HostLink for PipeLink<'_, M, IN, OUT> {
    fn try_receive_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.inbound.try_read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn try_send_byte(&mut self, byte: u8) -> Result<(), WouldBlock> {
        match self.outbound.try_write(&[byte]) {
            Ok(1) => Ok(()),
            _ => Err(WouldBlock),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use std::collections::VecDeque;

    /// Scripted link: bytes queued in `incoming` are received one per call,
    /// sends are accepted while `accept` has credit.
    #[derive(Debug, Default)]
    pub(crate) struct FakeLink {
        pub incoming: VecDeque<u8>,
        pub sent: Vec<u8>,
        /// Sends still accepted before `WouldBlock`; `None` accepts everything
        pub accept: Option<usize>,
        pub send_attempts: usize,
        pub receive_attempts: usize,
    }

    impl FakeLink {
        pub(crate) fn with_incoming(bytes: &[u8]) -> Self {
            Self {
                incoming: bytes.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl HostLink for FakeLink {
        fn try_receive_byte(&mut self) -> Option<u8> {
            self.receive_attempts += 1;
            self.incoming.pop_front()
        }

        fn try_send_byte(&mut self, byte: u8) -> Result<(), WouldBlock> {
            self.send_attempts += 1;
            match self.accept {
                Some(0) => Err(WouldBlock),
                Some(ref mut credit) => {
                    *credit -= 1;
                    self.sent.push(byte);
                    Ok(())
                }
                None => {
                    self.sent.push(byte);
                    Ok(())
                }
            }
        }
    }

    #[test]
    fn pipe_link_receives_one_byte_at_a_time() {
        let inbound: Pipe<NoopRawMutex, 8> = Pipe::new();
        let outbound: Pipe<NoopRawMutex, 8> = Pipe::new();
        inbound.try_write(&[0x11, 0x22]).unwrap();

        let mut link = PipeLink::new(&inbound, &outbound);
        assert_eq!(link.try_receive_byte(), Some(0x11));
        assert_eq!(link.try_receive_byte(), Some(0x22));
        assert_eq!(link.try_receive_byte(), None);
    }

    #[test]
    fn pipe_link_reports_would_block_when_outbound_is_full() {
        let inbound: Pipe<NoopRawMutex, 4> = Pipe::new();
        let outbound: Pipe<NoopRawMutex, 2> = Pipe::new();

        let mut link = PipeLink::new(&inbound, &outbound);
        assert_eq!(link.try_send_byte(1), Ok(()));
        assert_eq!(link.try_send_byte(2), Ok(()));
        assert_eq!(link.try_send_byte(3), Err(WouldBlock));

        let mut drained = [0u8; 4];
        assert_eq!(outbound.try_read(&mut drained).unwrap(), 2);
        assert_eq!(&drained[..2], &[1, 2]);
        assert_eq!(link.try_send_byte(3), Ok(()));
    }

    #[test]
    fn pipe_link_leaves_unread_bytes_in_the_pipe() {
        let inbound: Pipe<NoopRawMutex, 4> = Pipe::new();
        let outbound: Pipe<NoopRawMutex, 4> = Pipe::new();
        inbound.try_write(&[9, 8, 7]).unwrap();

        let mut link = PipeLink::new(&inbound, &outbound);
        assert_eq!(link.try_receive_byte(), Some(9));
        assert_eq!(inbound.len(), 2);
    }
}
