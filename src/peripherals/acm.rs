//! CDC ACM (virtual serial port) bridge between the USB endpoints and the step loop.
//!
//! The USB side is packet based and async; the step loop wants single bytes
//! without ever waiting. Two pipes sit in between:
//!
//! - [`command_task`] reads OUT packets and writes them into [`COMMAND_PIPE`].
//!   When the pipe is full it stops reading, the endpoint NAKs and the host
//!   is held off.
//! - [`status_task`] drains [`STATUS_PIPE`] into IN packets.
//!
//! The step loop reaches both pipes through a [`PipeLink`].

use defmt::{info, warn};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, pipe::Pipe};
pub use embassy_usb::class::cdc_acm::State;
use embassy_usb::{
    class::cdc_acm::{CdcAcmClass, Receiver, Sender},
    driver::EndpointError,
    Builder,
};
use etch_rs::PipeLink;
use static_cell::StaticCell;

use super::usb_system::{UsbDriver, MAX_PACKET_SIZE};

/// Host-to-device buffer, one full OUT packet deep.
pub const COMMAND_PIPE_SIZE: usize = MAX_PACKET_SIZE as usize;
/// Device-to-host buffer for status bytes.
pub const STATUS_PIPE_SIZE: usize = 64;

pub static COMMAND_PIPE: Pipe<CriticalSectionRawMutex, COMMAND_PIPE_SIZE> = Pipe::new();
pub static STATUS_PIPE: Pipe<CriticalSectionRawMutex, STATUS_PIPE_SIZE> = Pipe::new();

/// Host link used by the step loop.
pub type AcmLink = PipeLink<'static, CriticalSectionRawMutex, COMMAND_PIPE_SIZE, STATUS_PIPE_SIZE>;

pub static ACM_STATE: StaticCell<State<'static>> = StaticCell::new();

/// Peripheral collection for ACM interface
pub struct AcmClaims<'d> {
    pub acm_state: &'d mut State<'d>,
}

/// Macro to claim the CDC ACM state
#[macro_export]
macro_rules! claim_acm {
    () => {{
        $crate::peripherals::acm::AcmClaims {
            acm_state: $crate::peripherals::acm::ACM_STATE.init(embassy_usb::class::cdc_acm::State::new()),
        }
    }};
}

/// Error indicating USB connection was disconnected.
#[derive(Debug, Clone, Copy)]
pub struct Disconnected;

impl From<EndpointError> for Disconnected {
    fn from(error: EndpointError) -> Self {
        match error {
            EndpointError::BufferOverflow => panic!("USB buffer overflow"),
            EndpointError::Disabled => Disconnected,
        }
    }
}

/// The CDC ACM class, not yet split into its pumping halves.
pub struct AcmBridge {
    class: CdcAcmClass<'static, UsbDriver>,
}

impl AcmBridge {
    /// Register the CDC ACM interface with the USB builder.
    ///
    /// # Arguments
    ///
    /// * `builder` - USB device builder, before `build()`
    /// * `claims` - AcmClaims struct containing ACM state
    pub fn new(builder: &mut Builder<'static, UsbDriver>, claims: AcmClaims<'static>) -> Self {
        info!("CDC ACM interface registered");
        Self {
            class: CdcAcmClass::new(builder, claims.acm_state, MAX_PACKET_SIZE),
        }
    }

    /// Byte-level view of the pipes for the step loop.
    pub fn link(&self) -> AcmLink {
        PipeLink::new(&COMMAND_PIPE, &STATUS_PIPE)
    }

    /// Split into the IN half (for [`status_task`]) and OUT half (for [`command_task`]).
    pub fn split(self) -> (Sender<'static, UsbDriver>, Receiver<'static, UsbDriver>) {
        self.class.split()
    }
}

/// Move OUT packets from the host into [`COMMAND_PIPE`], reconnecting forever.
#[embassy_executor::task]
pub async fn command_task(mut receiver: Receiver<'static, UsbDriver>) -> ! {
    loop {
        receiver.wait_connection().await;
        info!("Host connected, accepting step commands");

        if let Err(Disconnected) = pump_commands(&mut receiver).await {
            warn!("Command stream: connection lost, waiting for host...");
        }
    }
}

async fn pump_commands(receiver: &mut Receiver<'static, UsbDriver>) -> Result<(), Disconnected> {
    let mut packet = [0u8; MAX_PACKET_SIZE as usize];

    loop {
        let received = receiver.read_packet(&mut packet).await?;

        // Waits while the step loop is behind; that is the host backpressure
        COMMAND_PIPE.write_all(&packet[..received]).await;
    }
}

/// Move status bytes from [`STATUS_PIPE`] to the host, reconnecting forever.
#[embassy_executor::task]
pub async fn status_task(mut sender: Sender<'static, UsbDriver>) -> ! {
    loop {
        sender.wait_connection().await;

        if let Err(Disconnected) = pump_status(&mut sender).await {
            warn!("Status stream: connection lost, waiting for host...");
        }
    }
}

async fn pump_status(sender: &mut Sender<'static, UsbDriver>) -> Result<(), Disconnected> {
    let mut packet = [0u8; STATUS_PIPE_SIZE];
    let max_packet = usize::from(sender.max_packet_size());

    loop {
        let pending = STATUS_PIPE.read(&mut packet).await;
        sender.write_packet(&packet[..pending]).await?;

        // A full-size packet needs a zero-length packet to end the transfer
        if pending == max_packet {
            sender.write_packet(&[]).await?;
        }
    }
}
