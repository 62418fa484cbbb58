//! Etch application: the step loop running on the main task.
//!
//! Owns the [`FlowController`] and polls it as fast as the executor allows.
//! Between polls it yields so the USB device and CDC pump tasks can make
//! progress, and once a minute it logs the loop statistics.

use defmt::{info, trace};
use embassy_futures::yield_now;
use embassy_time::{Duration, Instant};
use etch_rs::config::HEARTBEAT_PERIOD_SECS;
use etch_rs::{FlowController, PeriodicTick};

use crate::drivers::motor_port::EtchMotors;
use crate::peripherals::acm::AcmLink;
use crate::peripherals::timer::EmbassyClock;

type EtchFlow = FlowController<AcmLink, PeriodicTick<EmbassyClock>, EtchMotors<'static>>;

/// Step loop application.
///
/// # Example Usage
///
/// ```rust,ignore
/// let mut app = EtchApp::new(link, peripherals::timer::step_tick(), motors);
/// app.run().await; // Runs forever
/// ```
pub struct EtchApp {
    flow: EtchFlow,
    next_heartbeat: Instant,
}

impl EtchApp {
    pub fn new(link: AcmLink, tick: PeriodicTick<EmbassyClock>, motors: EtchMotors<'static>) -> Self {
        Self {
            flow: FlowController::new(link, tick, motors),
            next_heartbeat: Instant::now() + Self::heartbeat_period(),
        }
    }

    /// Run the step loop. Never returns.
    pub async fn run(&mut self) -> ! {
        let capacity = self.flow.command_queue().capacity();
        info!("Etch step loop started ({} command slots)", capacity);

        loop {
            let iteration = self.flow.poll();
            if let Some(step) = iteration.stepped {
                trace!("step {=u8:#x}, depth {}", step.0, self.flow.command_queue().len());
            }

            self.heartbeat();

            // Lets the USB device and CDC pumps run
            yield_now().await;
        }
    }

    fn heartbeat(&mut self) {
        let now = Instant::now();
        if now < self.next_heartbeat {
            return;
        }
        self.next_heartbeat = now + Self::heartbeat_period();

        info!(
            "Heartbeat: {}, commands queued {}, status queued {}",
            self.flow.stats(),
            self.flow.command_queue().len(),
            self.flow.status_queue().len()
        );
    }

    const fn heartbeat_period() -> Duration {
        Duration::from_secs(HEARTBEAT_PERIOD_SECS)
    }
}
