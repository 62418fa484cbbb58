//! Firmware entry point for the Etch USB stepper driver.
//!
//! Brings up the STM32H753, the USB CDC ACM port and the motor outputs, then
//! hands everything to the etch application, which polls the step control loop
//! for the lifetime of the device.

#![no_std]
#![no_main]

// Application modules
mod apps;
mod drivers;
mod peripherals;

use apps::etch_app::EtchApp;
use defmt::info;
use embassy_executor::Spawner;
use peripherals::acm::AcmBridge;
use peripherals::usb_system::UsbSystem;
use peripherals::init_system;

// Import panic handler and defmt RTT for debugging
use defmt_rtt as _;
#[cfg(not(feature = "debug"))]
use panic_halt as _;
#[cfg(feature = "debug")]
use panic_probe as _;

/// Main application entry point
///
/// Initializes the system, spawns the USB tasks and then runs the etch
/// application on the main task. This function never returns.
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting Etch firmware v{}", env!("CARGO_PKG_VERSION"));

    let peripherals = init_system();

    // Motor outputs first so the coils sit at a known level before USB comes up
    let motors = drivers::motor_port::motor_outputs(claim_motors!(peripherals));

    // CDC ACM must register with the builder before the device is built
    let mut usb = UsbSystem::new(claim_usb!(peripherals));
    let bridge = AcmBridge::new(usb.builder(), claim_acm!());
    let link = bridge.link();
    let (sender, receiver) = bridge.split();

    info!("System initialized, spawning USB tasks...");

    spawner.spawn(peripherals::usb_system::task(usb)).unwrap();
    spawner.spawn(peripherals::acm::command_task(receiver)).unwrap();
    spawner.spawn(peripherals::acm::status_task(sender)).unwrap();

    let mut app = EtchApp::new(link, peripherals::timer::step_tick(), motors);
    app.run().await;
}
