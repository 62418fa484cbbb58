//! GPIO nibble ports for the two stepper motors.
//!
//! Motor 1 coils are on PD0..PD3 and motor 2 coils on PE4..PE7. Each group of
//! four pins is exposed as an 8-bit [`OutputPort`] whose bit positions match
//! the pin numbers, so the step byte's nibbles land on the matching pins.

use embassy_stm32::{
    gpio::{Level, Output, Pin, Speed},
    peripherals::{PD0, PD1, PD2, PD3, PE4, PE5, PE6, PE7},
    Peri,
};
use etch_rs::{MotorOutputs, OutputPort};

/// Peripheral collection for the motor outputs
pub struct MotorPeripherals<'d> {
    pub m1_a: Peri<'d, PD0>,
    pub m1_b: Peri<'d, PD1>,
    pub m1_c: Peri<'d, PD2>,
    pub m1_d: Peri<'d, PD3>,
    pub m2_a: Peri<'d, PE4>,
    pub m2_b: Peri<'d, PE5>,
    pub m2_c: Peri<'d, PE6>,
    pub m2_d: Peri<'d, PE7>,
}

/// Macro to claim peripherals for the motor outputs
#[macro_export]
macro_rules! claim_motors {
    ($peripherals:expr) => {{
        $crate::drivers::motor_port::MotorPeripherals {
            m1_a: $peripherals.PD0,
            m1_b: $peripherals.PD1,
            m1_c: $peripherals.PD2,
            m1_d: $peripherals.PD3,
            m2_a: $peripherals.PE4,
            m2_b: $peripherals.PE5,
            m2_c: $peripherals.PE6,
            m2_d: $peripherals.PE7,
        }
    }};
}

/// Four consecutive output pins seen as bits `first_bit..first_bit + 4` of a port.
///
/// The remaining bits of the port belong to other firmware. They read back as
/// zero and writes ignore them, so they can never be clobbered from here.
pub struct NibblePort<'d> {
    pins: [Output<'d>; 4],
    first_bit: u8,
}

impl<'d> NibblePort<'d> {
    /// Take ownership of four pins, all driven low.
    pub fn new(pins: [Output<'d>; 4], first_bit: u8) -> Self {
        let mut port = Self { pins, first_bit };
        port.write(0);
        port
    }
}

impl OutputPort for NibblePort<'_> {
    fn read(&self) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, pin)| pin.is_set_high())
            .fold(0, |value, (i, _)| value | 1 << (self.first_bit as usize + i))
    }

    fn write(&mut self, value: u8) {
        let first_bit = self.first_bit as usize;
        for (i, pin) in self.pins.iter_mut().enumerate() {
            let level = if value & (1 << (first_bit + i)) != 0 {
                Level::High
            } else {
                Level::Low
            };
            pin.set_level(level);
        }
    }
}

/// Motor output sink for the Etch board.
pub type EtchMotors<'d> = MotorOutputs<NibblePort<'d>, NibblePort<'d>>;

/// Configure the coil pins as push-pull outputs and build the motor sink.
pub fn motor_outputs(p: MotorPeripherals<'static>) -> EtchMotors<'static> {
    let motor1 = NibblePort::new([coil(p.m1_a), coil(p.m1_b), coil(p.m1_c), coil(p.m1_d)], 0);
    let motor2 = NibblePort::new([coil(p.m2_a), coil(p.m2_b), coil(p.m2_c), coil(p.m2_d)], 4);

    MotorOutputs::new(motor1, motor2)
}

fn coil<'d>(pin: Peri<'d, impl Pin>) -> Output<'d> {
    Output::new(pin, Level::Low, Speed::Low)
}
