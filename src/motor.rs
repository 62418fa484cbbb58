//! Motor output sink.
//!
//! A step byte carries both motors at once: the low nibble is motor 1's four
//! coil outputs and the high nibble is motor 2's. Each nibble lands on its own
//! output port, and each port is shared with four bits this module does not
//! own, so every write is a read-modify-write of the owned bits only.

/// One step pattern for both motors. Every byte value is a valid pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepCommand(pub u8);

impl StepCommand {
    /// Motor 1 coil pattern (bits 0-3).
    pub const fn motor1(self) -> u8 {
        self.0 & MOTOR1_MASK
    }

    /// Motor 2 coil pattern (bits 4-7), shifted down to 0-3.
    pub const fn motor2(self) -> u8 {
        (self.0 & MOTOR2_MASK) >> 4
    }
}

impl From<u8> for StepCommand {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

/// Bits of the motor 1 port owned by the sink.
pub const MOTOR1_MASK: u8 = 0x0F;
/// Bits of the motor 2 port owned by the sink.
pub const MOTOR2_MASK: u8 = 0xF0;

/// An 8-bit output port that can be read back.
pub trait OutputPort {
    /// Current output levels.
    fn read(&self) -> u8;

    /// Drive all eight outputs.
    fn write(&mut self, value: u8);

    /// Replace only the bits in `mask` with the matching bits of `value`.
    fn modify(&mut self, mask: u8, value: u8) {
        let current = self.read();
        self.write((current & !mask) | (value & mask));
    }
}

/// Something that can apply a step pattern to the motors.
pub trait MotorSink {
    fn drive(&mut self, step: StepCommand);
}

/// The two motor ports: motor 1 on bits 0-3 of its port, motor 2 on bits 4-7 of its port.
pub struct MotorOutputs<P1, P2> {
    motor1: P1,
    motor2: P2,
}

impl<P1: OutputPort, P2: OutputPort> MotorOutputs<P1, P2> {
    pub fn new(motor1: P1, motor2: P2) -> Self {
        Self { motor1, motor2 }
    }

    pub fn ports(&self) -> (&P1, &P2) {
        (&self.motor1, &self.motor2)
    }

    /// Give the ports back, e.g. to hand them to other firmware.
    pub fn release(self) -> (P1, P2) {
        (self.motor1, self.motor2)
    }
}

impl<P1: OutputPort, P2: OutputPort> MotorSink for MotorOutputs<P1, P2> {
    fn drive(&mut self, step: StepCommand) {
        self.motor1.modify(MOTOR1_MASK, step.0);
        self.motor2.modify(MOTOR2_MASK, step.0);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Port register with some bits already claimed by other firmware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct FakePort {
        pub value: u8,
        pub writes: usize,
    }

    impl FakePort {
        pub(crate) fn with_value(value: u8) -> Self {
            Self { value, writes: 0 }
        }
    }

    impl OutputPort for FakePort {
        fn read(&self) -> u8 {
            self.value
        }

        fn write(&mut self, value: u8) {
            self.value = value;
            self.writes += 1;
        }
    }

    #[test]
    fn nibbles_split_low_and_high() {
        let step = StepCommand(0x5A);
        assert_eq!(step.motor1(), 0xA);
        assert_eq!(step.motor2(), 0x5);
    }

    #[test]
    fn drive_writes_each_nibble_to_its_port() {
        let mut motors = MotorOutputs::new(FakePort::with_value(0x00), FakePort::with_value(0x00));
        motors.drive(StepCommand(0x5A));

        let (motor1, motor2) = motors.ports();
        assert_eq!(motor1.value, 0x0A);
        assert_eq!(motor2.value, 0x50);
    }

    #[test]
    fn drive_preserves_foreign_bits() {
        let mut motors = MotorOutputs::new(FakePort::with_value(0xB0), FakePort::with_value(0x0C));

        for step in [0x00, 0x5A, 0xFF, 0x81] {
            motors.drive(StepCommand(step));
            let (motor1, motor2) = motors.ports();
            assert_eq!(motor1.value & 0xF0, 0xB0);
            assert_eq!(motor2.value & 0x0F, 0x0C);
            assert_eq!(motor1.value & MOTOR1_MASK, step & 0x0F);
            assert_eq!(motor2.value & MOTOR2_MASK, step & 0xF0);
        }
    }

    #[test]
    fn drive_clears_previously_set_owned_bits() {
        let mut motors = MotorOutputs::new(FakePort::with_value(0x0F), FakePort::with_value(0xF0));
        motors.drive(StepCommand(0x00));

        let (motor1, motor2) = motors.release();
        assert_eq!(motor1.value, 0x00);
        assert_eq!(motor2.value, 0x00);
        assert_eq!(motor1.writes, 1);
        assert_eq!(motor2.writes, 1);
    }

    #[test]
    fn modify_only_touches_masked_bits() {
        let mut port = FakePort::with_value(0b1010_1010);
        port.modify(0b0000_1111, 0b1111_0101);
        assert_eq!(port.value, 0b1010_0101);
    }
}
