//! Clock bring-up for the STM32H753 on the Etch board.
//!
//! The step loop only needs a steady CPU and an accurate 48 MHz USB clock, so
//! the core runs at 400 MHz in VOS1 rather than the 480 MHz / VOS0 corner.

use embassy_stm32::{rcc::*, Config, Peripherals};

/// Initialize clocks and return the peripheral singletons.
///
/// - **400 MHz** system clock from PLL1 fed by HSI
/// - **200 MHz** AHB, **100 MHz** APB buses
/// - **48 MHz** HSI48 for USB, trimmed from USB SOF packets
///
/// TIM2 (the embassy time driver behind the step tick) runs from APB1.
///
/// # Panics
///
/// Panics inside `embassy_stm32::init` if the clock tree does not lock.
pub fn init_system() -> Peripherals {
    let mut config = Config::default();

    config.rcc.hsi = Some(HSIPrescaler::DIV1);
    config.rcc.csi = true;

    // USB clock, kept in sync with the host's start-of-frame
    config.rcc.hsi48 = Some(Hsi48Config { sync_from_usb: true });

    // PLL1 = HSI(64MHz) / 4 * 50 / 2 = 400MHz
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSI,
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL50,
        divp: Some(PllDiv::DIV2),
        divq: None,
        divr: None,
    });

    config.rcc.sys = Sysclk::PLL1_P;
    config.rcc.ahb_pre = AHBPrescaler::DIV2;
    config.rcc.apb1_pre = APBPrescaler::DIV2;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config.rcc.apb3_pre = APBPrescaler::DIV2;
    config.rcc.apb4_pre = APBPrescaler::DIV2;
    config.rcc.voltage_scale = VoltageScale::Scale1;

    config.rcc.mux.usbsel = mux::Usbsel::HSI48;

    embassy_stm32::init(config)
}
