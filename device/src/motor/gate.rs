//! Gate-driver control lines on GPIOB, committed with one BSRR store

use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::pac;
use oxihall_commutation::{OutputPort, Phase, PortLayout, PortWord};

/// PB0..=PB5 driving the HIP4086 inputs AH, AL, BH, BL, CH, CL
pub struct GatePort<'d> {
    // Held so the pins stay configured as push-pull outputs
    _lines: [Output<'d>; 6],
}

impl<'d> GatePort<'d> {
    /// Configure the six lines, each starting at its "switch off" level
    pub fn new(
        pb0: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB0>>,
        pb1: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB1>>,
        pb2: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB2>>,
        pb3: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB3>>,
        pb4: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB4>>,
        pb5: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB5>>,
        layout: &PortLayout,
    ) -> Self {
        let off = |phase: Phase, high_side: bool| {
            let line = layout.line(phase, high_side);
            if line.polarity.level(false) { Level::High } else { Level::Low }
        };

        let lines = [
            Output::new(pb0.into(), off(Phase::A, true), Speed::VeryHigh),  // AH (inverting)
            Output::new(pb1.into(), off(Phase::A, false), Speed::VeryHigh), // AL
            Output::new(pb2.into(), off(Phase::B, true), Speed::VeryHigh),  // BH (inverting)
            Output::new(pb3.into(), off(Phase::B, false), Speed::VeryHigh), // BL
            Output::new(pb4.into(), off(Phase::C, true), Speed::VeryHigh),  // CH (inverting)
            Output::new(pb5.into(), off(Phase::C, false), Speed::VeryHigh), // CL
        ];

        defmt::info!(
            "Gate port init: mask={=u16:#b} idle={=u16:#b}",
            layout.mask(),
            layout.encode(oxihall_commutation::SwitchPattern::ALL_OFF).levels
        );

        Self { _lines: lines }
    }
}

impl OutputPort for GatePort<'_> {
    #[inline]
    fn write(&mut self, word: PortWord) {
        // BSRR latches every set and reset bit of the store together, so the six
        // lines change in the same cycle. Bits outside the mask are left alone
        // (the Hall inputs share this port).
        pac::GPIOB
            .bsrr()
            .write_value(pac::gpio::regs::Bsrr(word.set_reset()));
    }
}
