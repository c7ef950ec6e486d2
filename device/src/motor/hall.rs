//! Hall sensor inputs on PB6 (A), PB7 (B), PB8 (C)

use embassy_futures::select::select3;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_stm32::pac;
use oxihall_commutation::InputPort;

/// Edge sources for the three sensors
pub struct HallEdges<'d> {
    a: ExtiInput<'d>,
    b: ExtiInput<'d>,
    c: ExtiInput<'d>,
}

/// GPIOB input data register; one read captures all three sensors
///
/// Only handed out by [`HallEdges::new`], once the pins are inputs with pull-ups.
pub struct HallPort(());

impl<'d> HallEdges<'d> {
    pub fn new(
        pb6: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB6>>,
        pb7: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB7>>,
        pb8: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::PB8>>,
        exti6: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::EXTI6>>,
        exti7: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::EXTI7>>,
        exti8: impl Into<embassy_stm32::Peri<'d, embassy_stm32::peripherals::EXTI8>>,
    ) -> (Self, HallPort) {
        // Open-collector sensors: pull-ups enabled
        let a = ExtiInput::new(pb6.into(), exti6.into(), Pull::Up);
        let b = ExtiInput::new(pb7.into(), exti7.into(), Pull::Up);
        let c = ExtiInput::new(pb8.into(), exti8.into(), Pull::Up);
        defmt::info!("Hall sensors configured on PB6/PB7/PB8 (pull-up, any edge)");
        (Self { a, b, c }, HallPort(()))
    }

    /// Resolves on the next rising or falling edge of any sensor
    ///
    /// The EXTI lines are armed on the first poll.
    pub async fn any_edge(&mut self) {
        let _ = select3(
            self.a.wait_for_any_edge(),
            self.b.wait_for_any_edge(),
            self.c.wait_for_any_edge(),
        )
        .await;
    }
}

impl InputPort for HallPort {
    #[inline]
    fn read(&mut self) -> u16 {
        pac::GPIOB.idr().read().0 as u16
    }
}
