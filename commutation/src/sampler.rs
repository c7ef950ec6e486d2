//! Hall sensor sampling

use core::convert::Infallible;

use embedded_hal::digital::InputPin;

use crate::index::{PositionIndex, SensorLayout};

/// Source of the current rotor position
///
/// `sample` reads the live pin levels every call: no buffering, no debouncing and
/// no blocking.
pub trait HallSensors {
    fn sample(&mut self) -> PositionIndex;
}

impl<S: HallSensors + ?Sized> HallSensors for &mut S {
    fn sample(&mut self) -> PositionIndex {
        (**self).sample()
    }
}

/// Input port read as one word
pub trait InputPort {
    fn read(&mut self) -> u16;
}

/// All three sensors on one port, captured by a single register read
pub struct PortSampler<P> {
    port: P,
    layout: SensorLayout,
}

impl<P: InputPort> PortSampler<P> {
    pub fn new(port: P, layout: SensorLayout) -> Self {
        Self { port, layout }
    }
}

impl<P: InputPort> HallSensors for PortSampler<P> {
    #[inline]
    fn sample(&mut self) -> PositionIndex {
        self.layout.index(self.port.read())
    }
}

/// Three separate input pins, read A, B, C in turn
///
/// Two sensors changing between the reads can yield a mixed reading; it is either
/// the old state, the new state, or an adjacent one, and the next edge re-samples.
pub struct HallPins<A, B, C> {
    a: A,
    b: B,
    c: C,
}

impl<A, B, C> HallPins<A, B, C>
where
    A: InputPin<Error = Infallible>,
    B: InputPin<Error = Infallible>,
    C: InputPin<Error = Infallible>,
{
    pub fn new(a: A, b: B, c: C) -> Self {
        Self { a, b, c }
    }
}

impl<A, B, C> HallSensors for HallPins<A, B, C>
where
    A: InputPin<Error = Infallible>,
    B: InputPin<Error = Infallible>,
    C: InputPin<Error = Infallible>,
{
    #[inline]
    fn sample(&mut self) -> PositionIndex {
        let Ok(a) = self.a.is_high();
        let Ok(b) = self.b.is_high();
        let Ok(c) = self.c.is_high();
        PositionIndex::from_levels(a, b, c)
    }
}
