//! Gate-driver output: logical switch pattern to physical port levels

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::pattern::{Leg, Phase, SwitchPattern};

/// Input polarity of one gate-driver control line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Polarity {
    /// Line high = switch on
    ActiveHigh,
    /// Line low = switch on (inverting driver input)
    ActiveLow,
}

impl Polarity {
    /// Pin level that puts the switch in state `on`
    pub const fn level(self, on: bool) -> bool {
        match self {
            Polarity::ActiveHigh => on,
            Polarity::ActiveLow => !on,
        }
    }
}

/// One gate-driver control line: its bit in the output port and its polarity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchLine {
    pub bit: u8,
    pub polarity: Polarity,
}

impl SwitchLine {
    pub const fn new(bit: u8, polarity: Polarity) -> Self {
        Self { bit, polarity }
    }
}

/// Levels for the six switch lines of one commit
///
/// `levels` is only meaningful under `mask`; `idle` holds the levels that turn
/// every switch off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortWord {
    pub levels: u16,
    pub mask: u16,
    pub idle: u16,
}

impl PortWord {
    /// STM32 BSRR encoding: set bits in the low half, reset bits in the high half
    pub const fn set_reset(self) -> u32 {
        let set = self.levels & self.mask;
        let reset = !self.levels & self.mask;
        set as u32 | (reset as u32) << 16
    }

    /// Lines that switch off (or stay off) in this commit
    pub const fn releasing(self) -> u16 {
        !(self.levels ^ self.idle) & self.mask
    }
}

/// Port bit and polarity of each switch line, in order AH, AL, BH, BL, CH, CL
/// (the same order as [`SwitchPattern::bits`])
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortLayout {
    lines: [SwitchLine; 6],
}

impl PortLayout {
    /// HIP4086 header on port bits 0..=5: AH, AL, BH, BL, CH, CL
    ///
    /// High-side inputs of the HIP4086 are inverting (active-low); low-side inputs
    /// are active-high. All-off is `0b01_0101`.
    pub const HIP4086: Self = Self::new([
        SwitchLine::new(0, Polarity::ActiveLow),  // AH
        SwitchLine::new(1, Polarity::ActiveHigh), // AL
        SwitchLine::new(2, Polarity::ActiveLow),  // BH
        SwitchLine::new(3, Polarity::ActiveHigh), // BL
        SwitchLine::new(4, Polarity::ActiveLow),  // CH
        SwitchLine::new(5, Polarity::ActiveHigh), // CL
    ]);

    /// Panics (at compile time when used in a `const`) if a line is outside the
    /// 16-bit port or two lines share a bit.
    pub const fn new(lines: [SwitchLine; 6]) -> Self {
        let mut seen = 0u16;
        let mut i = 0;
        while i < 6 {
            assert!(lines[i].bit < 16, "switch line outside the port");
            assert!(seen & (1 << lines[i].bit) == 0, "switch lines share a port bit");
            seen |= 1 << lines[i].bit;
            i += 1;
        }
        Self { lines }
    }

    pub const fn line(&self, phase: Phase, high_side: bool) -> SwitchLine {
        self.lines[2 * phase as usize + if high_side { 0 } else { 1 }]
    }

    pub const fn mask(&self) -> u16 {
        let mut mask = 0u16;
        let mut i = 0;
        while i < 6 {
            mask |= 1 << self.lines[i].bit;
            i += 1;
        }
        mask
    }

    /// Translate a logical pattern into port levels
    #[inline]
    pub const fn encode(&self, pattern: SwitchPattern) -> PortWord {
        let flags = pattern.bits();
        let mut levels = 0u16;
        let mut idle = 0u16;
        let mut i = 0;
        while i < 6 {
            let line = self.lines[i];
            let on = flags >> i & 1 != 0;
            levels |= (line.polarity.level(on) as u16) << line.bit;
            idle |= (line.polarity.level(false) as u16) << line.bit;
            i += 1;
        }
        PortWord {
            levels,
            mask: self.mask(),
            idle,
        }
    }

    /// Read port levels back as a logical pattern, `None` if they describe
    /// shoot-through on any phase
    pub const fn decode(&self, word: u16) -> Option<SwitchPattern> {
        let mut legs = [Leg::Open; 3];
        let mut n = 0;
        while n < 3 {
            let high = self.lines[2 * n];
            let low = self.lines[2 * n + 1];
            let high_on = high.polarity.level(word >> high.bit & 1 != 0);
            let low_on = low.polarity.level(word >> low.bit & 1 != 0);
            legs[n] = match (high_on, low_on) {
                (false, false) => Leg::Open,
                (true, false) => Leg::High,
                (false, true) => Leg::Low,
                (true, true) => return None,
            };
            n += 1;
        }
        Some(SwitchPattern::from_legs(legs[0], legs[1], legs[2]))
    }
}

impl Default for PortLayout {
    fn default() -> Self {
        Self::HIP4086
    }
}

/// Output port that updates every masked line in one indivisible operation
///
/// Implementations that cannot do this in a single store must say so and be
/// wrapped in [`CriticalSectionPort`].
pub trait OutputPort {
    fn write(&mut self, word: PortWord);
}

impl<P: OutputPort + ?Sized> OutputPort for &mut P {
    fn write(&mut self, word: PortWord) {
        (**self).write(word)
    }
}

/// Runs every write of the inner port with interrupts masked, so no other commit
/// can start halfway through a multi-store update
pub struct CriticalSectionPort<P>(pub P);

impl<P: OutputPort> OutputPort for CriticalSectionPort<P> {
    fn write(&mut self, word: PortWord) {
        critical_section::with(|_| self.0.write(word))
    }
}

/// Six individual output pins driven one at a time
///
/// Lines that turn off are written before lines that turn on, so every
/// intermediate state is a subset of either the old or the new pattern and never
/// a shoot-through. Wrap in [`CriticalSectionPort`] when commits can preempt each
/// other.
pub struct PinBank<P> {
    pins: [P; 6],
    layout: PortLayout,
}

impl<P: OutputPin<Error = Infallible>> PinBank<P> {
    /// `pins` in layout order AH, AL, BH, BL, CH, CL
    pub fn new(pins: [P; 6], layout: PortLayout) -> Self {
        Self { pins, layout }
    }

    fn drive(&mut self, i: usize, word: PortWord) {
        let bit = self.layout.lines[i].bit;
        let res = if word.levels >> bit & 1 != 0 {
            self.pins[i].set_high()
        } else {
            self.pins[i].set_low()
        };
        let Ok(()) = res;
    }
}

impl<P: OutputPin<Error = Infallible>> OutputPort for PinBank<P> {
    fn write(&mut self, word: PortWord) {
        let releasing = word.releasing();
        for i in 0..6 {
            if releasing >> self.layout.lines[i].bit & 1 != 0 {
                self.drive(i, word);
            }
        }
        for i in 0..6 {
            if releasing >> self.layout.lines[i].bit & 1 == 0 {
                self.drive(i, word);
            }
        }
    }
}

/// Owns the output port; the only place logical patterns become pin levels
pub struct GateDriver<P> {
    port: P,
    layout: PortLayout,
}

impl<P: OutputPort> GateDriver<P> {
    /// Take the port and immediately drive the all-off safe state
    pub fn new(port: P, layout: PortLayout) -> Self {
        let mut driver = Self { port, layout };
        driver.safe_state();
        driver
    }

    #[inline]
    pub fn commit(&mut self, pattern: SwitchPattern) {
        self.port.write(self.layout.encode(pattern));
    }

    pub fn safe_state(&mut self) {
        self.commit(SwitchPattern::ALL_OFF);
    }

    /// Drive the safe state and give the port back
    pub fn release(mut self) -> P {
        self.safe_state();
        self.port
    }
}
