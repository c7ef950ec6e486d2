//! Logical inverter switch patterns, independent of gate-driver polarity

/// One of the three motor phases (inverter legs)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Phase {
    A = 0,
    B = 1,
    C = 2,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    const fn from_u8(n: u8) -> Self {
        match n {
            0 => Phase::A,
            1 => Phase::B,
            _ => Phase::C,
        }
    }
}

/// State of one inverter leg
///
/// A leg floats or conducts through exactly one of its two switches. Patterns are
/// built from legs, so a shoot-through pattern cannot be constructed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Leg {
    /// Both switches off (high-Z)
    #[default]
    Open,
    /// High-side switch on, phase tied to the positive rail
    High,
    /// Low-side switch on, phase tied to ground
    Low,
}

/// Six switch-enabled flags, two per phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SwitchPattern {
    legs: [Leg; 3],
}

impl SwitchPattern {
    /// Every switch open. The only safe output for an invalid rotor reading.
    pub const ALL_OFF: Self = Self {
        legs: [Leg::Open; 3],
    };

    /// Drive `high` from the positive rail and `low` to ground, third phase floating.
    ///
    /// Panics (at compile time when used in a `const`) if both are the same phase.
    pub const fn drive(high: Phase, low: Phase) -> Self {
        assert!(
            high as u8 != low as u8,
            "high and low side selected on the same phase"
        );
        let mut legs = [Leg::Open; 3];
        legs[high as usize] = Leg::High;
        legs[low as usize] = Leg::Low;
        Self { legs }
    }

    pub const fn from_legs(a: Leg, b: Leg, c: Leg) -> Self {
        Self { legs: [a, b, c] }
    }

    pub const fn leg(&self, phase: Phase) -> Leg {
        self.legs[phase as usize]
    }

    pub const fn high_side(&self, phase: Phase) -> bool {
        matches!(self.leg(phase), Leg::High)
    }

    pub const fn low_side(&self, phase: Phase) -> bool {
        matches!(self.leg(phase), Leg::Low)
    }

    pub const fn is_off(&self) -> bool {
        self.count(Leg::High) == 0 && self.count(Leg::Low) == 0
    }

    /// Exactly one high-side and one low-side switch on, on two distinct phases
    pub const fn is_two_phase(&self) -> bool {
        self.count(Leg::High) == 1 && self.count(Leg::Low) == 1
    }

    /// Phase connected to the positive rail, if exactly one is
    pub const fn high_phase(&self) -> Option<Phase> {
        self.only(Leg::High)
    }

    /// Phase connected to ground, if exactly one is
    pub const fn low_phase(&self) -> Option<Phase> {
        self.only(Leg::Low)
    }

    /// Pack the flags as `bit 2n` = high side and `bit 2n+1` = low side of phase n
    /// (order AH, AL, BH, BL, CH, CL)
    pub const fn bits(&self) -> u8 {
        let mut bits = 0u8;
        let mut n = 0;
        while n < 3 {
            let flags: u8 = match self.legs[n] {
                Leg::Open => 0b00,
                Leg::High => 0b01,
                Leg::Low => 0b10,
            };
            bits |= flags << (2 * n);
            n += 1;
        }
        bits
    }

    /// Inverse of [`bits`](Self::bits). Rejects bits above 5 and any phase with
    /// both flags set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !0b11_1111 != 0 {
            return None;
        }
        let mut legs = [Leg::Open; 3];
        let mut n = 0;
        while n < 3 {
            legs[n] = match (bits >> (2 * n)) & 0b11 {
                0b00 => Leg::Open,
                0b01 => Leg::High,
                0b10 => Leg::Low,
                _ => return None,
            };
            n += 1;
        }
        Some(Self { legs })
    }

    const fn count(&self, leg: Leg) -> u8 {
        let mut count = 0;
        let mut n = 0;
        while n < 3 {
            if self.legs[n] as u8 == leg as u8 {
                count += 1;
            }
            n += 1;
        }
        count
    }

    const fn only(&self, leg: Leg) -> Option<Phase> {
        if self.count(leg) != 1 {
            return None;
        }
        let mut n = 0;
        while n < 3 {
            if self.legs[n] as u8 == leg as u8 {
                return Some(Phase::from_u8(n as u8));
            }
            n += 1;
        }
        None
    }
}
