//! Rotor position index derived from the three Hall sensors

use crate::six_step::CommutationStep;

/// 3-bit rotor position: `bit0 = A`, `bit1 = B`, `bit2 = C`
///
/// The value is masked to three bits on construction, so it always indexes an
/// 8-entry table. 0 (all sensors low) and 7 (all sensors high) are not reachable
/// by a healthy 120° sensor set and only appear transiently or on a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PositionIndex(u8);

impl PositionIndex {
    pub const ALL_LOW: Self = Self(0b000);
    pub const ALL_HIGH: Self = Self(0b111);

    /// `None` if `raw` does not fit in three bits
    pub const fn new(raw: u8) -> Option<Self> {
        if raw > 0b111 { None } else { Some(Self(raw)) }
    }

    pub const fn from_bits_truncate(raw: u8) -> Self {
        Self(raw & 0b111)
    }

    pub const fn from_levels(a: bool, b: bool, c: bool) -> Self {
        Self((a as u8) | (b as u8) << 1 | (c as u8) << 2)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn a(self) -> bool {
        self.0 & 0b001 != 0
    }

    pub const fn b(self) -> bool {
        self.0 & 0b010 != 0
    }

    pub const fn c(self) -> bool {
        self.0 & 0b100 != 0
    }

    pub const fn is_valid(self) -> bool {
        !matches!(self.0, 0b000 | 0b111)
    }

    pub const fn step(self) -> Option<CommutationStep> {
        CommutationStep::from_index(self)
    }
}

impl From<PositionIndex> for u8 {
    fn from(index: PositionIndex) -> Self {
        index.0
    }
}

/// Where the three sensors sit in an input port word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorLayout {
    a: u8,
    b: u8,
    c: u8,
    inverted: bool,
}

impl SensorLayout {
    /// Hall A = PB6, B = PB7, C = PB8, read as-is
    pub const PB6_PB8: Self = Self::new(6, 7, 8);

    /// Panics (at compile time when used in a `const`) on a bit outside the
    /// 16-bit port or on two sensors sharing a bit.
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        assert!(a < 16 && b < 16 && c < 16, "sensor bit outside the port");
        assert!(a != b && b != c && a != c, "sensors share a port bit");
        Self {
            a,
            b,
            c,
            inverted: false,
        }
    }

    /// Sensors that pull their line low when asserted
    pub const fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    /// Pack the sensor bits of one port read into an index
    #[inline]
    pub const fn index(&self, word: u16) -> PositionIndex {
        let word = if self.inverted { !word } else { word };
        PositionIndex::from_levels(
            word >> self.a & 1 != 0,
            word >> self.b & 1 != 0,
            word >> self.c & 1 != 0,
        )
    }

    /// Port word whose sensor bits spell `index` (other bits low)
    pub const fn word(&self, index: PositionIndex) -> u16 {
        let word = (index.a() as u16) << self.a
            | (index.b() as u16) << self.b
            | (index.c() as u16) << self.c;
        if self.inverted { !word & self.mask() } else { word }
    }

    pub const fn mask(&self) -> u16 {
        1 << self.a | 1 << self.b | 1 << self.c
    }
}

/// How the rotor moved between two successive readings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transition {
    /// Same valid state again (bounce, or a redundant edge)
    Hold,
    /// One sector forward
    Forward,
    /// One sector backward
    Reverse,
    /// Valid to valid, but more than one sector apart
    Skip,
    /// The new reading is 0 or 7
    Fault,
    /// Valid reading right after a 0 or 7
    Recover,
}

impl Transition {
    pub fn between(prev: PositionIndex, next: PositionIndex) -> Self {
        match (prev.step(), next.step()) {
            (Some(p), Some(n)) if p == n => Self::Hold,
            (Some(p), Some(n)) if p.next() == n => Self::Forward,
            (Some(p), Some(n)) if p.prev() == n => Self::Reverse,
            (Some(_), Some(_)) => Self::Skip,
            (None, Some(_)) => Self::Recover,
            (_, None) => Self::Fault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_order() {
        assert_eq!(PositionIndex::from_levels(true, false, false).get(), 1);
        assert_eq!(PositionIndex::from_levels(false, true, false).get(), 2);
        assert_eq!(PositionIndex::from_levels(false, false, true).get(), 4);
        assert_eq!(PositionIndex::from_levels(true, true, true), PositionIndex::ALL_HIGH);
    }

    #[test]
    fn test_new_rejects_wide_values() {
        assert_eq!(PositionIndex::new(7).map(PositionIndex::get), Some(7));
        assert_eq!(PositionIndex::new(8), None);
        assert_eq!(PositionIndex::from_bits_truncate(0b1111_1010).get(), 0b010);
    }

    #[test]
    fn test_validity() {
        let valid: Vec<u8> = (0..8u8)
            .filter(|&i| PositionIndex::from_bits_truncate(i).is_valid())
            .collect();
        assert_eq!(valid, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_layout_reads_port_bits() {
        let layout = SensorLayout::PB6_PB8;
        // A on PB6 only, unrelated bits set elsewhere
        let word = 1 << 6 | 1 << 0 | 1 << 15;
        assert_eq!(layout.index(word).get(), 1);
        assert_eq!(layout.index(1 << 7 | 1 << 8).get(), 0b110);
        assert_eq!(layout.index(0), PositionIndex::ALL_LOW);
    }

    #[test]
    fn test_inverted_layout() {
        let layout = SensorLayout::PB6_PB8.inverted();
        // A pulled low, B and C released high
        let word = 1 << 7 | 1 << 8;
        assert_eq!(layout.index(word).get(), 1);
        assert_eq!(layout.index(layout.word(PositionIndex::from_bits_truncate(5))).get(), 5);
    }

    #[test]
    fn test_layout_word() {
        let layout = SensorLayout::new(4, 5, 6);
        assert_eq!(layout.word(PositionIndex::from_bits_truncate(0b101)), 0b0101_0000);
        assert_eq!(layout.mask(), 0b0111_0000);
    }

    #[test]
    fn test_transitions() {
        let i = PositionIndex::from_bits_truncate;
        assert_eq!(Transition::between(i(1), i(3)), Transition::Forward);
        assert_eq!(Transition::between(i(1), i(5)), Transition::Reverse);
        assert_eq!(Transition::between(i(5), i(1)), Transition::Forward);
        assert_eq!(Transition::between(i(2), i(2)), Transition::Hold);
        assert_eq!(Transition::between(i(1), i(6)), Transition::Skip);
        assert_eq!(Transition::between(i(1), i(7)), Transition::Fault);
        assert_eq!(Transition::between(i(7), i(0)), Transition::Fault);
        assert_eq!(Transition::between(i(0), i(1)), Transition::Recover);
        assert_eq!(Transition::between(i(7), i(4)), Transition::Recover);
    }
}
