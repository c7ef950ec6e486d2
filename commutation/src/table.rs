//! Rotor position to switch pattern lookup

use crate::index::PositionIndex;
use crate::pattern::SwitchPattern;
use crate::six_step::CommutationStep;

/// Commutation table covering all 8 position indices
///
/// Only the six valid entries are supplied by the caller; indices 0 and 7 are
/// always [`SwitchPattern::ALL_OFF`]. Build tables in a `const` so the entry
/// checks in [`CommutationTable::new`] run at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommutationTable {
    entries: [SwitchPattern; 8],
}

impl CommutationTable {
    /// Standard 120° Hall six-step table, forward order 1 → 3 → 2 → 6 → 4 → 5
    ///
    /// | Index | C B A | High | Low |
    /// |-------|-------|------|-----|
    /// | 1     | 0 0 1 | A    | C   |
    /// | 2     | 0 1 0 | B    | A   |
    /// | 3     | 0 1 1 | B    | C   |
    /// | 4     | 1 0 0 | C    | B   |
    /// | 5     | 1 0 1 | A    | B   |
    /// | 6     | 1 1 0 | C    | A   |
    pub const SIX_STEP: Self = Self::from_steps();

    /// Table from the patterns for indices 1 through 6, in index order
    ///
    /// Panics if any entry is not a two-phase pattern (one high side and one low
    /// side on distinct phases).
    pub const fn new(valid: [SwitchPattern; 6]) -> Self {
        let mut entries = [SwitchPattern::ALL_OFF; 8];
        let mut i = 0;
        while i < 6 {
            assert!(
                valid[i].is_two_phase(),
                "commutation entry must drive exactly one high and one low side"
            );
            entries[i + 1] = valid[i];
            i += 1;
        }
        Self { entries }
    }

    const fn from_steps() -> Self {
        let mut valid = [SwitchPattern::ALL_OFF; 6];
        let mut i = 0;
        while i < 6 {
            valid[i] = match CommutationStep::from_index(PositionIndex::from_bits_truncate(i as u8 + 1)) {
                Some(step) => step.pattern(),
                None => SwitchPattern::ALL_OFF,
            };
            i += 1;
        }
        Self::new(valid)
    }

    #[inline]
    pub const fn lookup(&self, index: PositionIndex) -> SwitchPattern {
        self.entries[(index.get() & 0b111) as usize]
    }
}

impl Default for CommutationTable {
    fn default() -> Self {
        Self::SIX_STEP
    }
}
