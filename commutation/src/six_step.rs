//! 6-step commutation sectors for a BLDC motor with 120° Hall sensors

use crate::index::PositionIndex;
use crate::pattern::{Phase, SwitchPattern};

/// 6-step commutation sector
///
/// Each step energizes 2 of the 3 phases:
/// - One phase driven high
/// - One phase driven low
/// - One phase floating (high-Z)
///
/// Steps are numbered in forward electrical order. Each step is selected by exactly
/// one valid Hall state (see [`CommutationStep::index`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CommutationStep {
    Step0 = 0, // A+, B-, C floating  (Hall C B A = 1 0 1)
    Step1 = 1, // A+, C-, B floating  (Hall C B A = 0 0 1)
    Step2 = 2, // B+, C-, A floating  (Hall C B A = 0 1 1)
    Step3 = 3, // B+, A-, C floating  (Hall C B A = 0 1 0)
    Step4 = 4, // C+, A-, B floating  (Hall C B A = 1 1 0)
    Step5 = 5, // C+, B-, A floating  (Hall C B A = 1 0 0)
}

impl CommutationStep {
    pub const ALL: [CommutationStep; 6] = [
        Self::Step0,
        Self::Step1,
        Self::Step2,
        Self::Step3,
        Self::Step4,
        Self::Step5,
    ];

    /// Advance to the next commutation step (forward rotation)
    pub const fn next(self) -> Self {
        match self {
            Self::Step0 => Self::Step1,
            Self::Step1 => Self::Step2,
            Self::Step2 => Self::Step3,
            Self::Step3 => Self::Step4,
            Self::Step4 => Self::Step5,
            Self::Step5 => Self::Step0,
        }
    }

    /// Step before this one in forward order
    pub const fn prev(self) -> Self {
        match self {
            Self::Step0 => Self::Step5,
            Self::Step1 => Self::Step0,
            Self::Step2 => Self::Step1,
            Self::Step3 => Self::Step2,
            Self::Step4 => Self::Step3,
            Self::Step5 => Self::Step4,
        }
    }

    /// Get the step number (0-5)
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Conducting pair for this step as (high-side phase, low-side phase)
    pub const fn conducting(self) -> (Phase, Phase) {
        match self {
            Self::Step0 => (Phase::A, Phase::B),
            Self::Step1 => (Phase::A, Phase::C),
            Self::Step2 => (Phase::B, Phase::C),
            Self::Step3 => (Phase::B, Phase::A),
            Self::Step4 => (Phase::C, Phase::A),
            Self::Step5 => (Phase::C, Phase::B),
        }
    }

    pub const fn pattern(self) -> SwitchPattern {
        let (high, low) = self.conducting();
        SwitchPattern::drive(high, low)
    }

    /// Hall state under which this step is applied
    pub const fn index(self) -> PositionIndex {
        PositionIndex::from_bits_truncate(match self {
            Self::Step0 => 0b101,
            Self::Step1 => 0b001,
            Self::Step2 => 0b011,
            Self::Step3 => 0b010,
            Self::Step4 => 0b110,
            Self::Step5 => 0b100,
        })
    }

    /// Step selected by a Hall state, `None` for the invalid states 0 and 7
    pub const fn from_index(index: PositionIndex) -> Option<Self> {
        match index.get() {
            0b101 => Some(Self::Step0),
            0b001 => Some(Self::Step1),
            0b011 => Some(Self::Step2),
            0b010 => Some(Self::Step3),
            0b110 => Some(Self::Step4),
            0b100 => Some(Self::Step5),
            _ => None,
        }
    }
}
