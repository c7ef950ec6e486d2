//! Hall-sensor six-step commutation for three-phase BLDC motors
//!
//! The pipeline run on every Hall edge:
//!
//! ```text
//! HallSensors::sample ─► CommutationTable::lookup ─► GateDriver::commit
//!    (PositionIndex)          (SwitchPattern)           (PortWord)
//! ```
//!
//! [`Commutator::dispatch`] runs it once. Index bit order is `bit0 = A`,
//! `bit1 = B`, `bit2 = C`; indices 0 and 7 always commit all-off. Patterns are
//! polarity free; [`PortLayout`] turns them into pin levels for a specific gate
//! driver.

#![cfg_attr(not(test), no_std)]

pub mod dispatch;
pub mod driver;
pub mod index;
pub mod pattern;
pub mod sampler;
pub mod six_step;
pub mod snapshot;
pub mod table;

#[cfg(test)]
mod sim;

pub use dispatch::{Commutation, CommutationObserver, Commutator};
pub use driver::{CriticalSectionPort, GateDriver, OutputPort, PinBank, Polarity, PortLayout, PortWord, SwitchLine};
pub use index::{PositionIndex, SensorLayout, Transition};
pub use pattern::{Leg, Phase, SwitchPattern};
pub use sampler::{HallPins, HallSensors, InputPort, PortSampler};
pub use six_step::CommutationStep;
pub use snapshot::{SharedSnapshot, Snapshot};
pub use table::CommutationTable;
