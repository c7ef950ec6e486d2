//! Simulated ports standing in for GPIO registers in tests

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::driver::{OutputPort, PortWord};
use crate::index::{PositionIndex, SensorLayout};
use crate::sampler::InputPort;

/// Hall input register (layout [`SensorLayout::PB6_PB8`] for the helpers)
#[derive(Clone, Default)]
pub struct SimHall(Rc<Cell<u16>>);

impl SimHall {
    pub fn set_word(&self, word: u16) {
        self.0.set(word);
    }

    pub fn set_index(&self, index: PositionIndex) {
        self.set_word(SensorLayout::PB6_PB8.word(index));
    }

    pub fn set_levels(&self, a: bool, b: bool, c: bool) {
        self.set_index(PositionIndex::from_levels(a, b, c));
    }
}

impl InputPort for SimHall {
    fn read(&mut self) -> u16 {
        self.0.get()
    }
}

#[derive(Default)]
struct PortState {
    register: u16,
    writes: Vec<PortWord>,
}

/// Output register that applies each masked write in one step and keeps a log
#[derive(Clone, Default)]
pub struct SimGatePort(Rc<RefCell<PortState>>);

impl SimGatePort {
    pub fn register(&self) -> u16 {
        self.0.borrow().register
    }

    pub fn writes(&self) -> Vec<PortWord> {
        self.0.borrow().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.0.borrow().writes.len()
    }
}

impl OutputPort for SimGatePort {
    fn write(&mut self, word: PortWord) {
        let mut state = self.0.borrow_mut();
        state.register = (state.register & !word.mask) | (word.levels & word.mask);
        state.writes.push(word);
    }
}

/// Single input line
#[derive(Clone, Default)]
pub struct SimPin(Rc<Cell<bool>>);

impl SimPin {
    pub fn set(&self, high: bool) {
        self.0.set(high);
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

/// Output line on a shared register; logs the whole register after every change
pub struct RecordingPin {
    bit: u8,
    register: Rc<RefCell<u16>>,
    log: Rc<RefCell<Vec<u16>>>,
}

impl RecordingPin {
    pub fn new(bit: u8, register: Rc<RefCell<u16>>, log: Rc<RefCell<Vec<u16>>>) -> Self {
        Self { bit, register, log }
    }

    fn set(&mut self, high: bool) {
        let mut reg = self.register.borrow_mut();
        if high {
            *reg |= 1 << self.bit;
        } else {
            *reg &= !(1 << self.bit);
        }
        self.log.borrow_mut().push(*reg);
    }
}

impl ErrorType for RecordingPin {
    type Error = Infallible;
}

impl OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}
