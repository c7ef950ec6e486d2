//! Edge-triggered commutation: sample → lookup → commit

use crate::driver::{GateDriver, OutputPort};
use crate::index::PositionIndex;
use crate::pattern::SwitchPattern;
use crate::sampler::HallSensors;
use crate::table::CommutationTable;

/// Result of one dispatch: the sampled index and the pattern committed for it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Commutation {
    pub index: PositionIndex,
    pub pattern: SwitchPattern,
}

/// Diagnostic hook called after every commit
///
/// Runs in the edge-handler context. Implementations must return promptly and
/// never block; anything slow belongs behind a queue drained elsewhere.
pub trait CommutationObserver {
    fn observe(&mut self, commutation: Commutation);
}

impl CommutationObserver for () {
    #[inline]
    fn observe(&mut self, _: Commutation) {}
}

impl<O: CommutationObserver + ?Sized> CommutationObserver for &mut O {
    #[inline]
    fn observe(&mut self, commutation: Commutation) {
        (**self).observe(commutation)
    }
}

impl<A: CommutationObserver, B: CommutationObserver> CommutationObserver for (A, B) {
    #[inline]
    fn observe(&mut self, commutation: Commutation) {
        self.0.observe(commutation);
        self.1.observe(commutation);
    }
}

/// Commutation dispatcher, the body of the Hall edge handler
///
/// Holds no rotor state between calls: each [`dispatch`](Self::dispatch) samples
/// fresh and writes the full pattern. `dispatch` takes `&mut self`, so one handler
/// instance cannot be re-entered; run it from a single interrupt priority.
pub struct Commutator<S, P, O = ()> {
    sensors: S,
    driver: GateDriver<P>,
    table: CommutationTable,
    observer: O,
}

impl<S: HallSensors, P: OutputPort> Commutator<S, P> {
    pub fn new(sensors: S, driver: GateDriver<P>) -> Self {
        Self {
            sensors,
            driver,
            table: CommutationTable::SIX_STEP,
            observer: (),
        }
    }
}

impl<S: HallSensors, P: OutputPort, O: CommutationObserver> Commutator<S, P, O> {
    pub fn with_observer<N: CommutationObserver>(self, observer: N) -> Commutator<S, P, N> {
        Commutator {
            sensors: self.sensors,
            driver: self.driver,
            table: self.table,
            observer,
        }
    }

    pub fn with_table(mut self, table: CommutationTable) -> Self {
        self.table = table;
        self
    }

    /// Handle one sensor edge
    ///
    /// Invalid readings (0 or 7) commit all-off through the table like any other
    /// index; the next valid edge restores drive.
    #[inline]
    pub fn dispatch(&mut self) -> Commutation {
        let index = self.sensors.sample();
        let pattern = self.table.lookup(index);
        self.driver.commit(pattern);

        let commutation = Commutation { index, pattern };
        self.observer.observe(commutation);
        commutation
    }

    /// Drive all-off without sampling
    pub fn safe_state(&mut self) {
        self.driver.safe_state();
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Drive the safe state and hand back the parts
    pub fn release(self) -> (S, P, O) {
        (self.sensors, self.driver.release(), self.observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PortLayout;
    use crate::index::{SensorLayout, Transition};
    use crate::pattern::Phase;
    use crate::sampler::PortSampler;
    use crate::sim::{SimGatePort, SimHall};
    use crate::six_step::CommutationStep;
    use crate::snapshot::SharedSnapshot;

    const FORWARD: [u8; 7] = [1, 3, 2, 6, 4, 5, 1];
    const REVERSE: [u8; 7] = [1, 5, 4, 6, 2, 3, 1];

    /// Records every commutation it sees
    #[derive(Default)]
    struct Log(Vec<Commutation>);

    impl CommutationObserver for Log {
        fn observe(&mut self, commutation: Commutation) {
            self.0.push(commutation);
        }
    }

    fn rig() -> (
        SimHall,
        SimGatePort,
        Commutator<PortSampler<SimHall>, SimGatePort>,
    ) {
        let hall = SimHall::default();
        let port = SimGatePort::default();
        let commutator = Commutator::new(
            PortSampler::new(hall.clone(), SensorLayout::PB6_PB8),
            GateDriver::new(port.clone(), PortLayout::HIP4086),
        );
        (hall, port, commutator)
    }

    fn index(raw: u8) -> PositionIndex {
        PositionIndex::from_bits_truncate(raw)
    }

    #[test]
    fn test_dispatch_commits_table_entry() {
        let (hall, port, mut commutator) = rig();
        hall.set_levels(true, false, false);

        let c = commutator.dispatch();
        assert_eq!(c.index.get(), 1);
        assert_eq!(c.pattern, SwitchPattern::drive(Phase::A, Phase::C));
        assert_eq!(port.register(), 0b11_0100);
    }

    #[test]
    fn test_unchanged_sensors_commit_identically() {
        let (hall, port, mut commutator) = rig();
        hall.set_index(index(3));

        let first = commutator.dispatch();
        let reg = port.register();
        let second = commutator.dispatch();

        assert_eq!(first, second);
        assert_eq!(port.register(), reg);
        let writes = port.writes();
        assert_eq!(writes[writes.len() - 1], writes[writes.len() - 2]);
    }

    #[test]
    fn test_all_high_glitch_commits_all_off() {
        let (hall, port, mut commutator) = rig();
        hall.set_index(index(2));
        commutator.dispatch();

        hall.set_levels(true, true, true);
        let c = commutator.dispatch();
        assert_eq!(c.index, PositionIndex::ALL_HIGH);
        assert!(c.pattern.is_off());
        assert_eq!(port.register(), 0b01_0101);

        // next clean edge restores drive
        hall.set_index(index(6));
        assert_eq!(commutator.dispatch().pattern, SwitchPattern::drive(Phase::C, Phase::A));
    }

    #[test]
    fn test_all_low_commits_all_off() {
        let (hall, port, mut commutator) = rig();
        hall.set_index(PositionIndex::ALL_LOW);
        assert!(commutator.dispatch().pattern.is_off());
        assert_eq!(port.register(), 0b01_0101);
    }

    fn run_sequence(sequence: &[u8], expected: Transition) {
        let (hall, port, commutator) = rig();
        let mut commutator = commutator.with_observer(Log::default());

        for &raw in sequence {
            hall.set_index(index(raw));
            commutator.dispatch();
        }

        let log = &commutator.observer().0;
        assert_eq!(log.len(), sequence.len());
        let writes = port.writes();
        for (c, word) in log.iter().zip(&writes[1..]) {
            assert!(c.index.is_valid(), "invalid index {:?}", c.index);
            assert!(c.pattern.is_two_phase());
            assert_eq!(PortLayout::HIP4086.decode(word.levels), Some(c.pattern));
        }
        for pair in log.windows(2) {
            assert_eq!(Transition::between(pair[0].index, pair[1].index), expected);
        }
        // safe state + one write per edge
        assert_eq!(port.write_count(), 1 + sequence.len());
    }

    #[test]
    fn test_forward_six_step_sequence() {
        run_sequence(&FORWARD, Transition::Forward);
    }

    #[test]
    fn test_reverse_six_step_sequence() {
        run_sequence(&REVERSE, Transition::Reverse);
    }

    #[test]
    fn test_forward_sequence_follows_steps() {
        let (hall, _port, mut commutator) = rig();
        let mut step = CommutationStep::Step1;
        for _ in 0..12 {
            hall.set_index(step.index());
            let c = commutator.dispatch();
            assert_eq!(c.index.step(), Some(step));
            assert_eq!(c.pattern, step.pattern());
            step = step.next();
        }
    }

    #[test]
    fn test_single_sensor_edges_between_valid_states() {
        // clean transitions flip exactly one sensor, so no 0 or 7 appears in between
        for pair in FORWARD.windows(2) {
            assert_eq!((pair[0] ^ pair[1]).count_ones(), 1);
        }
    }

    #[test]
    fn test_port_never_holds_shoot_through() {
        let (hall, port, mut commutator) = rig();
        for raw in [1, 3, 7, 2, 0, 6, 4, 7, 5, 1] {
            hall.set_index(index(raw));
            commutator.dispatch();
            assert!(PortLayout::HIP4086.decode(port.register()).is_some());
        }
    }

    #[test]
    fn test_observer_pair_and_snapshot() {
        let snapshot = SharedSnapshot::new();
        let (hall, _port, commutator) = rig();
        let mut commutator = commutator.with_observer((&snapshot, Log::default()));

        hall.set_index(index(4));
        commutator.dispatch();
        hall.set_index(PositionIndex::ALL_HIGH);
        commutator.dispatch();

        let snap = snapshot.read();
        assert_eq!(snap.dispatches, 2);
        assert_eq!(snap.invalid_readings, 1);
        assert_eq!(snap.last.map(|c| c.index), Some(PositionIndex::ALL_HIGH));
        let (_, log) = commutator.observer();
        assert_eq!(log.0.len(), 2);
    }

    #[test]
    fn test_custom_table_drives_its_entries() {
        let (hall, port, commutator) = rig();
        // every valid sector drives B high and A low
        let table = CommutationTable::new([SwitchPattern::drive(Phase::B, Phase::A); 6]);
        let mut commutator = commutator.with_table(table);

        for raw in 1..=6 {
            hall.set_index(index(raw));
            assert_eq!(commutator.dispatch().pattern, SwitchPattern::drive(Phase::B, Phase::A));
            assert_eq!(port.register(), 0b01_0011);
        }
        hall.set_index(PositionIndex::ALL_HIGH);
        assert!(commutator.dispatch().pattern.is_off());
        assert_eq!(port.register(), 0b01_0101);
    }

    #[test]
    fn test_safe_state_after_drive() {
        let (hall, port, mut commutator) = rig();
        hall.set_index(index(3));
        commutator.dispatch();
        assert_eq!(port.register(), 0b11_0001);

        commutator.safe_state();
        assert_eq!(port.register(), 0b01_0101);
        // safe state + edge + safe state, no sampling involved
        assert_eq!(port.write_count(), 3);

        // the next edge drives again
        assert_eq!(commutator.dispatch().pattern, SwitchPattern::drive(Phase::B, Phase::C));
    }

    #[test]
    fn test_release_leaves_port_safe() {
        let (hall, port, mut commutator) = rig();
        hall.set_index(index(5));
        commutator.dispatch();
        let _ = commutator.release();
        assert_eq!(port.register(), 0b01_0101);
    }
}
