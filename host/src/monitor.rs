//! Checks the commutation stream reported by the device

use oxihall_commutation::{CommutationTable, PositionIndex, Transition};
use oxihall_protocol::CommutationEvent;

/// What one event said about the motor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First valid event seen
    First,
    /// Classified against the previous event
    Step(Transition),
    /// Index or pattern unreadable, or pattern not the table entry for the index
    Corrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStats {
    pub events: u64,
    pub forward: u64,
    pub reverse: u64,
    pub holds: u64,
    pub skips: u64,
    pub faults: u64,
    pub recoveries: u64,
    pub corrupt: u64,
    /// Events the device dispatched but never delivered (sequence gaps)
    pub missed: u64,
}

#[derive(Debug, Default)]
pub struct SequenceMonitor {
    last: Option<(u32, PositionIndex)>,
    stats: MonitorStats,
}

impl SequenceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &CommutationEvent) -> Observation {
        self.stats.events += 1;

        let Some(index) = event.index() else {
            self.stats.corrupt += 1;
            return Observation::Corrupt;
        };
        if event.pattern() != Some(CommutationTable::SIX_STEP.lookup(index)) {
            self.stats.corrupt += 1;
            return Observation::Corrupt;
        }

        let observation = match self.last {
            None => Observation::First,
            Some((seq, prev)) => {
                let gap = event.seq.wrapping_sub(seq).wrapping_sub(1);
                // Only count plausible gaps, a reset device restarts at 1
                if gap < u32::MAX / 2 {
                    self.stats.missed += u64::from(gap);
                }
                Observation::Step(Transition::between(prev, index))
            }
        };

        if let Observation::Step(t) = observation {
            match t {
                Transition::Forward => self.stats.forward += 1,
                Transition::Reverse => self.stats.reverse += 1,
                Transition::Hold => self.stats.holds += 1,
                Transition::Skip => self.stats.skips += 1,
                Transition::Fault => self.stats.faults += 1,
                Transition::Recover => self.stats.recoveries += 1,
            }
        }
        self.last = Some((event.seq, index));
        observation
    }

    /// Dominant rotation direction so far
    pub fn direction(&self) -> Option<Direction> {
        use std::cmp::Ordering::*;
        match self.stats.forward.cmp(&self.stats.reverse) {
            Greater => Some(Direction::Forward),
            Less => Some(Direction::Reverse),
            Equal => None,
        }
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u32, raw: u8) -> CommutationEvent {
        let index = PositionIndex::from_bits_truncate(raw);
        CommutationEvent {
            seq,
            index: raw,
            pattern: CommutationTable::SIX_STEP.lookup(index).bits(),
        }
    }

    #[test]
    fn test_forward_rotation() {
        let mut m = SequenceMonitor::new();
        let seq = [1, 3, 2, 6, 4, 5, 1];
        assert_eq!(m.observe(&event(1, seq[0])), Observation::First);
        for (i, &raw) in seq.iter().enumerate().skip(1) {
            assert_eq!(
                m.observe(&event(i as u32 + 1, raw)),
                Observation::Step(Transition::Forward)
            );
        }
        assert_eq!(m.direction(), Some(Direction::Forward));
        assert_eq!(m.stats().forward, 6);
        assert_eq!(m.stats().missed, 0);
    }

    #[test]
    fn test_reverse_rotation() {
        let mut m = SequenceMonitor::new();
        for (i, raw) in [1, 5, 4, 6, 2, 3].into_iter().enumerate() {
            m.observe(&event(i as u32 + 1, raw));
        }
        assert_eq!(m.direction(), Some(Direction::Reverse));
    }

    #[test]
    fn test_fault_and_recovery() {
        let mut m = SequenceMonitor::new();
        m.observe(&event(1, 1));
        assert_eq!(m.observe(&event(2, 7)), Observation::Step(Transition::Fault));
        assert_eq!(m.observe(&event(3, 0)), Observation::Step(Transition::Fault));
        assert_eq!(m.observe(&event(4, 3)), Observation::Step(Transition::Recover));
        assert_eq!(m.observe(&event(5, 2)), Observation::Step(Transition::Forward));
        assert_eq!(m.stats().faults, 2);
        assert_eq!(m.stats().recoveries, 1);
    }

    #[test]
    fn test_sequence_gap_counts_missed() {
        let mut m = SequenceMonitor::new();
        m.observe(&event(10, 1));
        assert_eq!(m.observe(&event(14, 6)), Observation::Step(Transition::Skip));
        assert_eq!(m.stats().missed, 3);
        assert_eq!(m.stats().skips, 1);
    }

    #[test]
    fn test_rejects_pattern_that_does_not_match_table() {
        let mut m = SequenceMonitor::new();
        let mut bad = event(1, 1);
        bad.pattern = event(1, 2).pattern;
        assert_eq!(m.observe(&bad), Observation::Corrupt);

        let shoot_through = CommutationEvent {
            seq: 2,
            index: 1,
            pattern: 0b00_0011,
        };
        assert_eq!(m.observe(&shoot_through), Observation::Corrupt);
        assert_eq!(m.stats().corrupt, 2);
        assert_eq!(m.direction(), None);
    }
}
