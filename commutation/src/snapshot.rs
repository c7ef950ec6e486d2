//! Last-known commutation, shared between the edge handler and the main context

use core::cell::Cell;

use critical_section::Mutex;

use crate::dispatch::{Commutation, CommutationObserver};

/// Point-in-time copy of the dispatcher's diagnostics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    /// Most recent commutation, `None` before the first edge
    pub last: Option<Commutation>,
    /// Edges handled since boot
    pub dispatches: u32,
    /// Edges that sampled index 0 or 7
    pub invalid_readings: u32,
}

/// Written only by the edge handler (as an observer), read anywhere
///
/// Both sides go through a critical section, so a reader never sees the index of
/// one commit next to the counters of another.
pub struct SharedSnapshot {
    inner: Mutex<Cell<Snapshot>>,
}

impl SharedSnapshot {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(Snapshot {
                last: None,
                dispatches: 0,
                invalid_readings: 0,
            })),
        }
    }

    pub fn read(&self) -> Snapshot {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    fn record(&self, commutation: Commutation) {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut snap = cell.get();
            snap.last = Some(commutation);
            snap.dispatches = snap.dispatches.wrapping_add(1);
            if !commutation.index.is_valid() {
                snap.invalid_readings = snap.invalid_readings.wrapping_add(1);
            }
            cell.set(snap);
        })
    }
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl CommutationObserver for &SharedSnapshot {
    #[inline]
    fn observe(&mut self, commutation: Commutation) {
        self.record(commutation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PositionIndex;
    use crate::table::CommutationTable;

    fn commutation(raw: u8) -> Commutation {
        let index = PositionIndex::from_bits_truncate(raw);
        Commutation {
            index,
            pattern: CommutationTable::SIX_STEP.lookup(index),
        }
    }

    #[test]
    fn test_starts_empty() {
        let snapshot = SharedSnapshot::new();
        assert_eq!(snapshot.read(), Snapshot::default());
    }

    #[test]
    fn test_records_last_and_counts() {
        let snapshot = SharedSnapshot::new();
        let mut observer = &snapshot;
        for raw in [1, 3, 0, 2, 7, 6] {
            observer.observe(commutation(raw));
        }
        let snap = snapshot.read();
        assert_eq!(snap.last, Some(commutation(6)));
        assert_eq!(snap.dispatches, 6);
        assert_eq!(snap.invalid_readings, 2);
    }

    #[test]
    fn test_shared_across_threads() {
        static SNAPSHOT: SharedSnapshot = SharedSnapshot::new();
        let writer = std::thread::spawn(|| {
            let mut observer = &SNAPSHOT;
            for _ in 0..1000 {
                observer.observe(commutation(4));
            }
        });
        writer.join().unwrap();
        let snap = SNAPSHOT.read();
        assert_eq!(snap.dispatches, 1000);
        assert_eq!(snap.last.map(|c| c.index.get()), Some(4));
    }

    #[test]
    fn test_concurrent_reads_are_consistent() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const EDGES: u32 = 20_000;
        let snapshot = SharedSnapshot::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                let mut observer = &snapshot;
                // valid on even edges, invalid on odd ones
                for i in 0..EDGES {
                    observer.observe(commutation(if i % 2 == 0 { 4 } else { 7 }));
                }
                done.store(true, Ordering::Release);
            });

            s.spawn(|| {
                let mut reads = 0u32;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let snap = snapshot.read();
                    let n = snap.dispatches;
                    assert_eq!(snap.invalid_readings, n / 2, "after {n} edges");
                    let expected = match n {
                        0 => None,
                        n if n % 2 == 1 => Some(commutation(4)),
                        _ => Some(commutation(7)),
                    };
                    assert_eq!(snap.last, expected, "after {n} edges");
                    reads += 1;
                    if finished {
                        break;
                    }
                }
                assert!(reads > 0);
            });
        });

        assert_eq!(snapshot.read().dispatches, EDGES);
    }
}
