//! Splits the RTT byte stream into COBS frames

use cobs_acc::{CobsAccumulator, FeedResult};

/// Accumulator for COBS-framed ergot data across RTT reads
pub struct FrameSplitter {
    acc: CobsAccumulator<Box<[u8]>>,
}

impl FrameSplitter {
    pub fn new(limit: usize) -> Self {
        Self { acc: CobsAccumulator::new_boxslice(limit) }
    }

    /// Feed one read; `on_frame` gets each decoded frame.
    /// Returns how many overflow or decode errors the accumulator reported.
    pub fn feed(&mut self, bytes: &mut [u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut errors = 0;
        let mut window = bytes;
        while !window.is_empty() {
            window = match self.acc.feed_raw(window) {
                FeedResult::Consumed => break,
                FeedResult::OverFull(new_w) | FeedResult::DecodeError(new_w) => {
                    errors += 1;
                    new_w
                }
                FeedResult::Success { data, remaining }
                | FeedResult::SuccessInput { data, remaining } => {
                    on_frame(data);
                    remaining
                }
            };
        }
        errors
    }
}
