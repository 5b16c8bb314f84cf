//! Commit bookkeeping for consumed queue messages.
//!
//! Kafka commits are cumulative: committing offset `n` on a partition marks
//! every earlier message consumed. Batches are acknowledged out of order (a
//! parked retry, a later batch finishing first, a message with no job), so
//! the consumer may only commit up to the first message on each partition
//! that is still in flight.

use std::collections::{BTreeMap, HashMap};

use crate::queue::MessageOffset;

#[derive(Debug, Default)]
pub struct OffsetTracker {
    /// Per `(topic, partition)`, every tracked offset and whether it is done.
    partitions: HashMap<(String, i32), BTreeMap<i64, bool>>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a message has been read and is now in flight.
    pub fn track(&mut self, offset: &MessageOffset) {
        let (topic, partition, offset) = offset;
        self.partitions
            .entry((topic.clone(), *partition))
            .or_default()
            .insert(*offset, false);
    }

    /// Mark messages as handled.
    ///
    /// Returns, for each partition whose committable position moved, the
    /// highest offset below which every tracked message is done. Offsets that
    /// were never tracked are ignored.
    pub fn complete(&mut self, offsets: &[MessageOffset]) -> Vec<MessageOffset> {
        let mut touched = Vec::new();
        for (topic, partition, offset) in offsets {
            let key = (topic.clone(), *partition);
            if let Some(done) = self
                .partitions
                .get_mut(&key)
                .and_then(|tracked| tracked.get_mut(offset))
            {
                *done = true;
                if !touched.contains(&key) {
                    touched.push(key);
                }
            }
        }

        let mut committable = Vec::new();
        for key in touched {
            let Some(tracked) = self.partitions.get_mut(&key) else {
                continue;
            };
            let mut last_done = None;
            while let Some(entry) = tracked.first_entry() {
                if !*entry.get() {
                    break;
                }
                last_done = Some(*entry.key());
                entry.remove();
            }
            if let Some(offset) = last_done {
                committable.push((key.0, key.1, offset));
            }
        }
        committable
    }

    /// Forget the given messages and everything after them on the same
    /// partitions, returning the earliest forgotten offset per partition.
    ///
    /// Used when a batch is rejected: the consumer seeks back to the returned
    /// offsets and every forgotten message is read and tracked again.
    pub fn rewind(&mut self, offsets: &[MessageOffset]) -> Vec<MessageOffset> {
        let mut earliest: HashMap<(String, i32), i64> = HashMap::new();
        for (topic, partition, offset) in offsets {
            let key = (topic.clone(), *partition);
            let tracked = self
                .partitions
                .get(&key)
                .map(|tracked| tracked.contains_key(offset))
                .unwrap_or(false);
            if !tracked {
                continue;
            }
            earliest
                .entry(key)
                .and_modify(|current| *current = (*current).min(*offset))
                .or_insert(*offset);
        }

        let mut rewound = Vec::with_capacity(earliest.len());
        for ((topic, partition), offset) in earliest {
            if let Some(tracked) = self.partitions.get_mut(&(topic.clone(), partition)) {
                tracked.split_off(&offset);
            }
            rewound.push((topic, partition, offset));
        }
        rewound
    }

    /// Number of messages read but not yet committable.
    pub fn in_flight(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }
}
