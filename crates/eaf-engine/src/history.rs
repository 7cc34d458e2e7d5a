//! Bounded retention of past snapshots.
//!
//! [`HistoryRing`] is a FIFO of `Arc<SimulationSnapshot>`; the oldest entry
//! is evicted once capacity is reached. Only the clock appends. Readers go
//! through [`SharedHistory`], which wraps the ring in an `RwLock`.

use std::collections::VecDeque;
use std::ops::RangeBounds;
use std::sync::{Arc, PoisonError, RwLock};

use crate::snapshot::SimulationSnapshot;

#[derive(Debug, Clone)]
pub struct HistoryRing {
    entries: VecDeque<Arc<SimulationSnapshot>>,
    capacity: usize,
    total_appended: u64,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Append a snapshot, returning the evicted entry if the ring was full.
    pub(crate) fn append(
        &mut self,
        snapshot: Arc<SimulationSnapshot>,
    ) -> Option<Arc<SimulationSnapshot>> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(snapshot);
        self.total_appended += 1;
        evicted
    }

    pub fn latest(&self) -> Option<Arc<SimulationSnapshot>> {
        self.entries.back().cloned()
    }

    /// Up to `n` most recent snapshots, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<Arc<SimulationSnapshot>> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Retained snapshots whose tick falls in `ticks`, oldest first.
    pub fn range(&self, ticks: impl RangeBounds<u64>) -> Vec<Arc<SimulationSnapshot>> {
        self.entries
            .iter()
            .filter(|snap| ticks.contains(&snap.tick))
            .cloned()
            .collect()
    }

    /// Retained snapshots with `t0 <= simulation_time_s <= t1`.
    pub fn time_range(&self, t0: f64, t1: f64) -> Vec<Arc<SimulationSnapshot>> {
        self.entries
            .iter()
            .filter(|snap| snap.simulation_time_s >= t0 && snap.simulation_time_s <= t1)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SimulationSnapshot>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends since creation, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }
}

/// Cloneable read handle on the clock's history.
#[derive(Debug, Clone)]
pub struct SharedHistory {
    inner: Arc<RwLock<HistoryRing>>,
}

impl SharedHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HistoryRing::new(capacity))),
        }
    }

    pub(crate) fn append(&self, snapshot: Arc<SimulationSnapshot>) {
        let mut ring = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        ring.append(snapshot);
    }

    /// Run `f` against the ring under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&HistoryRing) -> R) -> R {
        let ring = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&ring)
    }

    pub fn latest(&self) -> Option<Arc<SimulationSnapshot>> {
        self.read(HistoryRing::latest)
    }

    pub fn last_n(&self, n: usize) -> Vec<Arc<SimulationSnapshot>> {
        self.read(|ring| ring.last_n(n))
    }

    pub fn range(&self, ticks: impl RangeBounds<u64>) -> Vec<Arc<SimulationSnapshot>> {
        self.read(|ring| ring.range(ticks))
    }

    pub fn time_range(&self, t0: f64, t1: f64) -> Vec<Arc<SimulationSnapshot>> {
        self.read(|ring| ring.time_range(t0, t1))
    }

    pub fn len(&self) -> usize {
        self.read(HistoryRing::len)
    }

    pub fn is_empty(&self) -> bool {
        self.read(HistoryRing::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::sample_snapshot;

    fn filled(capacity: usize, ticks: u64) -> HistoryRing {
        let mut ring = HistoryRing::new(capacity);
        for tick in 1..=ticks {
            ring.append(Arc::new(sample_snapshot(tick)));
        }
        ring
    }

    #[test]
    fn evicts_oldest_first() {
        let mut ring = filled(3, 3);
        let evicted = ring.append(Arc::new(sample_snapshot(4))).unwrap();
        assert_eq!(evicted.tick, 1);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.capacity(), 3);
        assert_eq!(ring.total_appended(), 4);
        let ticks: Vec<u64> = ring.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn last_n_is_oldest_first_and_bounded() {
        let ring = filled(10, 5);
        let ticks: Vec<u64> = ring.last_n(2).iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![4, 5]);
        assert_eq!(ring.last_n(50).len(), 5);
        assert!(ring.last_n(0).is_empty());
        assert_eq!(ring.latest().unwrap().tick, 5);
    }

    #[test]
    fn range_queries() {
        let ring = filled(4, 10);
        let ticks: Vec<u64> = ring.range(8..).iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![8, 9, 10]);
        // Evicted ticks are simply absent.
        assert!(ring.range(1..=6).is_empty());
        let by_time: Vec<u64> = ring.time_range(7.5, 9.0).iter().map(|s| s.tick).collect();
        assert_eq!(by_time, vec![8, 9]);
    }

    #[test]
    fn shared_handle_sees_appends() {
        let shared = SharedHistory::new(2);
        let reader = shared.clone();
        assert!(reader.is_empty());
        shared.append(Arc::new(sample_snapshot(1)));
        shared.append(Arc::new(sample_snapshot(2)));
        shared.append(Arc::new(sample_snapshot(3)));
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.latest().unwrap().tick, 3);
        assert_eq!(reader.read(HistoryRing::total_appended), 3);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::snapshot::tests::sample_snapshot;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn retains_the_newest_ticks(capacity in 1_usize..32, count in 0_u64..100) {
            let mut ring = HistoryRing::new(capacity);
            for tick in 1..=count {
                let evicted = ring.append(Arc::new(sample_snapshot(tick)));
                // Eviction starts exactly once the ring is full.
                let oldest = tick.checked_sub(capacity as u64).filter(|t| *t > 0);
                prop_assert_eq!(evicted.map(|s| s.tick), oldest);
            }
            let kept = (count as usize).min(capacity);
            prop_assert_eq!(ring.len(), kept);
            prop_assert_eq!(ring.total_appended(), count);
            let ticks: Vec<u64> = ring.iter().map(|s| s.tick).collect();
            let expected: Vec<u64> = (count + 1 - kept as u64..=count).collect();
            prop_assert_eq!(ticks, expected);
        }
    }
}
