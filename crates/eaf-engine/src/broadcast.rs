//! Fan-out of snapshots and heartbeats to subscribers.
//!
//! Every subscriber owns a bounded crossbeam queue. Publishing never blocks:
//! when a queue is full the broadcaster evicts that subscriber's oldest
//! buffered event through a receiver clone it keeps, bumps the subscriber's
//! missed-frame counter and enqueues the new event.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::{ControlError, ControlResult};
use crate::snapshot::FurnaceEvent;

struct Slot {
    id: u64,
    tx: Sender<FurnaceEvent>,
    evict: Receiver<FurnaceEvent>,
    missed: Arc<AtomicU64>,
}

impl Slot {
    fn offer(&self, mut event: FurnaceEvent) {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    if self.evict.try_recv().is_ok() {
                        let missed = self.missed.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(subscriber = self.id, missed, "subscriber lagging, dropped oldest event");
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

struct Inner {
    slots: Mutex<Vec<Slot>>,
    queue_bound: usize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Inner {
    fn remove(&self, id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|slot| slot.id != id);
    }
}

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(queue_bound: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(Vec::new()),
                queue_bound: queue_bound.max(1),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Receive every event published from now on.
    ///
    /// Subscribing after [`close`](Self::close) yields an already-ended stream.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = crossbeam_channel::bounded(self.inner.queue_bound);
        let missed = Arc::new(AtomicU64::new(0));
        {
            let mut slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.inner.closed.load(Ordering::Acquire) {
                slots.push(Slot {
                    id,
                    tx,
                    evict: rx.clone(),
                    missed: Arc::clone(&missed),
                });
                debug!(subscriber = id, "subscribed");
            }
        }
        Subscription {
            id,
            rx,
            missed,
            owner: Arc::downgrade(&self.inner),
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.unsubscribe();
    }

    /// Deliver `event` to every live subscriber. Returns how many were offered it.
    pub fn publish(&self, event: FurnaceEvent) -> usize {
        if self.inner.closed.load(Ordering::Acquire) {
            return 0;
        }
        let slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.iter() {
            slot.offer(event.clone());
        }
        slots.len()
    }

    /// End every stream. Buffered events stay readable.
    pub fn close(&self) {
        let mut slots = self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.closed.store(true, Ordering::Release);
        let count = slots.len();
        slots.clear();
        debug!(subscribers = count, "broadcaster closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One subscriber's end of the stream. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: Receiver<FurnaceEvent>,
    missed: Arc<AtomicU64>,
    owner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the next event. Errors once the stream ended and is drained.
    pub fn recv(&self) -> ControlResult<FurnaceEvent> {
        self.rx.recv().map_err(|_| ControlError::SubscriptionClosed)
    }

    /// `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> ControlResult<Option<FurnaceEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ControlError::SubscriptionClosed),
        }
    }

    pub fn try_recv(&self) -> Option<FurnaceEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything buffered right now.
    pub fn drain(&self) -> Vec<FurnaceEvent> {
        self.rx.try_iter().collect()
    }

    /// Blocking iterator that ends with the stream.
    pub fn iter(&self) -> impl Iterator<Item = FurnaceEvent> + '_ {
        self.rx.iter()
    }

    /// Events dropped because this subscriber fell behind.
    pub fn missed_frames(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.owner.upgrade() {
            inner.remove(self.id);
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::snapshot::tests::sample_snapshot;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// `true` publishes the next tick, `false` drains the subscriber.
        #[test]
        fn every_event_is_received_or_counted_missed(
            bound in 1_usize..8,
            ops in prop::collection::vec(any::<bool>(), 0..120),
        ) {
            let broadcaster = Broadcaster::new(bound);
            let sub = broadcaster.subscribe();
            let mut published = 0_u64;
            let mut received = Vec::new();
            for publish in ops {
                if publish {
                    published += 1;
                    broadcaster.publish(FurnaceEvent::Snapshot(Arc::new(sample_snapshot(published))));
                } else {
                    received.extend(sub.drain().iter().filter_map(|e| e.as_snapshot().map(|s| s.tick)));
                }
                prop_assert!(sub.pending() <= bound);
            }
            received.extend(sub.drain().iter().filter_map(|e| e.as_snapshot().map(|s| s.tick)));

            prop_assert_eq!(received.len() as u64 + sub.missed_frames(), published);
            prop_assert!(received.windows(2).all(|w| w[0] < w[1]));
            if published > 0 {
                prop_assert_eq!(received.last().copied(), Some(published));
            }
        }
    }
}
