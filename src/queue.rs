//! Bounded FIFO event queue — a fixed-capacity ring of event descriptors.
//!
//! Grounded on `original_source/Source/_IOC_EvtDescQueue.c`: two monotonic
//! counters (`queued_count`, `proced_count`) index a fixed-size ring;
//! `queued - proced` is always in `[0, CAPACITY]`. All three operations take
//! a single mutex whose critical section is pure index arithmetic plus a
//! fixed-size copy — no allocation, no blocking, while the lock is held.

use parking_lot::Mutex;

use crate::descriptor::EvtDesc;
use crate::error::IocError;

/// Ring capacity, per spec.md §3 and `_CONLES_EVENT_MAX_QUEUING_EVTDESC`.
pub const CAPACITY: usize = 64;

struct Inner {
    queued_count: u64,
    proced_count: u64,
    slots: Vec<Option<EvtDesc>>,
}

/// A fixed-capacity, thread-safe FIFO ring of [`EvtDesc`].
pub struct EvtDescQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl EvtDescQueue {
    pub fn new() -> Self {
        Self::with_capacity(CAPACITY)
    }

    /// Construct a queue with a non-default capacity; used by tests that
    /// want to hit `TooManyQueuingEvtDesc` without 64 iterations.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Inner {
                queued_count: 0,
                proced_count: 0,
                slots,
            }),
            capacity,
        }
    }

    /// Enqueue at the tail. Fails with `TooManyQueuingEvtDesc` if full;
    /// indices are left untouched on failure.
    pub fn enqueue_last(&self, desc: EvtDesc) -> Result<(), IocError> {
        let mut inner = self.inner.lock();
        let queuing = inner.queued_count - inner.proced_count;
        debug_assert!(queuing as usize <= self.capacity);

        if queuing as usize == self.capacity {
            return Err(IocError::TooManyQueuingEvtDesc);
        }

        let pos = (inner.queued_count as usize) % self.capacity;
        inner.slots[pos] = Some(desc);
        inner.queued_count += 1;
        Ok(())
    }

    /// Dequeue from the head. Fails with `EvtDescQueueEmpty` if empty;
    /// indices are left untouched on failure.
    pub fn dequeue_first(&self) -> Result<EvtDesc, IocError> {
        let mut inner = self.inner.lock();
        let queuing = inner.queued_count - inner.proced_count;

        if queuing == 0 {
            return Err(IocError::EvtDescQueueEmpty);
        }

        let pos = (inner.proced_count as usize) % self.capacity;
        let desc = inner.slots[pos]
            .take()
            .unwrap_or_else(|| unreachable!("slot at head of a non-empty queue must be occupied"));
        inner.proced_count += 1;
        Ok(desc)
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.queued_count == inner.proced_count
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock();
        (inner.queued_count - inner.proced_count) as usize == self.capacity
    }

    /// Number of descriptors currently queued (not yet dequeued).
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        (inner.queued_count - inner.proced_count) as usize
    }
}

impl Default for EvtDescQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EvtId;

    fn evt(n: u32) -> EvtDesc {
        EvtDesc::new(EvtId::new(0, n), n)
    }

    #[test]
    fn fifo_order_preserved() {
        let q = EvtDescQueue::with_capacity(4);
        for i in 0..4 {
            q.enqueue_last(evt(i)).unwrap();
        }
        for i in 0..4 {
            let d = q.dequeue_first().unwrap();
            assert_eq!(d.evt_value, i);
        }
    }

    #[test]
    fn enqueue_full_fails_without_mutating_indices() {
        let q = EvtDescQueue::with_capacity(2);
        q.enqueue_last(evt(1)).unwrap();
        q.enqueue_last(evt(2)).unwrap();
        assert_eq!(q.enqueue_last(evt(3)), Err(IocError::TooManyQueuingEvtDesc));
        assert_eq!(q.len(), 2);
        // Still strictly FIFO after the failed push.
        assert_eq!(q.dequeue_first().unwrap().evt_value, 1);
        assert_eq!(q.dequeue_first().unwrap().evt_value, 2);
    }

    #[test]
    fn dequeue_empty_fails_without_mutating_indices() {
        let q = EvtDescQueue::with_capacity(4);
        assert_eq!(q.dequeue_first(), Err(IocError::EvtDescQueueEmpty));
        assert!(q.is_empty());
    }

    #[test]
    fn wraps_around_ring_boundary() {
        let q = EvtDescQueue::with_capacity(2);
        for round in 0..5 {
            q.enqueue_last(evt(round)).unwrap();
            let d = q.dequeue_first().unwrap();
            assert_eq!(d.evt_value, round);
        }
    }
}
