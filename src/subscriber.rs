//! Bounded subscriber list: the `{callback, private-ctx, event-id filter}`
//! records attached to a consumer link or the Conles auto-link.
//!
//! `dispatch` holds the list mutex for the full duration of every matching
//! callback invocation — this is deliberate (spec.md §4.2, §5): it is how
//! FIFO-transport and Conles dispatch both guarantee "at most one callback
//! runs at a time per link/auto-link". A subscriber callback must never
//! call back into `subscribe`/`unsubscribe` on the same list or it will
//! deadlock on this same mutex.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::{EvtDesc, EvtId};
use crate::error::IocError;

/// The callback a subscriber registers. Takes the delivered event; any
/// private context the caller needs should be captured in the closure,
/// which is the idiomatic Rust analogue of a C `(callback, ctx)` pair.
pub type EvtCallback = dyn Fn(&EvtDesc) + Send + Sync;

/// A single subscriber record. Identity for conflict/removal purposes is
/// `Arc::ptr_eq` on the boxed callback — the caller must retain the `Arc`
/// handle returned by `insert` to later `remove` it.
pub struct Subscriber {
    callback: Arc<EvtCallback>,
    evt_ids: Vec<EvtId>,
}

impl Subscriber {
    pub fn new(callback: Arc<EvtCallback>, evt_ids: Vec<EvtId>) -> Self {
        Self { callback, evt_ids }
    }

    fn matches(&self, evt_id: EvtId) -> bool {
        self.evt_ids.contains(&evt_id)
    }
}

/// A fixed-capacity list of [`Subscriber`] records.
pub struct SubscriberList {
    capacity: usize,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl SubscriberList {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Insert a new subscriber. Fails with `ConflictEventConsumer` if a
    /// subscriber with the same callback identity is already present, or
    /// `TooManyEventConsumer` if the list is at capacity.
    pub fn insert(&self, callback: Arc<EvtCallback>, evt_ids: Vec<EvtId>) -> Result<Arc<Subscriber>, IocError> {
        let mut subs = self.subscribers.lock();

        if subs.iter().any(|s| Arc::ptr_eq(&s.callback, &callback)) {
            return Err(IocError::ConflictEventConsumer);
        }
        if subs.len() >= self.capacity {
            return Err(IocError::TooManyEventConsumer);
        }

        let sub = Arc::new(Subscriber::new(callback, evt_ids));
        subs.push(sub.clone());
        Ok(sub)
    }

    /// Remove a previously inserted subscriber by its handle.
    pub fn remove(&self, handle: &Arc<Subscriber>) -> Result<(), IocError> {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| !Arc::ptr_eq(s, handle));
        if subs.len() == before {
            Err(IocError::NotExistLink)
        } else {
            Ok(())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Visit every present subscriber whose filter matches `desc.evt_id`,
    /// invoking its callback while holding the list mutex. Returns the
    /// number of subscribers the event was delivered to.
    pub fn dispatch(&self, desc: &EvtDesc) -> usize {
        let subs = self.subscribers.lock();
        let mut delivered = 0;
        for sub in subs.iter() {
            if sub.matches(desc.evt_id) {
                (sub.callback)(desc);
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn evt(id: EvtId) -> EvtDesc {
        EvtDesc::new(id, 0)
    }

    #[test]
    fn double_subscribe_same_identity_conflicts() {
        let list = SubscriberList::new(4);
        let cb: Arc<EvtCallback> = Arc::new(|_| {});
        list.insert(cb.clone(), vec![EvtId::new(0, 1)]).unwrap();
        assert_eq!(
            list.insert(cb, vec![EvtId::new(0, 1)]),
            Err(IocError::ConflictEventConsumer)
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn capacity_enforced() {
        let list = SubscriberList::new(1);
        list.insert(Arc::new(|_| {}), vec![EvtId::new(0, 1)]).unwrap();
        assert_eq!(
            list.insert(Arc::new(|_| {}), vec![EvtId::new(0, 1)]),
            Err(IocError::TooManyEventConsumer)
        );
    }

    #[test]
    fn dispatch_only_matching_filter() {
        let list = SubscriberList::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        list.insert(
            Arc::new(move |_: &EvtDesc| {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
            vec![EvtId::new(0, 1)],
        )
        .unwrap();

        list.dispatch(&evt(EvtId::new(0, 1)));
        list.dispatch(&evt(EvtId::new(0, 2)));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_then_dispatch_never_invokes() {
        let list = SubscriberList::new(4);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let handle = list
            .insert(
                Arc::new(move |_: &EvtDesc| {
                    count2.fetch_add(1, Ordering::SeqCst);
                }),
                vec![EvtId::new(0, 1)],
            )
            .unwrap();

        list.remove(&handle).unwrap();
        assert_eq!(list.remove(&handle), Err(IocError::NotExistLink));

        list.dispatch(&evt(EvtId::new(0, 1)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
