//! The Conles (connection-less) auto-link: a process-wide event bus with
//! no explicit service/link setup. One bounded queue, one subscriber list,
//! one dedicated dispatch thread — exactly spec.md §4.7.
//!
//! Grounded on `original_source/Source/_IOC_ConlesEvent.c`'s post/dispatch
//! split: `post_evt` enqueues (or, in sync mode, waits for room) and a
//! single background thread drains the queue and drives subscriber
//! callbacks one at a time, serialized by [`crate::subscriber::SubscriberList::dispatch`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::descriptor::{EvtDesc, EvtId};
use crate::error::IocError;
use crate::queue::EvtDescQueue;
use crate::subscriber::{EvtCallback, Subscriber, SubscriberList};
use crate::types::{Blocking, Mode, Options};

/// Subscriber list capacity for the Conles bus, per spec.md §4.9.
pub const CONLES_SUBSCRIBER_CAPACITY: usize = 16;

struct Signal {
    mutex: Mutex<SignalState>,
    condvar: Condvar,
}

#[derive(Default)]
struct SignalState {
    /// Set when the dispatch thread should wake and re-check the queue,
    /// independent of whether anything was actually enqueued (covers
    /// `force_proc_evt`/`wakeup_proc_evt`).
    wake_requested: bool,
    shutdown: bool,
}

/// The process-wide Conles auto-link bus.
pub struct ConlesBus {
    queue: Arc<EvtDescQueue>,
    subscribers: Arc<SubscriberList>,
    signal: Arc<Signal>,
    dispatcher: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl ConlesBus {
    pub fn new() -> Self {
        Self::with_capacities(crate::queue::CAPACITY, CONLES_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacities(queue_capacity: usize, subscriber_capacity: usize) -> Self {
        let queue = Arc::new(EvtDescQueue::with_capacity(queue_capacity));
        let subscribers = Arc::new(SubscriberList::new(subscriber_capacity));
        let signal = Arc::new(Signal {
            mutex: Mutex::new(SignalState::default()),
            condvar: Condvar::new(),
        });

        let dispatcher = {
            let queue = queue.clone();
            let subscribers = subscribers.clone();
            let signal = signal.clone();
            std::thread::spawn(move || Self::dispatch_loop(queue, subscribers, signal))
        };

        Self {
            queue,
            subscribers,
            signal,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    fn dispatch_loop(queue: Arc<EvtDescQueue>, subscribers: Arc<SubscriberList>, signal: Arc<Signal>) {
        loop {
            match queue.dequeue_first() {
                Ok(desc) => {
                    subscribers.dispatch(&desc);
                    continue;
                }
                Err(IocError::EvtDescQueueEmpty) => {}
                Err(_) => unreachable!("dequeue_first only ever fails with EvtDescQueueEmpty"),
            }

            let mut state = signal.mutex.lock();
            if state.shutdown {
                return;
            }
            if !state.wake_requested {
                signal.condvar.wait_for(&mut state, Duration::from_millis(100));
            }
            state.wake_requested = false;
        }
    }

    fn notify(&self) {
        let mut state = self.signal.mutex.lock();
        state.wake_requested = true;
        self.signal.condvar.notify_one();
    }

    /// Post an event through the bus. Honors the full `{Sync, Async} x
    /// {Block, NonBlock, Timeout}` option matrix from spec.md §4.7:
    /// - `Sync`, queue empty: dispatch directly on the caller's thread,
    ///   bypassing the queue and the dispatch thread entirely.
    /// - `Sync`, queue non-empty, `NonBlock`/zero-timeout: fails with
    ///   `TooLongEmptyingEvtDescQueue` rather than dispatching out of
    ///   order ahead of what's already queued.
    /// - `Sync`, queue non-empty, `Block`/`Timeout`: retries with backoff
    ///   until the queue drains, then dispatches; `TooLongEmptyingEvtDescQueue`
    ///   if the deadline passes first.
    /// - `Async`: enqueue and return; fails with `TooManyQueuingEvtDesc`
    ///   if full (NonBlock/zero-timeout or deadline exhausted), else
    ///   retries until room frees up.
    pub fn post_evt(&self, desc: EvtDesc, opts: Options) -> Result<(), IocError> {
        if self.subscribers.is_empty() {
            return Err(IocError::NoEventConsumer);
        }

        match opts.mode {
            Mode::Sync => {
                let deadline = match opts.blocking {
                    Blocking::Block => None,
                    Blocking::NonBlock => Some(Instant::now()),
                    Blocking::Timeout(d) => Some(Instant::now() + d),
                };

                loop {
                    if self.queue.is_empty() {
                        let delivered = self.subscribers.dispatch(&desc);
                        return if delivered == 0 {
                            Err(IocError::NoEventConsumer)
                        } else {
                            Ok(())
                        };
                    }
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(IocError::TooLongEmptyingEvtDescQueue);
                        }
                    }
                    std::thread::sleep(Duration::from_micros(200));
                }
            }
            Mode::Async => {
                let deadline = match opts.blocking {
                    Blocking::Block => None,
                    Blocking::NonBlock => Some(Instant::now()),
                    Blocking::Timeout(d) => Some(Instant::now() + d),
                };

                loop {
                    match self.queue.enqueue_last(desc.clone()) {
                        Ok(()) => {
                            self.notify();
                            return Ok(());
                        }
                        Err(IocError::TooManyQueuingEvtDesc) => {
                            if let Some(deadline) = deadline {
                                if Instant::now() >= deadline {
                                    return Err(IocError::TooManyQueuingEvtDesc);
                                }
                            }
                            std::thread::sleep(Duration::from_micros(200));
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    pub fn subscribe(&self, callback: Arc<EvtCallback>, evt_ids: Vec<EvtId>) -> Result<Arc<Subscriber>, IocError> {
        self.subscribers.insert(callback, evt_ids)
    }

    pub fn unsubscribe(&self, handle: &Arc<Subscriber>) -> Result<(), IocError> {
        self.subscribers.remove(handle)
    }

    /// Force the dispatch thread to make one drain pass right now, even
    /// if nothing new was posted (used by tests and `iocctl` to make
    /// dispatch deterministic instead of racing the 100ms poll).
    pub fn force_proc_evt(&self) {
        self.notify();
    }

    /// Alias kept distinct from `force_proc_evt` because spec.md names
    /// both operations separately: this one only wakes the thread (no
    /// semantic difference in this single-queue implementation, but the
    /// two are kept as separate entry points so callers don't need to
    /// know they currently collapse to the same wake).
    pub fn wakeup_proc_evt(&self) {
        self.notify();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Drop for ConlesBus {
    fn drop(&mut self) {
        {
            let mut state = self.signal.mutex.lock();
            state.shutdown = true;
            self.signal.condvar.notify_one();
        }
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for ConlesBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn evt() -> EvtDesc {
        EvtDesc::new(EvtId::new(0, 1), 1)
    }

    #[test]
    fn post_without_subscriber_fails_fast() {
        let bus = ConlesBus::new();
        assert_eq!(
            bus.post_evt(evt(), Options::async_non_block()),
            Err(IocError::NoEventConsumer)
        );
    }

    #[test]
    fn async_post_is_drained_by_dispatch_thread() {
        let bus = ConlesBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.subscribe(Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }), vec![EvtId::new(0, 1)])
            .unwrap();

        bus.post_evt(evt(), Options::async_non_block()).unwrap();
        bus.force_proc_evt();

        let start = Instant::now();
        while count.load(Ordering::SeqCst) == 0 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sync_post_dispatches_on_caller_thread_immediately() {
        let bus = ConlesBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        bus.subscribe(Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }), vec![EvtId::new(0, 1)])
            .unwrap();

        bus.post_evt(evt(), Options::new(Mode::Sync, Blocking::Block)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.queue_len(), 0);
    }

    #[test]
    fn sync_post_with_nonempty_queue_and_nonblock_fails_fast() {
        let bus = ConlesBus::new();
        bus.subscribe(Arc::new(|_| {
            // Stuck processing the first item, leaving the second queued.
            std::thread::sleep(Duration::from_secs(5));
        }), vec![EvtId::new(0, 1)])
            .unwrap();

        bus.post_evt(evt(), Options::async_non_block()).unwrap();
        bus.post_evt(evt(), Options::async_non_block()).unwrap();

        assert_eq!(
            bus.post_evt(evt(), Options::new(Mode::Sync, Blocking::NonBlock)),
            Err(IocError::TooLongEmptyingEvtDescQueue)
        );
    }

    #[test]
    fn async_post_exhaustion_reports_too_many_queuing_not_timeout() {
        // A user-controlled latch (spec.md's S1 pattern) blocks the
        // consumer inside its callback so the queue can be driven to
        // exactly full and held there deterministically.
        let bus = ConlesBus::with_capacities(1, CONLES_SUBSCRIBER_CAPACITY);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        bus.subscribe(Arc::new(move |_| { let _ = release_rx.lock().recv(); }), vec![EvtId::new(0, 1)])
            .unwrap();

        bus.post_evt(evt(), Options::async_non_block()).unwrap();
        bus.force_proc_evt();
        // Give the dispatch thread time to dequeue this first post and
        // block on the latch inside the callback, freeing the one queue
        // slot for the next enqueue.
        std::thread::sleep(Duration::from_millis(100));

        bus.post_evt(evt(), Options::async_non_block()).unwrap();
        assert_eq!(
            bus.post_evt(evt(), Options::async_non_block()),
            Err(IocError::TooManyQueuingEvtDesc)
        );
        assert_eq!(
            bus.post_evt(evt(), Options::new(Mode::Async, Blocking::Timeout(Duration::from_millis(20)))),
            Err(IocError::TooManyQueuingEvtDesc)
        );

        release_tx.send(()).unwrap();
    }

    #[test]
    fn overflow_then_fill_respects_capacity() {
        let bus = ConlesBus::new();
        bus.subscribe(Arc::new(|_| {
            // Block forever-ish so the queue actually fills; the
            // dispatch thread will be stuck processing the first item.
            std::thread::sleep(Duration::from_secs(5));
        }), vec![EvtId::new(0, 1)])
            .unwrap();

        for _ in 0..crate::queue::CAPACITY {
            bus.post_evt(evt(), Options::async_non_block()).ok();
        }
        // Either every slot got taken by the time we observe it, or the
        // dispatch thread already drained one; either way it must never
        // exceed capacity.
        assert!(bus.queue_len() <= crate::queue::CAPACITY);
    }
}
