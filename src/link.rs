//! The per-link object: identity, negotiated usage, and the three-level
//! state machine (`ConnState` / `OpState` / `SubState`) from spec.md §4.3.
//!
//! A link never hard-aborts on an unexpected transition; callers get
//! `IocError::Bug` and the transition is logged at `ioc::bug`, leaving the
//! link in whatever state it already held (§7: bugs are reported, not
//! fatal, to the library's host process).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::descriptor::{CmdDesc, DatDesc};
use crate::error::IocError;
use crate::subscriber::SubscriberList;
use crate::types::{ConnState, LinkId, LinkUsage, OpState, ServiceUri, SubState};

/// Bound on a link's inbound data queue, per `capability::Limits::MAX_QUEUE_DEPTH`.
pub const DATA_QUEUE_CAPACITY: usize = 64;

pub type CmdHandler = dyn Fn(&mut CmdDesc) + Send + Sync;

/// A receiver-side data callback, invoked by the sender's `send-data` with
/// each chunk directly (spec.md §4.6's "receiver configured with callback"
/// path), as opposed to the polled `data_inbox`.
pub type DatCallback = dyn Fn(&DatDesc) + Send + Sync;

/// Capacity of the event-subscriber list attached to a consumer link.
/// Mirrors the Conles auto-link subscriber cap (spec.md §4.9).
pub const LINK_SUBSCRIBER_CAPACITY: usize = 16;

struct StateInner {
    conn: ConnState,
    op: OpState,
    sub: SubState,
}

/// A single connection endpoint: one side of a producer/consumer,
/// initiator/executor or sender/receiver pair.
pub struct Link {
    pub id: LinkId,
    pub usage: LinkUsage,
    pub peer_uri: Option<ServiceUri>,
    state: Mutex<StateInner>,
    pub subscribers: SubscriberList,
    cmd_handler: Mutex<Option<Arc<CmdHandler>>>,
    dat_handler: Mutex<Option<Arc<DatCallback>>>,
    data_inbox: Mutex<VecDeque<DatDesc>>,
}

impl Link {
    pub fn new(id: LinkId, usage: LinkUsage, peer_uri: Option<ServiceUri>) -> Self {
        Self {
            id,
            usage,
            peer_uri,
            state: Mutex::new(StateInner {
                conn: ConnState::Disconnected,
                op: OpState::Ready,
                sub: SubState::Default,
            }),
            subscribers: SubscriberList::new(LINK_SUBSCRIBER_CAPACITY),
            cmd_handler: Mutex::new(None),
            dat_handler: Mutex::new(None),
            data_inbox: Mutex::new(VecDeque::new()),
        }
    }

    /// Install the handler this link's owner runs when it is the executor
    /// side of an `exec_cmd` call. Only one handler may be installed at a
    /// time; installing a new one replaces the old.
    pub fn set_cmd_handler(&self, handler: Arc<CmdHandler>) {
        *self.cmd_handler.lock() = Some(handler);
    }

    pub fn cmd_handler(&self) -> Option<Arc<CmdHandler>> {
        self.cmd_handler.lock().clone()
    }

    /// Install the callback this link's owner runs when it is the receiver
    /// side of a `send-data` call. Only one handler may be installed at a
    /// time; installing a new one replaces the old. Once set, `send-data`
    /// on the peer delivers directly through this callback instead of the
    /// polled `data_inbox` (spec.md §4.6).
    pub fn set_dat_handler(&self, handler: Arc<DatCallback>) {
        *self.dat_handler.lock() = Some(handler);
    }

    pub fn dat_handler(&self) -> Option<Arc<DatCallback>> {
        self.dat_handler.lock().clone()
    }

    /// Push a data chunk into this link's inbound queue. Fails with
    /// `BufferFull` once the queue reaches [`DATA_QUEUE_CAPACITY`].
    pub fn push_data(&self, desc: DatDesc) -> Result<(), IocError> {
        let mut inbox = self.data_inbox.lock();
        if inbox.len() >= DATA_QUEUE_CAPACITY {
            return Err(IocError::BufferFull);
        }
        inbox.push_back(desc);
        Ok(())
    }

    /// Pop the next data chunk from this link's inbound queue. Fails with
    /// `NoData` if currently empty.
    pub fn pop_data(&self) -> Result<DatDesc, IocError> {
        self.data_inbox.lock().pop_front().ok_or(IocError::NoData)
    }

    pub fn data_pending(&self) -> usize {
        self.data_inbox.lock().len()
    }

    pub fn state(&self) -> (ConnState, OpState, SubState) {
        let s = self.state.lock();
        (s.conn, s.op, s.sub)
    }

    pub fn conn_state(&self) -> ConnState {
        self.state.lock().conn
    }

    pub fn op_state(&self) -> OpState {
        self.state.lock().op
    }

    /// Move the connection state machine `from -> to`, failing with
    /// `IocError::bug` if the link isn't currently in `from`.
    pub fn transition_conn(&self, from: ConnState, to: ConnState) -> Result<(), IocError> {
        let mut s = self.state.lock();
        if s.conn != from {
            return Err(IocError::bug(format!(
                "link {} conn transition {:?}->{:?} attempted from {:?}",
                self.id, from, to, s.conn
            )));
        }
        s.conn = to;
        Ok(())
    }

    pub fn set_conn(&self, to: ConnState) {
        self.state.lock().conn = to;
    }

    /// Enter a busy operation state from `Ready`; fails with `NotSupport`
    /// if the link is already busy with something else (one in-flight
    /// operation per link, per spec.md §5).
    pub fn begin_op(&self, op: OpState) -> Result<(), IocError> {
        let mut s = self.state.lock();
        if s.op != OpState::Ready {
            return Err(IocError::NotSupport);
        }
        s.op = op;
        Ok(())
    }

    pub fn end_op(&self) {
        let mut s = self.state.lock();
        s.op = OpState::Ready;
        s.sub = SubState::Default;
    }

    pub fn set_sub(&self, sub: SubState) {
        self.state.lock().sub = sub;
    }

    /// Mark the link broken; terminal, independent of whatever op/sub
    /// state it was in.
    pub fn mark_broken(&self) {
        let mut s = self.state.lock();
        s.conn = ConnState::Broken;
        s.op = OpState::Ready;
        s.sub = SubState::Default;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().conn == ConnState::Connected
    }
}
