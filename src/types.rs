//! Identity and role types shared by links, services and the facade.

use std::time::Duration;

/// Process-unique, monotonically assigned link identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) u64);

impl LinkId {
    /// The reserved identifier for the Conles auto-link bus. Every real
    /// link gets an id starting at 1, so 0 is free to reserve — unlike a
    /// sentinel at `u64::MAX`, this can never collide with an allocation
    /// counter that starts at 1 and only increments.
    pub const AUTO: LinkId = LinkId(0);

    /// True if this is the reserved Conles auto-link id.
    pub fn is_auto(self) -> bool {
        self == Self::AUTO
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque service handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SrvId(pub(crate) u64);

impl std::fmt::Display for SrvId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection identifier used to route events/data to a specific
/// broadcast/auto-accept link within a service's accept table.
pub type ConnectionId = u64;

/// The role a link plays. One of the six usages named in spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkUsage {
    EvtProducer,
    EvtConsumer,
    CmdInitiator,
    CmdExecutor,
    DatSender,
    DatReceiver,
}

impl LinkUsage {
    /// The complementary role a peer must request to connect to a side
    /// advertising `self` (producer <-> consumer, initiator <-> executor,
    /// sender <-> receiver).
    pub fn complement(self) -> LinkUsage {
        match self {
            LinkUsage::EvtProducer => LinkUsage::EvtConsumer,
            LinkUsage::EvtConsumer => LinkUsage::EvtProducer,
            LinkUsage::CmdInitiator => LinkUsage::CmdExecutor,
            LinkUsage::CmdExecutor => LinkUsage::CmdInitiator,
            LinkUsage::DatSender => LinkUsage::DatReceiver,
            LinkUsage::DatReceiver => LinkUsage::DatSender,
        }
    }
}

/// Service URI triple (plus an optional port for networked transports).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceUri {
    pub protocol: String,
    pub host: String,
    pub path: String,
    pub port: Option<u16>,
}

impl ServiceUri {
    pub const PROTO_FIFO: &'static str = "fifo";
    pub const PROTO_TCP: &'static str = "tcp";
    pub const HOST_LOCALPROCESS: &'static str = "localprocess";

    pub fn fifo(path: impl Into<String>) -> Self {
        Self {
            protocol: Self::PROTO_FIFO.to_string(),
            host: Self::HOST_LOCALPROCESS.to_string(),
            path: path.into(),
            port: None,
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            protocol: Self::PROTO_TCP.to_string(),
            host: host.into(),
            path: path.into(),
            port: Some(port),
        }
    }
}

impl std::fmt::Display for ServiceUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}{}", self.protocol, self.host, port, self.path),
            None => write!(f, "{}://{}{}", self.protocol, self.host, self.path),
        }
    }
}

/// Dispatch mode selector: synchronous (caller-thread) or asynchronous
/// (queued, possibly drained by a dispatch thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Async,
}

/// Blocking policy selector for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    Block,
    NonBlock,
    Timeout(Duration),
}

impl Blocking {
    /// `timeout == Duration::ZERO` is defined to behave like `NonBlock`.
    pub fn effective(self) -> Blocking {
        match self {
            Blocking::Timeout(d) if d.is_zero() => Blocking::NonBlock,
            other => other,
        }
    }
}

/// The `{Sync|Async} x {Block|NonBlock|Timeout}` options struct threaded
/// through every call that can suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub mode: Mode,
    pub blocking: Blocking,
}

impl Options {
    pub fn new(mode: Mode, blocking: Blocking) -> Self {
        Self {
            mode,
            blocking: blocking.effective(),
        }
    }

    pub fn sync_block() -> Self {
        Self::new(Mode::Sync, Blocking::Block)
    }

    pub fn async_non_block() -> Self {
        Self::new(Mode::Async, Blocking::NonBlock)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::async_non_block()
    }
}

/// Connection state (L1): a link's lifecycle from the transport's point of
/// view, independent of whether it's currently busy with an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Broken,
}

/// Operation state (L2): what the link is doing right now. Independent of
/// `ConnState` — a `Ready` link may still be `Connected`; a `Busy*` link has
/// `ConnState::Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Ready,
    BusyCbProcEvt,
    BusySubEvt,
    BusyUnsubEvt,
    BusyCmd,
    BusyDat,
}

/// Sub-state (L3): role-specific detail during `OpState::BusyCmd` /
/// `OpState::BusyDat`. `Default` whenever `OpState` isn't one of those two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    Default,
    CmdSending,
    CmdAwaitingAck,
    DatSending,
    DatReceiving,
}
