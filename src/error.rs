//! Result taxonomy for the substrate's public API.
//!
//! Every public operation returns an [`IocResult<T>`]. Argument validation
//! failures map to [`IocError::InvalidParam`]; violated internal invariants
//! map to [`IocError::Bug`] and are logged at `ioc::bug` before being
//! returned — the library never aborts the host process on its own.

use thiserror::Error;

/// The result type returned by every public substrate operation.
pub type IocResult<T> = Result<T, IocError>;

/// The result taxonomy from the external-interfaces contract.
///
/// `Success` has no variant here: it is spelled `Ok(())` / `Ok(T)`, the way
/// "no error" is spelled in Rust.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IocError {
    /// Null required pointer, illegal option, or malformed descriptor.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// The link id is unknown, or the link has already been closed.
    #[error("link does not exist")]
    NotExistLink,

    /// The service id is unknown.
    #[error("service does not exist")]
    NotExistService,

    /// The transport lacks this operation, or the link's role doesn't
    /// support the requested call.
    #[error("operation not supported on this link/transport")]
    NotSupport,

    /// An event post found no live subscriber.
    #[error("no event consumer")]
    NoEventConsumer,

    /// A subscribe call exceeded the subscriber list's capacity.
    #[error("too many event consumers")]
    TooManyEventConsumer,

    /// A subscribe call duplicated an existing `{callback, ctx}` identity.
    #[error("conflicting event consumer")]
    ConflictEventConsumer,

    /// An async post found the event queue full and either the caller
    /// didn't want to block or the retry budget was exhausted.
    #[error("too many queuing event descriptors")]
    TooManyQueuingEvtDesc,

    /// A sync post couldn't find an empty queue within the retry budget.
    #[error("too long emptying the event descriptor queue")]
    TooLongEmptyingEvtDescQueue,

    /// A dequeue was attempted on an empty queue.
    #[error("event descriptor queue is empty")]
    EvtDescQueueEmpty,

    /// The transport detected the peer is gone; terminal for the link.
    #[error("link broken")]
    LinkBroken,

    /// A generic timeout on a bounded-wait operation.
    #[error("operation timed out")]
    Timeout,

    /// `get_service_link_ids` was called with a buffer too small to hold
    /// the result.
    #[error("destination buffer too small")]
    BufferTooSmall,

    /// No data was available to a non-blocking poll.
    #[error("no data available")]
    NoData,

    /// A non-blocking send found the receiver's buffer or queue full.
    #[error("buffer full")]
    BufferFull,

    /// An unreachable branch was reached: implies a defect in the core.
    /// Logged at `ioc::bug` by the caller before being surfaced.
    #[error("internal bug: {0}")]
    Bug(String),
}

impl IocError {
    /// Construct a [`IocError::Bug`] and emit the matching `ioc::bug` log
    /// event. Internal invariant violations should always go through this
    /// helper rather than constructing the variant directly, so the log
    /// and the error can never drift apart.
    pub fn bug(context: impl Into<String>) -> Self {
        let context = context.into();
        tracing::error!(target: "ioc::bug", %context, "internal invariant violated");
        IocError::Bug(context)
    }
}
