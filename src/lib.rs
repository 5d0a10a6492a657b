//! An inter-object communication substrate: events, commands and no-drop
//! data streams exchanged between named services and links, with both a
//! connection-oriented in-process transport and a connection-less
//! process-wide event bus.
//!
//! The public surface is [`facade`]: every operation spec.md names lives
//! there as a free function over an explicit [`runtime::Runtime`].

pub mod capability;
pub mod cli;
pub mod conles;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod facade;
mod idgen;
pub mod link;
pub mod logging;
pub mod queue;
pub mod runtime;
pub mod service;
pub mod subscriber;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{IocError, IocResult};
pub use runtime::Runtime;
pub use types::{Blocking, LinkId, LinkUsage, Mode, Options, ServiceUri, SrvId};

/// The current version of the substrate crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
