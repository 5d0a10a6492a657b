//! Message descriptors: the common envelope fields plus the per-kind
//! payloads for events, commands and data chunks.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::IocError;

/// Fields common to every message descriptor: the sequence id assigned by
/// the facade at post time, and the wall-clock timestamp captured then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgDesc {
    pub seq_id: u64,
    pub timestamp: SystemTime,
}

impl MsgDesc {
    pub(crate) fn stamp(seq_id: u64) -> Self {
        Self {
            seq_id,
            timestamp: SystemTime::now(),
        }
    }
}

/// Event class-id || name-id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvtId {
    pub class_id: u32,
    pub name_id: u32,
}

impl EvtId {
    pub const fn new(class_id: u32, name_id: u32) -> Self {
        Self { class_id, name_id }
    }
}

/// A one-way event descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvtDesc {
    pub msg: MsgDesc,
    pub evt_id: EvtId,
    pub evt_value: u32,
    pub payload: Option<Vec<u8>>,
}

impl EvtDesc {
    pub fn new(evt_id: EvtId, evt_value: u32) -> Self {
        Self {
            msg: MsgDesc::stamp(0),
            evt_id,
            evt_value,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Command execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdStatus {
    Initialized,
    Sending,
    Succeeded,
    Failed,
    TimedOut,
}

/// A request/response command descriptor. `output` is filled in by the
/// executor; `status`/`result` record the outcome for the initiator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdDesc {
    pub msg: MsgDesc,
    pub cmd_id: u32,
    pub input: Vec<u8>,
    pub output: Vec<u8>,
    pub status: CmdStatus,
    pub result: Option<IocErrorCode>,
    pub timeout_ms: u64,
}

impl CmdDesc {
    pub fn new(cmd_id: u32, input: Vec<u8>, timeout_ms: u64) -> Self {
        Self {
            msg: MsgDesc::stamp(0),
            cmd_id,
            input,
            output: Vec::new(),
            status: CmdStatus::Initialized,
            result: None,
            timeout_ms,
        }
    }
}

/// Data chunk transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatStatus {
    Initialized,
    Sending,
    Receiving,
    Succeeded,
    Failed,
}

/// A data stream chunk. `used_len` is the portion of `data` actually
/// populated; `data.len()` is the declared buffer size on the receive side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatDesc {
    pub msg: MsgDesc,
    pub data: Vec<u8>,
    pub used_len: usize,
    pub status: DatStatus,
    pub result: Option<IocErrorCode>,
}

impl DatDesc {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let used_len = data.len();
        Self {
            msg: MsgDesc::stamp(0),
            data,
            used_len,
            status: DatStatus::Initialized,
            result: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.used_len]
    }
}

/// A serializable mirror of [`IocError`] for embedding inside descriptors
/// that cross a wire boundary (descriptors are `Serialize`; `IocError`
/// itself stays string-based internally and isn't, so command/data
/// descriptors carry this small code instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IocErrorCode {
    InvalidParam,
    NotExistLink,
    NotExistService,
    NotSupport,
    NoEventConsumer,
    TooManyEventConsumer,
    ConflictEventConsumer,
    TooManyQueuingEvtDesc,
    TooLongEmptyingEvtDescQueue,
    EvtDescQueueEmpty,
    LinkBroken,
    Timeout,
    BufferTooSmall,
    NoData,
    BufferFull,
    Bug,
}

impl From<&IocError> for IocErrorCode {
    fn from(e: &IocError) -> Self {
        match e {
            IocError::InvalidParam(_) => IocErrorCode::InvalidParam,
            IocError::NotExistLink => IocErrorCode::NotExistLink,
            IocError::NotExistService => IocErrorCode::NotExistService,
            IocError::NotSupport => IocErrorCode::NotSupport,
            IocError::NoEventConsumer => IocErrorCode::NoEventConsumer,
            IocError::TooManyEventConsumer => IocErrorCode::TooManyEventConsumer,
            IocError::ConflictEventConsumer => IocErrorCode::ConflictEventConsumer,
            IocError::TooManyQueuingEvtDesc => IocErrorCode::TooManyQueuingEvtDesc,
            IocError::TooLongEmptyingEvtDescQueue => IocErrorCode::TooLongEmptyingEvtDescQueue,
            IocError::EvtDescQueueEmpty => IocErrorCode::EvtDescQueueEmpty,
            IocError::LinkBroken => IocErrorCode::LinkBroken,
            IocError::Timeout => IocErrorCode::Timeout,
            IocError::BufferTooSmall => IocErrorCode::BufferTooSmall,
            IocError::NoData => IocErrorCode::NoData,
            IocError::BufferFull => IocErrorCode::BufferFull,
            IocError::Bug(_) => IocErrorCode::Bug,
        }
    }
}
