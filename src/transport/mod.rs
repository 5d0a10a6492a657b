//! The pluggable transport vtable: one async trait every concrete
//! transport (FIFO, TCP) implements, mirroring the C function-pointer
//! struct `_IOC_SrvProtoMethodsStru` from the original sources — each
//! method defaults to `NotSupport` so a transport only needs to override
//! what it actually provides.

pub mod fifo;
pub mod tcp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::descriptor::{CmdDesc, DatDesc, EvtDesc};
use crate::error::IocError;
use crate::link::Link;
use crate::service::Service;
use crate::types::{LinkUsage, Options, ServiceUri};

/// Static per-transport knobs that don't change once a service/link is
/// set up, as distinct from the per-call [`Options`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub flush_retry_budget: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            flush_retry_budget: 16,
        }
    }
}

/// Arguments a client supplies to `connect`.
#[derive(Debug, Clone)]
pub struct ConnArgs {
    pub uri: ServiceUri,
    pub usage: LinkUsage,
}

/// The operations a concrete transport may implement. Every method
/// defaults to returning `NotSupport`, the Rust analogue of a null
/// function pointer in the C vtable this is grounded on.
#[async_trait]
pub trait TransportMethods: Send + Sync {
    fn protocol(&self) -> &'static str;

    async fn online_service(&self, _uri: &ServiceUri, _usage: LinkUsage) -> Result<Arc<Service>, IocError> {
        Err(IocError::NotSupport)
    }

    async fn offline_service(&self, _srv: &Arc<Service>) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }

    async fn connect(&self, _args: &ConnArgs) -> Result<Arc<Link>, IocError> {
        Err(IocError::NotSupport)
    }

    async fn accept_client(&self, _srv: &Arc<Service>) -> Result<Arc<Link>, IocError> {
        Err(IocError::NotSupport)
    }

    async fn close_link(&self, _link: &Arc<Link>) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }

    fn post_evt(&self, _link: &Arc<Link>, _desc: EvtDesc, _opts: Options) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }

    fn exec_cmd(&self, _link: &Arc<Link>, _desc: &mut CmdDesc, _opts: Options) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }

    fn send_dat(&self, _link: &Arc<Link>, _desc: DatDesc, _opts: Options) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }

    fn recv_dat(&self, _link: &Arc<Link>, _opts: Options) -> Result<DatDesc, IocError> {
        Err(IocError::NotSupport)
    }

    fn flush_dat(&self, _link: &Arc<Link>) -> Result<(), IocError> {
        Err(IocError::NotSupport)
    }
}
