//! The process-wide runtime: owns the Conles bus, the link/service
//! registries, and the transport instances. A single [`Runtime`] per
//! process is the norm (via [`Runtime::global`]), but tests construct
//! their own with [`Runtime::with_config`] so state doesn't leak between
//! cases — the Conles bus in particular is genuinely process-wide in
//! spec.md's model, which a shared `OnceLock` would make impossible to
//! test in isolation.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::conles::ConlesBus;
use crate::error::IocError;
use crate::link::Link;
use crate::service::Service;
use crate::transport::fifo::FifoTransport;
use crate::transport::tcp::TcpTransport;
use crate::transport::TransportMethods;
use crate::types::{LinkId, ServiceUri, SrvId};

static GLOBAL: OnceLock<Arc<Runtime>> = OnceLock::new();

struct Registries {
    links: HashMap<LinkId, Arc<Link>>,
    services: HashMap<SrvId, Arc<Service>>,
}

/// The substrate's process-wide state.
pub struct Runtime {
    pub conles: ConlesBus,
    fifo: Arc<FifoTransport>,
    tcp: Arc<TcpTransport>,
    registries: Mutex<Registries>,
}

impl Runtime {
    pub fn with_config(config: RuntimeConfig) -> Self {
        let queue_capacity = config.queue_capacity.unwrap_or(crate::queue::CAPACITY);
        let subscriber_capacity = config.subscriber_capacity.unwrap_or(crate::conles::CONLES_SUBSCRIBER_CAPACITY);

        Self {
            conles: ConlesBus::with_capacities(queue_capacity, subscriber_capacity),
            fifo: Arc::new(FifoTransport::new(config.fifo_transport)),
            tcp: Arc::new(TcpTransport::new()),
            registries: Mutex::new(Registries {
                links: HashMap::new(),
                services: HashMap::new(),
            }),
        }
    }

    /// The shared, process-wide runtime, lazily constructed on first use
    /// with default configuration.
    pub fn global() -> Arc<Runtime> {
        GLOBAL
            .get_or_init(|| Arc::new(Runtime::with_config(RuntimeConfig::default())))
            .clone()
    }

    /// Resolve the transport implementation for a given protocol string
    /// (`ServiceUri::PROTO_FIFO` / `ServiceUri::PROTO_TCP`).
    pub fn transport_for(&self, protocol: &str) -> Result<Arc<dyn TransportMethods>, IocError> {
        match protocol {
            p if p == ServiceUri::PROTO_FIFO => Ok(self.fifo.clone() as Arc<dyn TransportMethods>),
            p if p == ServiceUri::PROTO_TCP => Ok(self.tcp.clone() as Arc<dyn TransportMethods>),
            other => Err(IocError::InvalidParam(format!("unknown transport protocol: {other}"))),
        }
    }

    pub fn register_service(&self, srv: Arc<Service>) {
        self.registries.lock().services.insert(srv.id, srv);
    }

    pub fn unregister_service(&self, id: SrvId) -> Option<Arc<Service>> {
        self.registries.lock().services.remove(&id)
    }

    pub fn get_service(&self, id: SrvId) -> Result<Arc<Service>, IocError> {
        self.registries.lock().services.get(&id).cloned().ok_or(IocError::NotExistService)
    }

    pub fn register_link(&self, link: Arc<Link>) {
        self.registries.lock().links.insert(link.id, link);
    }

    pub fn unregister_link(&self, id: LinkId) -> Option<Arc<Link>> {
        self.registries.lock().links.remove(&id)
    }

    pub fn get_link(&self, id: LinkId) -> Result<Arc<Link>, IocError> {
        self.registries.lock().links.get(&id).cloned().ok_or(IocError::NotExistLink)
    }

    pub fn service_count(&self) -> usize {
        self.registries.lock().services.len()
    }

    pub fn link_count(&self) -> usize {
        self.registries.lock().links.len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::with_config(RuntimeConfig::default())
    }
}
