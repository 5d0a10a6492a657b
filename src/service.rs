//! The per-service object: a named, online endpoint that accepts client
//! connections and hands back accepted [`Link`]s keyed by connection id.
//!
//! Grounded on spec.md §4.4 and `original_source/Source/_IOC.h`'s
//! `_MAX_IOC_SRV_OBJ_NUM` / `_MAX_IOC_CLI_OBJ_NUM_PER_SRV` constants, which
//! SPEC_FULL.md §4.9 carries over as [`MAX_CLIENTS_PER_SERVICE`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::capability::{CapabilityDescription, Limits};
use crate::descriptor::EvtDesc;
use crate::error::IocError;
use crate::link::Link;
use crate::types::{ConnectionId, LinkId, LinkUsage, ServiceUri};

/// Maximum number of simultaneously accepted clients per service, per
/// `_MAX_IOC_CLI_OBJ_NUM_PER_SRV` in the original C sources.
pub const MAX_CLIENTS_PER_SERVICE: usize = 3;

struct AcceptTable {
    clients: Vec<(ConnectionId, Arc<Link>)>,
}

impl AcceptTable {
    fn new() -> Self {
        Self { clients: Vec::new() }
    }
}

/// An online service: a `(usage, uri)` advertisement plus the three
/// accept-bookkeeping structures spec.md §3 names — manual (`accepted`),
/// auto-accept daemon (`auto_accept_links`) and broadcast fan-out
/// (`broadcast_links`) — each under its own lock.
pub struct Service {
    pub id: crate::types::SrvId,
    pub uri: ServiceUri,
    pub usage: LinkUsage,
    online: Mutex<bool>,
    accepted: Mutex<AcceptTable>,
    next_conn_id: Mutex<ConnectionId>,
    broadcast: AtomicBool,
    broadcast_links: Mutex<Vec<Arc<Link>>>,
    auto_accept: AtomicBool,
    auto_accept_links: Mutex<Vec<Arc<Link>>>,
    auto_accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    pub fn new(id: crate::types::SrvId, uri: ServiceUri, usage: LinkUsage) -> Self {
        Self {
            id,
            uri,
            usage,
            online: Mutex::new(true),
            accepted: Mutex::new(AcceptTable::new()),
            next_conn_id: Mutex::new(1),
            broadcast: AtomicBool::new(false),
            broadcast_links: Mutex::new(Vec::new()),
            auto_accept: AtomicBool::new(false),
            auto_accept_links: Mutex::new(Vec::new()),
            auto_accept_task: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.lock()
    }

    /// Take the service offline: stops the auto-accept daemon (if one was
    /// spawned) but does not tear down already-accepted links — callers
    /// close those individually (§9 open question: offline does not
    /// cascade-close).
    pub fn offline(&self) {
        *self.online.lock() = false;
        if let Some(task) = self.auto_accept_task.lock().take() {
            task.abort();
        }
    }

    pub fn set_broadcast(&self, enabled: bool) {
        self.broadcast.store(enabled, Ordering::SeqCst);
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast.load(Ordering::SeqCst)
    }

    pub fn set_auto_accept(&self, enabled: bool) {
        self.auto_accept.store(enabled, Ordering::SeqCst);
    }

    pub fn is_auto_accept(&self) -> bool {
        self.auto_accept.load(Ordering::SeqCst)
    }

    /// Stash the daemon task handle spawned for this service, so
    /// [`Service::offline`] can abort it. Replaces (and implicitly aborts,
    /// via `JoinHandle::drop`) any previously stored handle.
    pub fn store_auto_accept_task(&self, task: JoinHandle<()>) {
        *self.auto_accept_task.lock() = Some(task);
    }

    /// Register a newly accepted client link, failing with `NotSupport`
    /// if the requested usage doesn't complement this service's own, or
    /// `TooManyEventConsumer`-shaped capacity failure if the accept table
    /// is already full. When this service has auto-accept or broadcast
    /// enabled, the link is additionally recorded in those tables
    /// (bounded independently; a full auxiliary table is dropped silently
    /// rather than failing the accept, since the manual table is the one
    /// spec.md ties capacity failures to).
    pub fn accept(&self, link: Arc<Link>) -> Result<ConnectionId, IocError> {
        if !self.is_online() {
            return Err(IocError::NotExistService);
        }
        if link.usage != self.usage.complement() {
            return Err(IocError::NotSupport);
        }

        let mut table = self.accepted.lock();
        if table.clients.len() >= MAX_CLIENTS_PER_SERVICE {
            return Err(IocError::TooManyEventConsumer);
        }

        let mut next = self.next_conn_id.lock();
        let conn_id = *next;
        *next += 1;
        table.clients.push((conn_id, link.clone()));
        drop(table);
        drop(next);

        if self.is_broadcast() {
            let mut links = self.broadcast_links.lock();
            if links.len() < Limits::MAX_BROADCAST_LINKS {
                links.push(link.clone());
            }
        }
        if self.is_auto_accept() {
            let mut links = self.auto_accept_links.lock();
            if links.len() < Limits::MAX_AUTO_ACCEPT_LINKS {
                links.push(link);
            }
        }

        Ok(conn_id)
    }

    /// Fan a single event out to every link in the broadcast-accept
    /// table, delivering directly to each link's own subscriber list
    /// (spec.md §4.10: "a post directed at the srv_id iterates the
    /// broadcast-accept table and posts to each contained link").
    /// `NoEventConsumer` only if the table is empty or nothing in it had
    /// a matching subscriber.
    pub fn broadcast_post(&self, desc: &EvtDesc) -> Result<(), IocError> {
        let links = self.broadcast_links.lock();
        if links.is_empty() {
            return Err(IocError::NoEventConsumer);
        }
        let delivered: usize = links.iter().map(|link| link.subscribers.dispatch(desc)).sum();
        if delivered == 0 {
            Err(IocError::NoEventConsumer)
        } else {
            Ok(())
        }
    }

    /// Link ids currently in the auto-accept table, for
    /// `get-service-link-ids`'s auto-accept-discovery use (spec.md §4.4).
    pub fn auto_accept_link_ids(&self) -> Vec<LinkId> {
        self.auto_accept_links.lock().iter().map(|l| l.id).collect()
    }

    /// The static-limits query spec.md §4.9 names as
    /// `get-capability(cap-id) -> description`, surfaced on the service that
    /// feeds role negotiation. `cap_id` is accepted but unused: this process
    /// has exactly one capability set, so every service reports the same
    /// [`CapabilityDescription`] (the broader per-id query surface is out of
    /// scope per spec.md's Non-goals).
    pub fn get_capability_description(&self, _cap_id: u32) -> CapabilityDescription {
        CapabilityDescription::current()
    }

    pub fn remove(&self, conn_id: ConnectionId) -> Option<Arc<Link>> {
        let mut table = self.accepted.lock();
        let pos = table.clients.iter().position(|(id, _)| *id == conn_id)?;
        Some(table.clients.remove(pos).1)
    }

    pub fn get_link(&self, conn_id: ConnectionId) -> Option<Arc<Link>> {
        let table = self.accepted.lock();
        table.clients.iter().find(|(id, _)| *id == conn_id).map(|(_, l)| l.clone())
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        let table = self.accepted.lock();
        table.clients.iter().map(|(_, l)| l.id).collect()
    }

    pub fn client_count(&self) -> usize {
        self.accepted.lock().clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SrvId;

    fn mk_service() -> Service {
        Service::new(SrvId(1), ServiceUri::fifo("/svc"), LinkUsage::EvtProducer)
    }

    #[test]
    fn accept_rejects_mismatched_usage() {
        let svc = mk_service();
        let link = Arc::new(Link::new(LinkId(1), LinkUsage::EvtProducer, None));
        assert_eq!(svc.accept(link), Err(IocError::NotSupport));
    }

    #[test]
    fn accept_enforces_capacity() {
        let svc = mk_service();
        for i in 0..MAX_CLIENTS_PER_SERVICE {
            let link = Arc::new(Link::new(LinkId(i as u64 + 1), LinkUsage::EvtConsumer, None));
            svc.accept(link).unwrap();
        }
        let overflow = Arc::new(Link::new(LinkId(99), LinkUsage::EvtConsumer, None));
        assert_eq!(svc.accept(overflow), Err(IocError::TooManyEventConsumer));
    }

    #[test]
    fn offline_rejects_new_accepts() {
        let svc = mk_service();
        svc.offline();
        let link = Arc::new(Link::new(LinkId(1), LinkUsage::EvtConsumer, None));
        assert_eq!(svc.accept(link), Err(IocError::NotExistService));
    }

    #[test]
    fn broadcast_post_reaches_every_accepted_link() {
        use crate::descriptor::{EvtDesc, EvtId};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let svc = mk_service();
        svc.set_broadcast(true);

        let count = Arc::new(AtomicUsize::new(0));
        for i in 0..2 {
            let link = Arc::new(Link::new(LinkId(i + 1), LinkUsage::EvtConsumer, None));
            let count2 = count.clone();
            link.subscribers
                .insert(Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }), vec![EvtId::new(0, 1)])
                .unwrap();
            svc.accept(link).unwrap();
        }

        svc.broadcast_post(&EvtDesc::new(EvtId::new(0, 1), 1)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn broadcast_post_without_links_fails() {
        let svc = mk_service();
        svc.set_broadcast(true);
        let evt = crate::descriptor::EvtDesc::new(crate::descriptor::EvtId::new(0, 1), 1);
        assert_eq!(svc.broadcast_post(&evt), Err(IocError::NoEventConsumer));
    }

    #[test]
    fn get_capability_description_reports_static_limits() {
        let svc = mk_service();
        let cap = svc.get_capability_description(0);
        assert_eq!(cap, CapabilityDescription::current());
    }

    #[test]
    fn accept_populates_auto_accept_table_when_enabled() {
        let svc = mk_service();
        svc.set_auto_accept(true);
        let link = Arc::new(Link::new(LinkId(7), LinkUsage::EvtConsumer, None));
        svc.accept(link).unwrap();
        assert_eq!(svc.auto_accept_link_ids(), vec![LinkId(7)]);
    }
}
