//! In-process FIFO transport: direct synchronous callback dispatch for
//! events, a bounded inbox per link for no-drop data delivery, and a
//! synchronous handler invocation for commands.
//!
//! Grounded on `original_source/Source/_IOC_SrvProtoFifo.c` (peer
//! resolution + direct dispatch) and the teacher's
//! `ipc/unix_domain_socket.rs` framing discipline, adapted for an
//! in-process peer instead of a kernel socket.
//!
//! REDESIGN FLAG applied: the C original resolves a link's peer through a
//! raw pointer stashed in the link's private data. Here peers are
//! resolved as a `LinkId` through this transport's own arena
//! (`links`/`peers` maps) under `parking_lot::Mutex`, so a stale handle
//! after `close_link` fails a lookup instead of dereferencing freed
//! memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::descriptor::{CmdDesc, CmdStatus, DatDesc};
use crate::error::IocError;
use crate::idgen;
use crate::link::Link;
use crate::service::Service;
use crate::types::{ConnState, LinkId, LinkUsage, Options, ServiceUri, SrvId};

use super::{ConnArgs, TransportConfig, TransportMethods};

struct PendingConn {
    client_link: Arc<Link>,
    ack_tx: oneshot::Sender<LinkId>,
}

struct Inner {
    services: HashMap<String, Arc<Service>>,
    links: HashMap<LinkId, Arc<Link>>,
    peers: HashMap<LinkId, LinkId>,
    pending: HashMap<String, Vec<PendingConn>>,
}

/// The in-process FIFO transport. One instance is shared process-wide
/// (owned by [`crate::runtime::Runtime`]).
pub struct FifoTransport {
    config: TransportConfig,
    inner: Mutex<Inner>,
}

impl FifoTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                services: HashMap::new(),
                links: HashMap::new(),
                peers: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    fn peer_of(&self, link_id: LinkId) -> Result<Arc<Link>, IocError> {
        let inner = self.inner.lock();
        let peer_id = *inner.peers.get(&link_id).ok_or(IocError::LinkBroken)?;
        inner.links.get(&peer_id).cloned().ok_or(IocError::LinkBroken)
    }
}

impl Default for FifoTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

#[async_trait]
impl TransportMethods for FifoTransport {
    fn protocol(&self) -> &'static str {
        ServiceUri::PROTO_FIFO
    }

    async fn online_service(&self, uri: &ServiceUri, usage: LinkUsage) -> Result<Arc<Service>, IocError> {
        let mut inner = self.inner.lock();
        let key = uri.to_string();
        if inner.services.contains_key(&key) {
            return Err(IocError::InvalidParam(format!("service already online at {key}")));
        }
        let srv = Arc::new(Service::new(idgen::next_srv_id(), uri.clone(), usage));
        inner.services.insert(key, srv.clone());
        Ok(srv)
    }

    async fn offline_service(&self, srv: &Arc<Service>) -> Result<(), IocError> {
        srv.offline();
        let mut inner = self.inner.lock();
        inner.services.remove(&srv.uri.to_string());
        inner.pending.remove(&srv.uri.to_string());
        Ok(())
    }

    async fn connect(&self, args: &ConnArgs) -> Result<Arc<Link>, IocError> {
        let svc = {
            let inner = self.inner.lock();
            inner
                .services
                .get(&args.uri.to_string())
                .cloned()
                .ok_or(IocError::NotExistService)?
        };
        if !svc.is_online() {
            return Err(IocError::NotExistService);
        }
        if args.usage != svc.usage.complement() {
            return Err(IocError::InvalidParam(format!(
                "requested usage {:?} is not complementary to service usage {:?}",
                args.usage, svc.usage
            )));
        }

        let client_link = Arc::new(Link::new(idgen::next_link_id(), args.usage, Some(args.uri.clone())));
        client_link.set_conn(ConnState::Connecting);

        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock();
            inner.links.insert(client_link.id, client_link.clone());
            inner
                .pending
                .entry(args.uri.to_string())
                .or_default()
                .push(PendingConn {
                    client_link: client_link.clone(),
                    ack_tx: tx,
                });
        }

        match timeout(self.config.connect_timeout, rx).await {
            Ok(Ok(_peer_id)) => {
                client_link.set_conn(ConnState::Connected);
                Ok(client_link)
            }
            _ => {
                client_link.mark_broken();
                Err(IocError::Timeout)
            }
        }
    }

    async fn accept_client(&self, srv: &Arc<Service>) -> Result<Arc<Link>, IocError> {
        let pending = {
            let mut inner = self.inner.lock();
            let queue = inner.pending.entry(srv.uri.to_string()).or_default();
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        };
        let Some(pending) = pending else {
            return Err(IocError::NotExistLink);
        };

        let server_link = Arc::new(Link::new(
            idgen::next_link_id(),
            pending.client_link.usage,
            None,
        ));
        server_link.set_conn(ConnState::Connected);

        {
            let mut inner = self.inner.lock();
            inner.links.insert(server_link.id, server_link.clone());
            inner.peers.insert(pending.client_link.id, server_link.id);
            inner.peers.insert(server_link.id, pending.client_link.id);
        }

        srv.accept(server_link.clone())?;
        let _ = pending.ack_tx.send(server_link.id);
        Ok(server_link)
    }

    async fn close_link(&self, link: &Arc<Link>) -> Result<(), IocError> {
        let mut inner = self.inner.lock();
        if let Some(peer_id) = inner.peers.remove(&link.id) {
            inner.peers.remove(&peer_id);
            if let Some(peer) = inner.links.get(&peer_id) {
                peer.mark_broken();
            }
        }
        inner.links.remove(&link.id);
        link.mark_broken();
        Ok(())
    }

    fn post_evt(&self, link: &Arc<Link>, desc: crate::descriptor::EvtDesc, _opts: Options) -> Result<(), IocError> {
        let peer = self.peer_of(link.id)?;
        if peer.subscribers.is_empty() {
            return Err(IocError::NoEventConsumer);
        }
        peer.begin_op(crate::types::OpState::BusyCbProcEvt)?;
        let delivered = peer.subscribers.dispatch(&desc);
        peer.end_op();
        if delivered == 0 {
            Err(IocError::NoEventConsumer)
        } else {
            Ok(())
        }
    }

    fn exec_cmd(&self, link: &Arc<Link>, desc: &mut CmdDesc, _opts: Options) -> Result<(), IocError> {
        let peer = self.peer_of(link.id)?;
        let handler = peer.cmd_handler().ok_or(IocError::NotSupport)?;

        link.begin_op(crate::types::OpState::BusyCmd)?;
        desc.status = CmdStatus::Sending;
        handler(desc);
        link.end_op();
        Ok(())
    }

    fn send_dat(&self, link: &Arc<Link>, desc: DatDesc, opts: Options) -> Result<(), IocError> {
        let peer = self.peer_of(link.id)?;

        if let Some(handler) = peer.dat_handler() {
            peer.begin_op(crate::types::OpState::BusyDat)?;
            peer.set_sub(crate::types::SubState::DatReceiving);
            handler(&desc);
            peer.end_op();
            return Ok(());
        }

        let mut attempt_desc = desc;
        let budget = self.config.flush_retry_budget;

        for attempt in 0..=budget {
            match peer.push_data(attempt_desc.clone()) {
                Ok(()) => return Ok(()),
                Err(IocError::BufferFull) => {
                    if matches!(opts.blocking, crate::types::Blocking::NonBlock) || attempt == budget {
                        return Err(IocError::BufferFull);
                    }
                    std::thread::sleep(Duration::from_micros(100));
                }
                Err(e) => return Err(e),
            }
        }
        attempt_desc.status = crate::descriptor::DatStatus::Failed;
        Err(IocError::BufferFull)
    }

    fn recv_dat(&self, link: &Arc<Link>, opts: Options) -> Result<DatDesc, IocError> {
        match link.pop_data() {
            Ok(desc) => Ok(desc),
            Err(IocError::NoData) if matches!(opts.blocking, crate::types::Blocking::NonBlock) => {
                Err(IocError::NoData)
            }
            Err(e) => Err(e),
        }
    }

    fn flush_dat(&self, _link: &Arc<Link>) -> Result<(), IocError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EvtDesc;
    use crate::descriptor::EvtId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn paired_links(transport: &FifoTransport, uri: &ServiceUri) -> (Arc<Link>, Arc<Link>) {
        let srv = transport.online_service(uri, LinkUsage::EvtProducer).await.unwrap();
        let client_fut = transport.connect(&ConnArgs {
            uri: uri.clone(),
            usage: LinkUsage::EvtConsumer,
        });
        let (client, server) = tokio::join!(client_fut, async {
            loop {
                if let Ok(link) = transport.accept_client(&srv).await {
                    return link;
                }
                tokio::task::yield_now().await;
            }
        });
        (client.unwrap(), server)
    }

    #[tokio::test]
    async fn connect_and_accept_pair_links() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/evt");
        let (client, server) = paired_links(&transport, &uri).await;
        assert_eq!(client.usage, LinkUsage::EvtConsumer);
        assert_eq!(server.usage, LinkUsage::EvtConsumer);
        assert!(client.is_connected());
        assert!(server.is_connected());
    }

    #[tokio::test]
    async fn post_evt_without_subscriber_fails() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/evt");
        let (client, _server) = paired_links(&transport, &uri).await;
        let evt = EvtDesc::new(EvtId::new(0, 1), 1);
        assert_eq!(
            transport.post_evt(&client, evt, Options::sync_block()),
            Err(IocError::NoEventConsumer)
        );
    }

    #[tokio::test]
    async fn post_evt_delivers_to_peer_subscriber() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/evt");
        let (client, server) = paired_links(&transport, &uri).await;

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        server
            .subscribers
            .insert(Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }), vec![EvtId::new(0, 1)])
            .unwrap();

        let evt = EvtDesc::new(EvtId::new(0, 1), 7);
        transport.post_evt(&client, evt, Options::sync_block()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_dat_invokes_receiver_callback_directly() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/dat-cb");
        let (client, server) = paired_links(&transport, &uri).await;

        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = received.clone();
        server.set_dat_handler(Arc::new(move |desc| {
            received2.lock().extend_from_slice(desc.bytes());
        }));

        transport
            .send_dat(&client, DatDesc::from_bytes(b"hello".to_vec()), Options::sync_block())
            .unwrap();
        assert_eq!(*received.lock(), b"hello");
        assert_eq!(server.op_state(), crate::types::OpState::Ready);
    }

    #[tokio::test]
    async fn data_round_trip_preserves_order() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/dat");
        let (client, server) = paired_links(&transport, &uri).await;

        transport
            .send_dat(&client, DatDesc::from_bytes(b"hello".to_vec()), Options::sync_block())
            .unwrap();
        transport
            .send_dat(&client, DatDesc::from_bytes(b"world".to_vec()), Options::sync_block())
            .unwrap();

        let first = transport.recv_dat(&server, Options::sync_block()).unwrap();
        let second = transport.recv_dat(&server, Options::sync_block()).unwrap();
        assert_eq!(first.bytes(), b"hello");
        assert_eq!(second.bytes(), b"world");
    }

    #[tokio::test]
    async fn close_link_breaks_peer() {
        let transport = FifoTransport::default();
        let uri = ServiceUri::fifo("/evt");
        let (client, server) = paired_links(&transport, &uri).await;
        transport.close_link(&client).await.unwrap();
        assert_eq!(server.conn_state(), ConnState::Broken);
    }
}
