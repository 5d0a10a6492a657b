//! Supplementary networked transport: the same service/link contract as
//! [`super::fifo::FifoTransport`], carried over TCP with length-prefixed
//! `bincode` frames.
//!
//! Framing is grounded on the teacher's
//! `ipc/unix_domain_socket.rs::{read_message, write_message}` (u32
//! little-endian length prefix, then a `bincode`-encoded payload, with the
//! same 16 MiB sanity cap on an inbound length). This transport is outside
//! spec.md's named core (§4.6 only names the FIFO transport); it exists to
//! give `TransportMethods` a second, non-trivial implementor, the way the
//! teacher repo itself ships more than one `IpcTransport`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, warn};

use crate::descriptor::{CmdDesc, DatDesc, EvtDesc};
use crate::error::IocError;
use crate::idgen;
use crate::link::Link;
use crate::service::Service;
use crate::types::{ConnState, LinkUsage, Options, ServiceUri};

use super::{ConnArgs, TransportMethods};

const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
enum Frame {
    Evt(EvtDesc),
    Dat(DatDesc),
    Cmd(CmdDesc),
}

async fn read_frame(stream: &mut OwnedReadHalf) -> Result<Frame, IocError> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .await
        .map_err(|_| IocError::LinkBroken)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(IocError::InvalidParam(format!("frame too large: {len} bytes")));
    }
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.map_err(|_| IocError::LinkBroken)?;
    bincode::deserialize(&buf).map_err(|e| IocError::bug(format!("frame decode: {e}")))
}

async fn write_frame(stream: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), IocError> {
    let bytes = bincode::serialize(frame).map_err(|e| IocError::bug(format!("frame encode: {e}")))?;
    let len = bytes.len() as u32;
    stream
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|_| IocError::LinkBroken)?;
    stream.write_all(&bytes).await.map_err(|_| IocError::LinkBroken)?;
    stream.flush().await.map_err(|_| IocError::LinkBroken)?;
    Ok(())
}

struct Conn {
    write_half: AsyncMutex<OwnedWriteHalf>,
    read_half: AsyncMutex<OwnedReadHalf>,
}

struct ListenerState {
    accepted_rx: AsyncMutex<mpsc::Receiver<TcpStream>>,
}

struct Inner {
    services: HashMap<String, Arc<Service>>,
    listeners: HashMap<String, Arc<ListenerState>>,
    conns: HashMap<crate::types::LinkId, Arc<Conn>>,
}

/// The networked TCP transport. Like [`super::fifo::FifoTransport`], a
/// single process-wide instance is owned by [`crate::runtime::Runtime`].
pub struct TcpTransport {
    inner: SyncMutex<Inner>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            inner: SyncMutex::new(Inner {
                services: HashMap::new(),
                listeners: HashMap::new(),
                conns: HashMap::new(),
            }),
        }
    }

    fn bind_addr(uri: &ServiceUri) -> Result<String, IocError> {
        let port = uri
            .port
            .ok_or_else(|| IocError::InvalidParam("tcp service uri requires a port".into()))?;
        Ok(format!("{}:{}", uri.host, port))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportMethods for TcpTransport {
    fn protocol(&self) -> &'static str {
        ServiceUri::PROTO_TCP
    }

    async fn online_service(&self, uri: &ServiceUri, usage: LinkUsage) -> Result<Arc<Service>, IocError> {
        let key = uri.to_string();
        {
            let inner = self.inner.lock();
            if inner.services.contains_key(&key) {
                return Err(IocError::InvalidParam(format!("service already online at {key}")));
            }
        }

        let addr = Self::bind_addr(uri)?;
        let listener = TcpListener::bind(&addr).await.map_err(|e| IocError::bug(format!("bind {addr}: {e}")))?;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "tcp transport accepted connection");
                        if tx.send(stream).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("tcp accept loop ending: {e}");
                        break;
                    }
                }
            }
        });

        let srv = Arc::new(Service::new(idgen::next_srv_id(), uri.clone(), usage));
        let mut inner = self.inner.lock();
        inner.services.insert(key.clone(), srv.clone());
        inner.listeners.insert(
            key,
            Arc::new(ListenerState {
                accepted_rx: AsyncMutex::new(rx),
            }),
        );
        Ok(srv)
    }

    async fn offline_service(&self, srv: &Arc<Service>) -> Result<(), IocError> {
        srv.offline();
        let mut inner = self.inner.lock();
        let key = srv.uri.to_string();
        inner.services.remove(&key);
        inner.listeners.remove(&key);
        Ok(())
    }

    async fn connect(&self, args: &ConnArgs) -> Result<Arc<Link>, IocError> {
        let addr = Self::bind_addr(&args.uri)?;
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|_| IocError::NotExistService)?;
        let (read_half, write_half) = stream.into_split();

        let link = Arc::new(Link::new(idgen::next_link_id(), args.usage, Some(args.uri.clone())));
        link.set_conn(ConnState::Connected);

        let mut inner = self.inner.lock();
        inner.conns.insert(
            link.id,
            Arc::new(Conn {
                write_half: AsyncMutex::new(write_half),
                read_half: AsyncMutex::new(read_half),
            }),
        );
        Ok(link)
    }

    async fn accept_client(&self, srv: &Arc<Service>) -> Result<Arc<Link>, IocError> {
        let listener = {
            let inner = self.inner.lock();
            inner
                .listeners
                .get(&srv.uri.to_string())
                .cloned()
                .ok_or(IocError::NotExistService)?
        };

        let stream = {
            let mut rx = listener.accepted_rx.lock().await;
            rx.recv().await.ok_or(IocError::LinkBroken)?
        };
        let (read_half, write_half) = stream.into_split();

        let link = Arc::new(Link::new(idgen::next_link_id(), srv.usage.complement(), None));
        link.set_conn(ConnState::Connected);

        {
            let mut inner = self.inner.lock();
            inner.conns.insert(
                link.id,
                Arc::new(Conn {
                    write_half: AsyncMutex::new(write_half),
                    read_half: AsyncMutex::new(read_half),
                }),
            );
        }
        srv.accept(link.clone())?;
        Ok(link)
    }

    async fn close_link(&self, link: &Arc<Link>) -> Result<(), IocError> {
        let mut inner = self.inner.lock();
        inner.conns.remove(&link.id);
        link.mark_broken();
        Ok(())
    }

    fn post_evt(&self, link: &Arc<Link>, desc: EvtDesc, _opts: Options) -> Result<(), IocError> {
        let conn = {
            let inner = self.inner.lock();
            inner.conns.get(&link.id).cloned().ok_or(IocError::LinkBroken)?
        };
        Handle::current().block_on(async {
            let mut w = conn.write_half.lock().await;
            write_frame(&mut w, &Frame::Evt(desc)).await
        })
    }

    fn exec_cmd(&self, link: &Arc<Link>, desc: &mut CmdDesc, _opts: Options) -> Result<(), IocError> {
        let conn = {
            let inner = self.inner.lock();
            inner.conns.get(&link.id).cloned().ok_or(IocError::LinkBroken)?
        };
        Handle::current().block_on(async {
            {
                let mut w = conn.write_half.lock().await;
                write_frame(&mut w, &Frame::Cmd(desc.clone())).await?;
            }
            let mut r = conn.read_half.lock().await;
            match read_frame(&mut r).await? {
                Frame::Cmd(reply) => {
                    *desc = reply;
                    Ok(())
                }
                _ => Err(IocError::bug("expected Cmd frame in reply")),
            }
        })
    }

    fn send_dat(&self, link: &Arc<Link>, desc: DatDesc, _opts: Options) -> Result<(), IocError> {
        let conn = {
            let inner = self.inner.lock();
            inner.conns.get(&link.id).cloned().ok_or(IocError::LinkBroken)?
        };
        Handle::current().block_on(async {
            let mut w = conn.write_half.lock().await;
            write_frame(&mut w, &Frame::Dat(desc)).await
        })
    }

    fn recv_dat(&self, link: &Arc<Link>, _opts: Options) -> Result<DatDesc, IocError> {
        let conn = {
            let inner = self.inner.lock();
            inner.conns.get(&link.id).cloned().ok_or(IocError::LinkBroken)?
        };
        Handle::current().block_on(async {
            let mut r = conn.read_half.lock().await;
            match read_frame(&mut r).await? {
                Frame::Dat(desc) => Ok(desc),
                _ => Err(IocError::bug("expected Dat frame")),
            }
        })
    }

    fn flush_dat(&self, _link: &Arc<Link>) -> Result<(), IocError> {
        Ok(())
    }
}
