//! `iocctl`: a small diagnostic client that exercises the substrate end to
//! end — online a service, connect and accept a peer, subscribe an event
//! handler, then post events and exchange a data chunk, logging each step.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::info;

use ioc_substrate::cli::{Args, Command, Protocol};
use ioc_substrate::config::RuntimeConfig;
use ioc_substrate::descriptor::{DatDesc, EvtDesc, EvtId};
use ioc_substrate::facade;
use ioc_substrate::logging;
use ioc_substrate::runtime::Runtime;
use ioc_substrate::types::{LinkUsage, Options, ServiceUri};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = logging::init_tracing(args.verbose, args.quiet, args.log_file.as_deref());

    match args.command {
        Command::Capability => {
            let cap = facade::get_capability(&Runtime::with_config(RuntimeConfig::default()));
            println!("max_services: {}", cap.max_services);
            println!("max_clients_per_service: {}", cap.max_clients_per_service);
            println!("max_queue_depth: {}", cap.max_queue_depth);
            println!("max_subscribers: {}", cap.max_subscribers);
            println!("max_broadcast_links: {}", cap.max_broadcast_links);
            println!("max_auto_accept_links: {}", cap.max_auto_accept_links);
        }
        Command::Demo {
            protocol,
            path,
            host,
            port,
            events,
            timeout,
        } => run_demo(protocol, path, host, port, events, timeout).await?,
    }

    Ok(())
}

async fn run_demo(
    protocol: Protocol,
    path: String,
    host: String,
    port: u16,
    event_count: u32,
    timeout: Duration,
) -> anyhow::Result<()> {
    let rt = Runtime::with_config(RuntimeConfig::default());

    let uri = match protocol {
        Protocol::Fifo => ServiceUri::fifo(path),
        Protocol::Tcp => ServiceUri::tcp(host, port, "/demo"),
    };
    info!(%uri, "bringing service online");

    let srv_id = facade::online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await?;

    let connect_fut = facade::connect(&rt, uri.clone(), LinkUsage::EvtConsumer);
    tokio::pin!(connect_fut);

    let accept_fut = async {
        loop {
            match facade::accept_client(&rt, srv_id).await {
                Ok(id) => return id,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    };
    tokio::pin!(accept_fut);

    let (client_id, server_id) = tokio::time::timeout(timeout, async {
        tokio::join!(&mut connect_fut, &mut accept_fut)
    })
    .await?;
    let client_id = client_id?;
    info!(%client_id, %server_id, "client connected and accepted");

    let received = Arc::new(AtomicU32::new(0));
    let received2 = received.clone();
    facade::sub_evt(
        &rt,
        server_id,
        Arc::new(move |desc: &EvtDesc| {
            received2.fetch_add(1, Ordering::SeqCst);
            info!(value = desc.evt_value, "event delivered");
        }),
        vec![EvtId::new(0, 1)],
    )?;

    for i in 0..event_count {
        facade::post_evt(
            &rt,
            client_id,
            EvtDesc::new(EvtId::new(0, 1), i),
            Options::sync_block(),
        )?;
    }
    info!(posted = event_count, delivered = received.load(Ordering::SeqCst), "event demo complete");

    facade::send_dat(&rt, client_id, DatDesc::from_bytes(b"hello from iocctl".to_vec()), Options::sync_block())?;
    let chunk = facade::recv_dat(&rt, server_id, Options::sync_block())?;
    info!(bytes = chunk.bytes().len(), "data chunk received");

    facade::close_link(&rt, client_id).await?;
    facade::offline_service(&rt, srv_id).await?;
    info!("demo complete");
    Ok(())
}
