//! S3 from the testable-properties list: FIFO event delivery.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use ioc_substrate::config::RuntimeConfig;
use ioc_substrate::descriptor::{EvtDesc, EvtId};
use ioc_substrate::facade;
use ioc_substrate::runtime::Runtime;
use ioc_substrate::types::{LinkUsage, Options, ServiceUri};

const K: EvtId = EvtId::new(3, 1);

#[tokio::test]
async fn s3_fifo_event_delivery() {
    let rt = Runtime::with_config(RuntimeConfig::for_tests());
    let uri = ServiceUri::fifo("/s3-evt");

    let srv_id = facade::online_service(&rt, uri.clone(), LinkUsage::EvtProducer).await.unwrap();

    let connect_fut = facade::connect(&rt, uri.clone(), LinkUsage::EvtConsumer);
    let (client_id, server_id) = tokio::join!(connect_fut, async {
        loop {
            if let Ok(id) = facade::accept_client(&rt, srv_id).await {
                return id;
            }
            tokio::task::yield_now().await;
        }
    });
    let client_id = client_id.unwrap();

    let seen_value = Arc::new(AtomicU32::new(u32::MAX));
    let delivery_count = Arc::new(AtomicU32::new(0));
    let seen_value2 = seen_value.clone();
    let delivery_count2 = delivery_count.clone();

    facade::sub_evt(
        &rt,
        server_id,
        Arc::new(move |desc: &EvtDesc| {
            assert_eq!(desc.evt_id, K);
            seen_value2.store(desc.evt_value, Ordering::SeqCst);
            delivery_count2.fetch_add(1, Ordering::SeqCst);
        }),
        vec![K],
    )
    .unwrap();

    facade::post_evt(&rt, client_id, EvtDesc::new(K, 42), Options::sync_block()).unwrap();

    assert_eq!(delivery_count.load(Ordering::SeqCst), 1);
    assert_eq!(seen_value.load(Ordering::SeqCst), 42);
}
