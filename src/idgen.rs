//! Process-wide monotonic id allocation for links and services, shared by
//! every transport so that ids stay unique across the whole link/service
//! arena regardless of which transport minted them.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{LinkId, SrvId};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SRV_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SEQ_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-unique link id. Starts at 1; 0 is reserved
/// for [`LinkId::AUTO`].
pub fn next_link_id() -> LinkId {
    LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
}

pub fn next_srv_id() -> SrvId {
    SrvId(NEXT_SRV_ID.fetch_add(1, Ordering::Relaxed))
}

/// Allocate the next message sequence id, stamped onto every descriptor
/// the facade hands to a transport.
pub fn next_seq_id() -> u64 {
    NEXT_SEQ_ID.fetch_add(1, Ordering::Relaxed)
}
