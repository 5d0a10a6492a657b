//! Static capability limits and role-negotiation helpers — spec.md §4.9.
//!
//! The constants are carried over verbatim from
//! `original_source/Source/_IOC.h`'s `_MAX_IOC_SRV_OBJ_NUM` (2),
//! `_MAX_IOC_CLI_OBJ_NUM_PER_SRV` (3) and
//! `_CONLES_EVENT_MAX_QUEUING_EVTDESC` (64), plus the Conles subscriber
//! cap of 16, and `_IOC_Types.h`'s per-accept-table bounds
//! `_MAX_BROADCAST_EVENT_ACCEPTED_LINK_NUM` (3) and
//! `_MAX_AUTO_ACCEPT_ACCEPTED_LINK_NUM` (16) — spec.md itself leaves these
//! values unspecified, so the original's constants resolve the ambiguity
//! rather than inventing new ones.

use crate::error::IocError;
use crate::types::LinkUsage;

/// Process-wide static limits.
pub struct Limits;

impl Limits {
    pub const MAX_SERVICES: usize = 2;
    pub const MAX_CLIENTS_PER_SERVICE: usize = 3;
    pub const MAX_QUEUE_DEPTH: usize = 64;
    pub const MAX_SUBSCRIBERS: usize = 16;
    pub const MAX_BROADCAST_LINKS: usize = 3;
    pub const MAX_AUTO_ACCEPT_LINKS: usize = 16;
}

/// A snapshot of [`Limits`] plus whatever a caller wants to query by id,
/// the query surface spec.md names as crossing into the core (role
/// negotiation reads these; broader capability reporting is out of
/// scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityDescription {
    pub max_services: usize,
    pub max_clients_per_service: usize,
    pub max_queue_depth: usize,
    pub max_subscribers: usize,
    pub max_broadcast_links: usize,
    pub max_auto_accept_links: usize,
}

impl CapabilityDescription {
    pub fn current() -> Self {
        Self {
            max_services: Limits::MAX_SERVICES,
            max_clients_per_service: Limits::MAX_CLIENTS_PER_SERVICE,
            max_queue_depth: Limits::MAX_QUEUE_DEPTH,
            max_subscribers: Limits::MAX_SUBSCRIBERS,
            max_broadcast_links: Limits::MAX_BROADCAST_LINKS,
            max_auto_accept_links: Limits::MAX_AUTO_ACCEPT_LINKS,
        }
    }
}

/// Validate that a client's requested usage may connect to a service
/// advertising `service_usage`; the two must be complementary pairs
/// (producer/consumer, initiator/executor, sender/receiver).
pub fn negotiate(service_usage: LinkUsage, requested_usage: LinkUsage) -> Result<(), IocError> {
    if requested_usage == service_usage.complement() {
        Ok(())
    } else {
        Err(IocError::NotSupport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_accepts_complement_only() {
        assert!(negotiate(LinkUsage::EvtProducer, LinkUsage::EvtConsumer).is_ok());
        assert_eq!(
            negotiate(LinkUsage::EvtProducer, LinkUsage::EvtProducer),
            Err(IocError::NotSupport)
        );
    }
}
