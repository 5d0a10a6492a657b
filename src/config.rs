//! Runtime configuration: the handful of knobs that are fixed constants
//! in the original C sources but are worth exposing as overridable fields
//! for tests (a fresh [`crate::runtime::Runtime`] per test with a tiny
//! queue depth makes overflow scenarios fast and deterministic instead of
//! needing 64 real posts).

use std::time::Duration;

use crate::transport::TransportConfig;

/// Top-level runtime configuration, threaded into
/// [`crate::runtime::Runtime::with_config`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Override for the Conles/FIFO event queue capacity. `None` uses the
    /// compiled-in default (64).
    pub queue_capacity: Option<usize>,

    /// Override for the subscriber list capacity. `None` uses the
    /// compiled-in default (16).
    pub subscriber_capacity: Option<usize>,

    pub fifo_transport: TransportConfig,

    /// How long `sync_block` style calls will retry before giving up with
    /// `Timeout`, when no more specific timeout was supplied.
    pub default_block_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: None,
            subscriber_capacity: None,
            fifo_transport: TransportConfig::default(),
            default_block_timeout: Duration::from_secs(5),
        }
    }
}

impl RuntimeConfig {
    /// A configuration tuned for fast, deterministic unit tests: a small
    /// queue and subscriber list so overflow/capacity scenarios don't
    /// need dozens of iterations.
    pub fn for_tests() -> Self {
        Self {
            queue_capacity: Some(4),
            subscriber_capacity: Some(2),
            fifo_transport: TransportConfig {
                connect_timeout: Duration::from_millis(500),
                flush_retry_budget: 4,
            },
            default_block_timeout: Duration::from_millis(200),
        }
    }
}
