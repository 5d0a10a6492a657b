//! Test-only hooks, grounded on the `CONFIG_BUILD_WITH_UNIT_TESTING`
//! surface in `original_source/Source/_IOC.h`
//! (`IOC_test_setFailNextAlloc`, `IOC_getServiceCount`,
//! `IOC_getLinkCount`). Only compiled for tests; nothing here is reachable
//! from a normal build.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::runtime::Runtime;

static FAIL_NEXT_ALLOC: AtomicBool = AtomicBool::new(false);

/// Arrange for the next allocation-sensitive operation that checks
/// [`consume_fail_next_alloc`] to fail once, then behave normally again.
/// Mirrors `IOC_test_setFailNextAlloc` from the original test harness.
pub fn set_fail_next_alloc() {
    FAIL_NEXT_ALLOC.store(true, Ordering::SeqCst);
}

/// Consume the one-shot failure flag set by [`set_fail_next_alloc`].
/// Returns `true` exactly once per `set_fail_next_alloc` call.
pub fn consume_fail_next_alloc() -> bool {
    FAIL_NEXT_ALLOC.swap(false, Ordering::SeqCst)
}

/// Mirrors `IOC_getServiceCount`: the number of services currently
/// registered on `rt`.
pub fn service_count(rt: &Runtime) -> usize {
    rt.service_count()
}

/// Mirrors `IOC_getLinkCount`: the number of links currently registered
/// on `rt`.
pub fn link_count(rt: &Runtime) -> usize {
    rt.link_count()
}
