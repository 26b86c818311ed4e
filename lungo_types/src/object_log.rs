//! Object-lifetime logger, compiled in with the `object-log` feature.
//!
//! Records every construction and destruction per value kind plus the set of
//! live allocations, so a shutdown can report exactly what leaked. The
//! bookkeeping is global because values are constructed long before any
//! collector sees them.

use crate::kind::{VALUE_KIND_COUNT, ValueKind};
use crate::pointers::ValueRef;
use dashmap::DashMap;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct ObjectLogger {
    live: DashMap<usize, ValueKind>,
    created: [AtomicUsize; VALUE_KIND_COUNT],
    destroyed: [AtomicUsize; VALUE_KIND_COUNT],
}

fn logger() -> &'static ObjectLogger {
    static LOGGER: OnceLock<ObjectLogger> = OnceLock::new();
    LOGGER.get_or_init(ObjectLogger::default)
}

pub fn log_new(value: ValueRef) {
    let log = logger();
    let kind = value.header().kind();
    log.created[kind as usize].fetch_add(1, Ordering::Relaxed);
    log.live.insert(value.addr(), kind);
}

pub fn log_delete(value: ValueRef) {
    let log = logger();
    let kind = value.header().kind();
    log.destroyed[kind as usize].fetch_add(1, Ordering::Relaxed);
    log.live.remove(&value.addr());
}

/// Number of allocations not yet destroyed.
#[must_use]
pub fn live_count() -> usize {
    logger().live.len()
}

/// Logs the per-kind construction/destruction profile and warns about
/// survivors. Called at collector shutdown.
pub fn report() {
    let log = logger();
    for index in 0..VALUE_KIND_COUNT {
        let created = log.created[index].load(Ordering::Relaxed);
        let destroyed = log.destroyed[index].load(Ordering::Relaxed);
        if created != 0 || destroyed != 0 {
            info!(kind = index, created, destroyed, "object profile");
        }
    }
    let leaked = log.live.len();
    if leaked != 0 {
        warn!(leaked, "values still live at shutdown");
    }
}
