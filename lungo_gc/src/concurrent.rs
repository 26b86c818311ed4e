//! Concurrent scheduler: a dedicated worker thread runs the scan driver
//! end-to-end per cycle, in parallel with the mutators.
//!
//! Synchronization, from the mutator's side: reference counts and both idle
//! queues are touched only under the idle mutex; a mutator that outruns the
//! worker yields for a millisecond; a mutator touching a container the worker
//! is scanning serialises on the data lock through the
//! `scanning`/`mutating` handshake.

use crate::collector::Collector;
use crate::config::{IDLE2_FLUSH_THRESHOLD, MUTATOR_THROTTLE};
use crate::scan;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

/// Cooperative backpressure: an enqueueing mutator that finds the idle queue
/// over `gc_max` waits briefly, giving the worker CPU to catch up. A
/// throttle, not a hard block; nobody signals the condvar.
pub(crate) fn try_block(collector: &Collector, idle_len: usize) {
    if idle_len < collector.gc_max.load(Ordering::Relaxed) {
        return;
    }
    let (lock, condvar) = &collector.block_signal;
    let mut guard = lock.lock();
    let _ = condvar.wait_for(&mut guard, MUTATOR_THROTTLE);
}

/// Worker thread main loop.
pub(crate) fn worker_main(collector: &Collector) {
    debug!("collector worker started");
    let mut last_backlog = usize::MAX;
    let mut stalled = 0;
    loop {
        wait_for_backlog(collector);

        let mut st = collector.scan.lock();
        {
            let mut idle = collector.idle.lock();
            std::mem::swap(&mut idle.idle, &mut st.work);
            std::mem::swap(&mut idle.idle2, &mut st.work2);
        }
        scan::free_simple(collector, &mut st);
        scan::run_cycle(collector, &mut st, false);

        if collector.is_finalizing() {
            let idle_backlog = {
                let idle = collector.idle.lock();
                idle.idle.len() + idle.idle2.len()
            };
            let backlog = idle_backlog + st.backlog();
            if backlog == 0 {
                break;
            }
            if backlog == last_backlog {
                stalled += 1;
                if stalled >= 3 {
                    warn!(remaining = backlog, "finishing with live references; abandoning drain");
                    break;
                }
            } else {
                stalled = 0;
                last_backlog = backlog;
            }
        }
    }
    debug!("collector worker shutting down");
}

/// Naps until a scan is worth starting. The timed wait shrinks as garbage
/// accumulates; while waiting, the simple-value queue is flushed once it
/// grows past a small threshold.
fn wait_for_backlog(collector: &Collector) {
    loop {
        if collector.is_finalizing() {
            return;
        }
        let (idle_len, idle2_len) = {
            let idle = collector.idle.lock();
            (idle.idle.len(), idle.idle2.len())
        };
        let gc_min = collector.gc_min.load(Ordering::Relaxed);
        if 2 * idle_len >= gc_min {
            return;
        }

        #[expect(clippy::cast_precision_loss)]
        let pending = (idle_len + idle2_len) as f64;
        #[expect(clippy::cast_precision_loss)]
        let x = 3.0 * pending / gc_min.max(1) as f64;
        let wait = Duration::from_secs_f64(0.01 * (-x * x).exp());
        {
            let (lock, condvar) = &collector.start_signal;
            let mut guard = lock.lock();
            let _ = condvar.wait_for(&mut guard, wait);
        }

        if idle2_len > IDLE2_FLUSH_THRESHOLD {
            let mut st = collector.scan.lock();
            {
                let mut idle = collector.idle.lock();
                std::mem::swap(&mut idle.idle2, &mut st.work2);
            }
            scan::free_simple(collector, &mut st);
        }
    }
}
