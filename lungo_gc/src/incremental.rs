//! Incremental scheduler: advances the scan driver a bounded budget at a
//! time on the mutator's own thread.
//!
//! Enqueueing `dec_ref` calls tick a countdown; when it reaches zero the
//! scheduler either continues the scan in progress or starts a new one by
//! swapping the idle queue into the work set. Each invocation performs at
//! most `max(gc_min, |work| / 4)` work units in the current phase, where a
//! unit is one value or one reference touched, then saves its cursor and
//! returns to the interpreter.

use crate::collector::Collector;
use crate::config::{INVOKE_INTERVAL, INVOKE_INTERVAL_PRESSURED};
use crate::scan::{self, Phase, ScanState};
use crate::traverse;
use std::sync::atomic::Ordering;
use tracing::warn;

/// Countdown trigger, called from an enqueueing `dec_ref`.
pub(crate) fn try_invoke(collector: &Collector, idle_len: usize) {
    if collector.scan.is_locked() {
        return;
    }
    if collector.invoke_countdown.fetch_sub(1, Ordering::Relaxed) - 1 > 0 {
        return;
    }
    let reload = if idle_len < collector.gc_max.load(Ordering::Relaxed) {
        INVOKE_INTERVAL
    } else {
        INVOKE_INTERVAL_PRESSURED
    };
    collector.invoke_countdown.store(reload, Ordering::Relaxed);

    let Some(mut st) = collector.scan.try_lock() else {
        return;
    };
    if !st.idle() {
        step(collector, &mut st);
    } else if idle_len > collector.gc_min.load(Ordering::Relaxed) {
        switch_scan(collector, &mut st);
    }
}

/// Starts a new scan by swapping the idle queue into the work set.
pub(crate) fn switch_scan(collector: &Collector, st: &mut ScanState) {
    {
        let mut idle = collector.idle.lock();
        std::mem::swap(&mut idle.idle, &mut st.work);
    }
    st.phase = Phase::Prepare;
    st.ii = 0;
    st.jj = 0;
    step(collector, st);
}

/// Advances the phase machine by one bounded step.
pub(crate) fn step(collector: &Collector, st: &mut ScanState) {
    match st.phase {
        Phase::Prepare => {
            scan::prepare_candidates(collector, st);
            st.phase = Phase::CycRefDec;
            st.ii = 0;
        }
        Phase::CycRefDec => dec_step(collector, st),
        Phase::Deregister => dereg_step(st),
        Phase::CycRefInc => inc_step(collector, st),
        Phase::RefDec => refdec_step(collector, st),
        Phase::Free => free_step(collector, st),
    }
}

/// Runs the phase machine until every queue is empty. Used by `finish` in
/// incremental mode and by the handover into concurrent mode. Stops with a
/// warning if a pass makes no progress, which means the caller still owns
/// references it never released.
pub(crate) fn drain(collector: &Collector) {
    let mut st = collector.scan.lock();
    let mut last = usize::MAX;
    let mut stalled = 0;
    loop {
        let idle_backlog = {
            let idle = collector.idle.lock();
            idle.idle.len() + idle.idle2.len()
        };
        let backlog = idle_backlog + st.backlog();
        if backlog == 0 {
            break;
        }
        if backlog == last {
            stalled += 1;
            if stalled >= 3 {
                warn!(remaining = backlog, "finishing with live references; abandoning drain");
                break;
            }
        } else {
            stalled = 0;
            last = backlog;
        }

        while !st.idle() {
            step(collector, &mut st);
        }
        {
            let mut idle = collector.idle.lock();
            std::mem::swap(&mut idle.idle, &mut st.work);
            std::mem::swap(&mut idle.idle2, &mut st.work2);
        }
        scan::free_simple(collector, &mut st);
        loop {
            step(collector, &mut st);
            if st.idle() {
                break;
            }
        }
    }
}

/// Per-invocation work budget.
fn budget(collector: &Collector, st: &ScanState) -> usize {
    (st.work.len() / 4)
        .max(collector.gc_min.load(Ordering::Relaxed))
        .max(1)
}

fn dec_step(collector: &Collector, st: &mut ScanState) {
    let min = budget(collector, st);
    let mut i = st.ii;
    let mut done = 0;
    while i < st.work.len() {
        let v = st.work[i];
        i += 1;
        if !v.header().delay() {
            done += traverse::dec_scan(collector, st, v);
        }
        if done >= min {
            break;
        }
    }
    if i >= st.work.len() {
        st.ii = 0;
        st.phase = Phase::Deregister;
    } else {
        st.ii = i;
    }
}

fn dereg_step(st: &mut ScanState) {
    // Cheap pointer walk; no need to meter it.
    scan::deregister_all(st);
    st.ii = 0;
    st.phase = Phase::CycRefInc;
}

fn inc_step(collector: &Collector, st: &mut ScanState) {
    let min = budget(collector, st);
    let mut done = 0;
    // Finish the liveness traversal left over from the previous invocation.
    if st.jj > 0 {
        done += alive_step(collector, st, min);
        if st.jj > 0 {
            return;
        }
    }
    let mut i = st.ii;
    let mut paused = false;
    while i < st.work.len() {
        let v = st.work[i];
        i += 1;
        let header = v.header();
        if header.alive() {
            continue;
        }
        if header.cyc() > 0 {
            st.aux.clear();
            header.set_alive(true);
            st.aux.push(v);
            done += alive_step(collector, st, min);
            if st.jj > 0 || done >= min {
                paused = true;
                break;
            }
        }
    }
    if paused {
        st.ii = i;
    } else {
        st.ii = 0;
        st.phase = Phase::RefDec;
    }
}

/// Drains (part of) the aux queue of the current liveness root.
fn alive_step(collector: &Collector, st: &mut ScanState, min: usize) -> usize {
    let mut j = st.jj;
    let mut done = 0;
    while j < st.aux.len() {
        let v = st.aux[j];
        j += 1;
        if !v.header().delay() {
            done += traverse::inc_scan(collector, st, v);
        }
        if done >= min {
            break;
        }
    }
    if j >= st.aux.len() {
        st.jj = 0;
    } else {
        st.jj = j;
    }
    done
}

fn refdec_step(collector: &Collector, st: &mut ScanState) {
    let min = budget(collector, st);
    let mut i = st.ii;
    let mut done = 0;
    while i < st.work.len() {
        let v = st.work[i];
        i += 1;
        let header = v.header();
        if header.cyc() > 0 && header.rc() > 0 {
            continue;
        }
        if header.delay() {
            continue;
        }
        let _idle = collector.lock_idle_for_scan();
        done += traverse::break_scan(collector, v);
        if done >= min {
            break;
        }
    }
    if i >= st.work.len() {
        st.ii = 0;
        st.phase = Phase::Free;
    } else {
        st.ii = i;
    }
}

fn free_step(collector: &Collector, st: &mut ScanState) {
    let min = budget(collector, st);
    let mut i = st.ii;
    let mut done = 0;
    let mut deferred = 0usize;
    while i < st.work.len() {
        let v = st.work[i];
        i += 1;
        let header = v.header();
        header.set_work(false);
        header.set_alive(false);
        if header.rc() != 0 {
            if header.cyc() == 0 {
                warn!(kind = ?header.kind(), rc = header.rc(), "unreachable value still referenced; deferring");
            }
            header.set_delay(true);
            st.delay.push(v);
            deferred += 1;
        } else {
            st.free.push(v);
        }
        done += 1;
        if done >= min {
            break;
        }
    }
    if i >= st.work.len() {
        st.work.clear();
        st.ii = 0;
        st.phase = Phase::Prepare;
    } else {
        st.ii = i;
    }
    for v in st.aux2.drain(..) {
        v.header().set_alive(false);
    }
    if deferred > 0 {
        collector.stats().values_deferred += deferred;
    }
}
