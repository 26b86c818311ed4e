//! The scan driver: per-cycle state and the six-phase cycle-collection
//! algorithm, shared by both schedulers.
//!
//! A cycle runs Prepare → CycRefDec → Deregister → CycRefInc → RefDec → Free.
//! The concurrent worker and the forced [`Collector::collect`] run each phase
//! to completion through the `*_all` drivers here; the incremental scheduler
//! advances the same phases a bounded budget at a time with saved cursors.
//!
//! [`Collector::collect`]: crate::collector::Collector::collect

use crate::collector::Collector;
use crate::config::FULL_GC_SCAN_CYCLE;
use crate::traverse;
use lungo_types::{ValueData, ValueKind, ValueRef, ValueTraits};
use tracing::{debug, trace, warn};

/// Phase of a scan cycle; also the state of the incremental phase machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Phase {
    Prepare,
    CycRefDec,
    Deregister,
    CycRefInc,
    RefDec,
    Free,
}

/// Collector-side scan state. Everything here is touched only while holding
/// the collector's scan mutex: by the worker thread in concurrent mode, or by
/// whichever mutator call is currently advancing the incremental machine.
#[derive(Debug)]
pub(crate) struct ScanState {
    /// This cycle's scan set.
    pub work: Vec<ValueRef>,
    /// Simple values awaiting bulk destruction (concurrent mode).
    pub work2: Vec<ValueRef>,
    /// Values deferred to a future cycle.
    pub delay: Vec<ValueRef>,
    /// Values proven dead, destroyed at the top of the next Prepare.
    pub free: Vec<ValueRef>,
    /// DFS queue for the CycRefInc phase.
    pub aux: Vec<ValueRef>,
    /// Everything whose `alive` flag must be cleared in Free.
    pub aux2: Vec<ValueRef>,
    pub phase: Phase,
    /// Cursor into `work` for the incremental scheduler.
    pub ii: usize,
    /// Cursor into `aux` for the incremental CycRefInc phase.
    pub jj: usize,
    pub cycle: u64,
    /// Smoothed recent delete rate, damping the rc-deferral modulus.
    pub mdelete: f64,
    /// Non-full cycle: deferral is in effect.
    pub delay_mask: bool,
    /// Current rc-deferral decision, recomputed each Prepare.
    pub delay2: u64,
    /// The next Prepare treats its cycle as full regardless of the counter.
    pub force_full: bool,
}

impl ScanState {
    pub(crate) fn new() -> Self {
        Self {
            work: Vec::new(),
            work2: Vec::new(),
            delay: Vec::new(),
            free: Vec::new(),
            aux: Vec::new(),
            aux2: Vec::new(),
            phase: Phase::Prepare,
            ii: 0,
            jj: 0,
            cycle: 0,
            mdelete: 0.0,
            delay_mask: false,
            delay2: 0,
            force_full: false,
        }
    }

    /// Whether the phase machine is between cycles.
    pub(crate) fn idle(&self) -> bool {
        self.phase == Phase::Prepare && self.work.is_empty()
    }

    /// Values tracked outside the idle lists.
    pub(crate) fn backlog(&self) -> usize {
        self.work.len() + self.work2.len() + self.delay.len() + self.free.len()
    }
}

/// Phase 1: adopt the incoming work set, defer what this cycle will not look
/// at, and destroy the garbage proven dead by the previous cycle.
pub(crate) fn prepare_candidates(collector: &Collector, st: &mut ScanState) {
    st.cycle += 1;
    let full =
        st.force_full || collector.is_finalizing() || st.cycle % FULL_GC_SCAN_CYCLE == 0;
    st.force_full = false;
    st.delay_mask = !full;

    // Mark values already awaiting destruction so stale entries in the
    // incoming work set and the delay queue are dropped, not dangled.
    for v in &st.free {
        v.header().set_work(true);
    }

    // Damped delete rate feeds the rc-deferral modulus: a busy heap defers
    // less, a quiet one more.
    st.mdelete = 0.5 * st.mdelete + 0.5 * st.free.len() as f64;
    let modulus = 1 + (100.0 / (1.0 + st.mdelete)) as u64;
    st.delay2 = if collector.is_finalizing() {
        0
    } else {
        st.cycle % modulus
    };

    if full {
        let delayed = std::mem::take(&mut st.delay);
        for v in delayed {
            if v.header().work() {
                continue;
            }
            v.header().set_delay(false);
            st.work.push(v);
        }
    } else if !st.free.is_empty() {
        st.delay.retain(|v| !v.header().work());
    }

    // Deduplicate the work set and apply the deferral predicate.
    let incoming = std::mem::take(&mut st.work);
    let mut deferred = 0usize;
    for v in incoming {
        let header = v.header();
        if header.work() || header.delay() {
            continue;
        }
        let defer = st.delay_mask
            && (header.traits().contains(ValueTraits::DELAY_GC)
                || (st.delay2 != 0 && header.rc() > 0));
        if defer {
            header.set_delay(true);
            st.delay.push(v);
            deferred += 1;
            continue;
        }
        header.set_cyc(header.rc());
        header.set_work(true);
        header.set_alive(false);
        st.work.push(v);
    }

    // Destroy last cycle's garbage. Type values go strictly last: other
    // values carry back-pointers to their type.
    let free = std::mem::take(&mut st.free);
    let mut types = Vec::new();
    let mut freed = 0usize;
    for v in free {
        if v.header().kind() == ValueKind::Type {
            types.push(v);
            continue;
        }
        // Safety: everything on the free queue was proven dead by the
        // previous cycle and its references have been broken.
        unsafe { lungo_types::destroy(v) };
        freed += 1;
    }
    for v in types {
        // Safety: as above.
        unsafe { lungo_types::destroy(v) };
        freed += 1;
    }

    {
        let mut stats = collector.stats();
        stats.cycles += 1;
        if full {
            stats.full_cycles += 1;
        }
        stats.values_freed += freed;
        stats.values_deferred += deferred;
    }
    debug!(
        cycle = st.cycle,
        full,
        work = st.work.len(),
        deferred,
        freed,
        "scan cycle prepared"
    );
}

/// Phase 2, run to completion. The work set grows as the traversal pulls in
/// newly sighted neighbours; they are scanned in the same pass.
pub(crate) fn cyc_dec_scan_all(collector: &Collector, st: &mut ScanState) {
    let mut i = 0;
    while i < st.work.len() {
        let v = st.work[i];
        i += 1;
        if v.header().delay() {
            continue;
        }
        traverse::dec_scan(collector, st, v);
    }
}

/// Phase 3, run to completion: erase registry entries of namespaces whose
/// cycle count shows no remaining external owner, so the registry reference
/// cannot resurrect them and the liveness scan stays accurate.
pub(crate) fn deregister_all(st: &ScanState) {
    for &v in &st.work {
        let header = v.header();
        if header.alive() || header.kind() != ValueKind::Namespace || header.cyc() != 0 {
            continue;
        }
        // Safety: work-queue values stay allocated until the Free phase.
        if let ValueData::Namespace(ns) = unsafe { v.data() } {
            if let Some(registry) = &ns.registry {
                if registry.deregister(&ns.name, v) {
                    trace!(module = %ns.name, "deregistered dead namespace");
                }
            }
        }
    }
}

/// Phase 4, run to completion: every value with a surviving external owner
/// seeds a traversal that marks its whole reachable set alive.
pub(crate) fn cyc_inc_scan_all(collector: &Collector, st: &mut ScanState) {
    let mut i = 0;
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
            alive_scan_all(collector, st);
        }
    }
}

/// Drains the aux queue of one liveness root.
pub(crate) fn alive_scan_all(collector: &Collector, st: &mut ScanState) {
    let mut j = 0;
    while j < st.aux.len() {
        let v = st.aux[j];
        j += 1;
        if v.header().delay() {
            continue;
        }
        traverse::inc_scan(collector, st, v);
    }
}

/// Phase 5, run to completion: dismantle everything not proven alive. A value
/// is skipped only while both its counts are positive; a dead cycle's members
/// keep each other's rc above zero, and breaking the first one drags the rest
/// to zero.
pub(crate) fn ref_dec_scan_all(collector: &Collector, st: &mut ScanState) {
    let mut i = 0;
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
        // Reference counts must not race mutator operations.
        let _idle = collector.lock_idle_for_scan();
        traverse::break_scan(collector, v);
    }
}

/// Phase 6, run to completion: route survivors and corpses, clear scan flags.
pub(crate) fn free_garbage_all(collector: &Collector, st: &mut ScanState) {
    let mut deferred = 0usize;
    let work = std::mem::take(&mut st.work);
    for v in work {
        let header = v.header();
        header.set_work(false);
        header.set_alive(false);
        if header.rc() != 0 {
            if header.cyc() == 0 {
                // Proven unreachable yet still referenced: a leaked owning
                // reference somewhere. Deferring is safe; freeing is not.
                warn!(kind = ?header.kind(), rc = header.rc(), "unreachable value still referenced; deferring");
            }
            header.set_delay(true);
            st.delay.push(v);
            deferred += 1;
            continue;
        }
        st.free.push(v);
    }
    for v in st.aux2.drain(..) {
        v.header().set_alive(false);
    }
    if deferred > 0 {
        collector.stats().values_deferred += deferred;
    }
}

/// Bulk-destroys the simple values handed over in `work2` (concurrent mode).
pub(crate) fn free_simple(collector: &Collector, st: &mut ScanState) {
    if st.work2.is_empty() {
        return;
    }
    let list = std::mem::take(&mut st.work2);
    let mut doomed = Vec::with_capacity(list.len());
    for v in list {
        let header = v.header();
        if header.work() {
            continue;
        }
        header.set_work(true);
        doomed.push(v);
    }
    let count = doomed.len();
    for v in doomed {
        // Safety: rc reached zero before the value entered idle2 and simple
        // values are never referenced from queues twice (work-bit dedup).
        unsafe { lungo_types::destroy(v) };
    }
    collector.note_simple_freed(count);
}

/// One complete scan cycle over the already swapped-in work set.
pub(crate) fn run_cycle(collector: &Collector, st: &mut ScanState, force_full: bool) {
    st.force_full = force_full;
    prepare_candidates(collector, st);
    cyc_dec_scan_all(collector, st);
    deregister_all(st);
    cyc_inc_scan_all(collector, st);
    ref_dec_scan_all(collector, st);
    free_garbage_all(collector, st);
    st.phase = Phase::Prepare;
    st.ii = 0;
    st.jj = 0;
}
