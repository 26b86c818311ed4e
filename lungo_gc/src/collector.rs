//! The collector: public API, synchronization state, and the
//! reference-count operations that are the mutator's only entry points.

use crate::concurrent;
use crate::config::{Configuration, INVOKE_INTERVAL, QueueDepths, Statistics};
use crate::error::{Error, Result};
use crate::incremental;
use crate::scan::{self, ScanState};
use lungo_types::{ValueData, ValueKind, ValueMap, ValueRef, ValueSeq, ValueSlot, noncyclic_ctype};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, warn};

/// The queues fed by mutators: cyclic-capable values whose count was dropped
/// since the last swap, and (in concurrent mode) simple values awaiting bulk
/// destruction. Guarded by the idle mutex, which also serialises reference
/// count mutation against the worker's queue swap.
#[derive(Debug, Default)]
pub(crate) struct IdleLists {
    pub idle: Vec<ValueRef>,
    pub idle2: Vec<ValueRef>,
}

/// A hybrid reference-counting / cycle-detecting garbage collector.
///
/// Reference counting reclaims acyclic garbage promptly; a six-phase cycle
/// scan reclaims the rest. The scan runs either cooperatively on the mutator
/// thread, a bounded budget per [`Collector::dec_ref`] (incremental mode), or
/// end-to-end on a dedicated worker thread (concurrent mode, after
/// [`Collector::start_concurrent`]).
///
/// The VM owns one collector per space. Every operation that touches a
/// reference count goes through here; value payloads are otherwise the
/// mutator's business.
pub struct Collector {
    this: Weak<Self>,
    pub(crate) gc_min: AtomicUsize,
    pub(crate) gc_max: AtomicUsize,
    pub(crate) finalizing: AtomicBool,
    pub(crate) concurrent: AtomicBool,
    pub(crate) invoke_countdown: AtomicI32,
    /// Container currently being scanned; the mutator half of the handshake
    /// compares against it. SeqCst together with the containers' `mutating`
    /// flags: each side stores its own flag then loads the other's.
    scanning: AtomicPtr<()>,
    pub(crate) idle: Mutex<IdleLists>,
    pub(crate) scan: Mutex<ScanState>,
    /// Held while scanning a container a mutator has flagged, and by the
    /// mutator that saw its container being scanned.
    data_lock: Mutex<()>,
    /// The worker naps on this between scans; the wait is timed, so nobody
    /// has to signal it.
    pub(crate) start_signal: (Mutex<()>, Condvar),
    /// Mutators yield on this when the idle queue outgrows `gc_max`.
    pub(crate) block_signal: (Mutex<()>, Condvar),
    stats: Mutex<Statistics>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Collector {
    /// Creates a collector with the default configuration.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(Configuration::default())
    }

    /// Creates a collector with custom thresholds.
    #[must_use]
    pub fn with_config(config: Configuration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            gc_min: AtomicUsize::new(config.gc_min),
            gc_max: AtomicUsize::new(config.gc_max),
            finalizing: AtomicBool::new(false),
            concurrent: AtomicBool::new(false),
            invoke_countdown: AtomicI32::new(INVOKE_INTERVAL),
            scanning: AtomicPtr::new(std::ptr::null_mut()),
            idle: Mutex::new(IdleLists::default()),
            scan: Mutex::new(ScanState::new()),
            data_lock: Mutex::new(()),
            start_signal: (Mutex::new(()), Condvar::new()),
            block_signal: (Mutex::new(()), Condvar::new()),
            stats: Mutex::new(Statistics::default()),
            worker: Mutex::new(None),
        })
    }

    /// Readies the collector. Idempotent; the queues already exist, so this
    /// only clears a previous shutdown request.
    pub fn start(&self) {
        self.finalizing.store(false, Ordering::SeqCst);
        debug!("collector started");
    }

    /// Switches to concurrent mode: drains any cooperative scan in progress,
    /// then launches the worker thread. Requires [`Collector::start`] first.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned or the
    /// collector handle is gone.
    pub fn start_concurrent(&self) -> Result<()> {
        if self.concurrent.load(Ordering::Relaxed) {
            return Ok(());
        }
        // Hand the incremental machine's backlog over cleanly first.
        self.finalizing.store(true, Ordering::SeqCst);
        incremental::drain(self);
        self.finalizing.store(false, Ordering::SeqCst);

        let Some(collector) = self.this.upgrade() else {
            return Err(Error::Sync("collector already dropped".to_string()));
        };
        self.concurrent.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("lungo-gc".to_string())
            .spawn(move || concurrent::worker_main(&collector));
        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                debug!("concurrent collector started");
                Ok(())
            }
            Err(error) => {
                self.concurrent.store(false, Ordering::SeqCst);
                Err(error.into())
            }
        }
    }

    /// Whether the dedicated worker is running.
    #[must_use]
    pub fn is_concurrent(&self) -> bool {
        self.concurrent.load(Ordering::Relaxed)
    }

    /// Drains every queue and joins the worker. All owning references the VM
    /// holds must have been released first; if something still owns a value,
    /// the drain stops after warning rather than spinning.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread panicked.
    pub fn finish(&self) -> Result<()> {
        self.finalizing.store(true, Ordering::SeqCst);
        if self.concurrent.load(Ordering::Relaxed) {
            self.gc_min.store(0, Ordering::Relaxed);
            let handle = self.worker.lock().take();
            if let Some(handle) = handle {
                handle
                    .join()
                    .map_err(|_| Error::Sync("collector worker panicked".to_string()))?;
            }
            self.concurrent.store(false, Ordering::Relaxed);
        } else {
            incremental::drain(self);
        }
        #[cfg(feature = "object-log")]
        lungo_types::object_log::report();
        debug!("collector finished");
        Ok(())
    }

    /// Runs one complete *full* scan cycle synchronously: finishes any scan
    /// in progress, adopts everything released so far, and scans it with
    /// deferral disabled. Garbage found by this cycle is destroyed at the
    /// start of the next one.
    pub fn collect(&self) {
        let mut st = self.scan.lock();
        while !st.idle() {
            incremental::step(self, &mut st);
        }
        {
            let mut idle = self.idle.lock();
            std::mem::swap(&mut idle.idle, &mut st.work);
            std::mem::swap(&mut idle.idle2, &mut st.work2);
        }
        scan::free_simple(self, &mut st);
        scan::run_cycle(self, &mut st, true);
    }

    /// Takes an owning reference to `v`. A no-op for `None`.
    pub fn inc_ref(&self, v: Option<ValueRef>) {
        let Some(v) = v else { return };
        let header = v.header();
        if header.kind().is_cyclic() {
            // Keeps the scratch count an upper bound while the value sits in
            // a scan queue.
            header.inc_cyc();
        }
        if self.concurrent.load(Ordering::Relaxed) {
            let _idle = self.idle.lock();
            header.inc_rc();
        } else {
            header.inc_rc();
        }
    }

    /// Releases an owning reference to `v`. A no-op for `None`. May advance
    /// the incremental scan (incremental mode) or briefly throttle the
    /// calling thread (concurrent mode, idle queue over `gc_max`).
    pub fn dec_ref(&self, v: Option<ValueRef>) {
        let Some(v) = v else { return };
        let (enqueued, idle_len) = {
            let mut idle = self.idle.lock();
            let enqueued = self.release(&mut idle, v);
            (enqueued, idle.idle.len())
        };
        if !enqueued {
            return;
        }
        if self.concurrent.load(Ordering::Relaxed) {
            concurrent::try_block(self, idle_len);
        } else {
            incremental::try_invoke(self, idle_len);
        }
    }

    /// Stores `v` into `slot`, adjusting both counts. The new owner is raised
    /// before the old one is released, so a value moving between its own
    /// slots never transits through zero; re-assigning the same value is a
    /// no-op.
    pub fn assign(&self, slot: &mut ValueSlot, v: Option<ValueRef>) {
        if slot.get() == v {
            return;
        }
        self.inc_ref(v);
        let old = slot.take();
        slot.set(v);
        self.dec_ref(old);
    }

    /// Requests prompt collection of a possibly-orphaned graph without
    /// requiring the caller to own a reference: a paired raise and release.
    pub fn try_delete(&self, v: Option<ValueRef>) {
        self.inc_ref(v);
        self.dec_ref(v);
    }

    /// Reads and optionally updates `gc_min`. Returns the previous value;
    /// `n <= 0` leaves it unchanged.
    pub fn gc_min(&self, n: isize) -> usize {
        let previous = self.gc_min.load(Ordering::Relaxed);
        if n > 0 {
            #[expect(clippy::cast_sign_loss)]
            self.gc_min.store(n as usize, Ordering::Relaxed);
        }
        previous
    }

    /// Reads and optionally updates `gc_max`. Returns the previous value;
    /// `n <= 0` leaves it unchanged.
    pub fn gc_max(&self, n: isize) -> usize {
        let previous = self.gc_max.load(Ordering::Relaxed);
        if n > 0 {
            #[expect(clippy::cast_sign_loss)]
            self.gc_max.store(n as usize, Ordering::Relaxed);
        }
        previous
    }

    /// Mutator handshake for a sequence about to be mutated. Fast path when
    /// the collector is not looking at this container; otherwise the returned
    /// guard holds the data lock. Dropping the guard ends the mutation
    /// window.
    pub fn lock_seq(&self, seq: &ValueSeq) -> ContainerGuard<'_> {
        self.lock_container(
            seq.kind() == lungo_types::DataKind::Values,
            seq.mutation_flag(),
            seq.scan_tag(),
        )
    }

    /// Mutator handshake for a map about to be mutated; see
    /// [`Collector::lock_seq`].
    pub fn lock_map(&self, map: &ValueMap) -> ContainerGuard<'_> {
        self.lock_container(map.holds_values(), map.mutation_flag(), map.scan_tag())
    }

    fn lock_container(
        &self,
        holds_values: bool,
        flag: &std::sync::atomic::AtomicBool,
        tag: *const (),
    ) -> ContainerGuard<'_> {
        if !self.concurrent.load(Ordering::Relaxed) || !holds_values {
            return ContainerGuard {
                flag: None,
                data: None,
            };
        }
        flag.store(true, Ordering::SeqCst);
        let flag = Some(NonNull::from(flag));
        if self.scanning.load(Ordering::SeqCst) != tag.cast_mut() {
            return ContainerGuard { flag, data: None };
        }
        // The collector is scanning exactly this container; serialise.
        ContainerGuard {
            flag,
            data: Some(self.data_lock.lock()),
        }
    }

    /// Current collection statistics.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats.lock().clone()
    }

    /// Snapshot of the queue depths. Blocks while a concurrent scan cycle is
    /// in flight.
    #[must_use]
    pub fn queues(&self) -> QueueDepths {
        let st = self.scan.lock();
        let idle = self.idle.lock().idle.len();
        QueueDepths {
            idle,
            work: st.work.len(),
            delay: st.delay.len(),
            free: st.free.len(),
        }
    }

    pub(crate) fn is_finalizing(&self) -> bool {
        self.finalizing.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> MutexGuard<'_, Statistics> {
        self.stats.lock()
    }

    pub(crate) fn note_simple_freed(&self, count: usize) {
        if count > 0 {
            self.stats.lock().simple_freed += count;
        }
    }

    pub(crate) fn begin_container_scan(&self, tag: *const ()) {
        self.scanning.store(tag.cast_mut(), Ordering::SeqCst);
    }

    pub(crate) fn end_container_scan(&self) {
        self.scanning.store(std::ptr::null_mut(), Ordering::SeqCst);
    }

    /// Data lock for a container scan; nothing to lock against in
    /// incremental mode.
    pub(crate) fn lock_data(&self) -> Option<MutexGuard<'_, ()>> {
        if self.concurrent.load(Ordering::Relaxed) {
            Some(self.data_lock.lock())
        } else {
            None
        }
    }

    /// Idle-list lock wrapped around each break-mode traversal in concurrent
    /// mode, so direct count drops cannot race mutator operations.
    pub(crate) fn lock_idle_for_scan(&self) -> Option<MutexGuard<'_, IdleLists>> {
        if self.concurrent.load(Ordering::Relaxed) {
            Some(self.idle.lock())
        } else {
            None
        }
    }

    /// The release half of `dec_ref`, under the idle lock. Returns whether
    /// the value was enqueued for the scheduler.
    fn release(&self, idle: &mut IdleLists, v: ValueRef) -> bool {
        let header = v.header();
        if header.rc() <= 0 {
            warn!(kind = ?header.kind(), "release of a value with no owners");
            return false;
        }
        if header.dec_rc() == 0 {
            match header.kind() {
                kind if kind.is_simple() => {
                    if self.concurrent.load(Ordering::Relaxed) {
                        idle.idle2.push(v);
                    } else {
                        // Safety: the last owner is gone and simple values
                        // are never queued, so nothing else can reach this.
                        unsafe { lungo_types::destroy(v) };
                        self.stats.lock().simple_freed += 1;
                    }
                    return false;
                }
                ValueKind::Tuple | ValueKind::List => self.clear_noncyclic(idle, v),
                _ => {}
            }
        }
        // Simple values never enter the cyclic queues.
        if header.kind().is_simple() {
            return false;
        }
        // Every cyclic-capable value whose count was dropped is a possible
        // cycle root; Prepare deduplicates and defers. Values already on the
        // delay queue are tracked there.
        if header.delay() {
            return false;
        }
        idle.idle.push(v);
        true
    }

    /// Inline release of a container whose type promises no cycles: clear
    /// the slots now, let the empty shell ride the queues for bulk
    /// reclamation.
    fn clear_noncyclic(&self, idle: &mut IdleLists, v: ValueRef) {
        // Safety: rc just reached zero; the releasing thread is the last one
        // touching the payload.
        match unsafe { v.data_mut() } {
            ValueData::Tuple(d) if noncyclic_ctype(d.ctype) => {
                let slots = std::mem::take(&mut d.slots);
                for mut slot in slots {
                    if let Some(child) = slot.take() {
                        self.release(idle, child);
                    }
                }
            }
            ValueData::List(d) if noncyclic_ctype(d.ctype) => {
                for slot in d.items.slots_mut() {
                    if let Some(child) = slot.take() {
                        self.release(idle, child);
                    }
                }
                d.items.clear();
            }
            _ => {}
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            if let Err(error) = self.finish() {
                warn!("collector worker shut down uncleanly: {error}");
            }
        }
    }
}

/// Token returned by the mutator-side container handshake
/// ([`Collector::lock_seq`] / [`Collector::lock_map`]). Dropping it ends the
/// mutation window and releases the data lock if one was taken.
pub struct ContainerGuard<'c> {
    flag: Option<NonNull<std::sync::atomic::AtomicBool>>,
    data: Option<MutexGuard<'c, ()>>,
}

impl ContainerGuard<'_> {
    /// Whether the slow path was taken (the collector was scanning this
    /// container and the data lock is held).
    #[must_use]
    pub fn locked(&self) -> bool {
        self.data.is_some()
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        if let Some(flag) = self.flag {
            // Safety: the container outlives its mutation guard; the guard is
            // dropped on the thread that created it.
            unsafe { flag.as_ref() }.store(false, Ordering::SeqCst);
        }
    }
}
