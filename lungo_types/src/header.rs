use crate::kind::{ValueKind, ValueTraits};
use bitflags::bitflags;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

bitflags! {
    /// Per-cycle scratch flags maintained by the collector.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct GcFlags: u8 {
        /// The value is in the current cycle's work queue.
        const WORK = 0b0000_0001;
        /// Proven reachable from an external owner during the current cycle.
        const ALIVE = 0b0000_0010;
        /// The value sits in the delay queue, deferred to a later cycle.
        const DELAY = 0b0000_0100;
    }
}

/// GC bookkeeping embedded at the head of every managed value.
///
/// Write discipline: `work`, `alive` and `delay` are written only by the
/// collector. `rc` is modified under the collector's idle-list mutex in
/// concurrent mode. `cyc` is a scratch counter: `inc_ref` bumps it at any
/// time so that it stays an upper bound for an already-enqueued value, and
/// the collector resets it to `rc` when a scan cycle adopts the value; its
/// content between scans is otherwise meaningless.
///
/// All fields use relaxed atomics. Ordering between threads comes from the
/// mutexes and the container handshake, not from the fields themselves.
#[derive(Debug)]
pub struct GcHeader {
    kind: ValueKind,
    traits: ValueTraits,
    rc: AtomicI32,
    cyc: AtomicI32,
    flags: AtomicU8,
}

impl GcHeader {
    /// Creates a header for a freshly constructed value with one owning
    /// reference (the creator's).
    #[must_use]
    pub fn new(kind: ValueKind, traits: ValueTraits) -> Self {
        Self {
            kind,
            traits,
            rc: AtomicI32::new(1),
            cyc: AtomicI32::new(0),
            flags: AtomicU8::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    #[must_use]
    pub fn traits(&self) -> ValueTraits {
        self.traits
    }

    #[must_use]
    pub fn rc(&self) -> i32 {
        self.rc.load(Ordering::Relaxed)
    }

    pub fn inc_rc(&self) {
        self.rc.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops the reference count by one, returning the new count.
    pub fn dec_rc(&self) -> i32 {
        self.rc.fetch_sub(1, Ordering::Relaxed) - 1
    }

    #[must_use]
    pub fn cyc(&self) -> i32 {
        self.cyc.load(Ordering::Relaxed)
    }

    pub fn set_cyc(&self, n: i32) {
        self.cyc.store(n, Ordering::Relaxed);
    }

    pub fn inc_cyc(&self) {
        self.cyc.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops the cycle count by one, returning the new count.
    pub fn dec_cyc(&self) -> i32 {
        self.cyc.fetch_sub(1, Ordering::Relaxed) - 1
    }

    #[must_use]
    pub fn work(&self) -> bool {
        self.flag(GcFlags::WORK)
    }

    pub fn set_work(&self, on: bool) {
        self.set_flag(GcFlags::WORK, on);
    }

    #[must_use]
    pub fn alive(&self) -> bool {
        self.flag(GcFlags::ALIVE)
    }

    pub fn set_alive(&self, on: bool) {
        self.set_flag(GcFlags::ALIVE, on);
    }

    #[must_use]
    pub fn delay(&self) -> bool {
        self.flag(GcFlags::DELAY)
    }

    pub fn set_delay(&self, on: bool) {
        self.set_flag(GcFlags::DELAY, on);
    }

    fn flag(&self, flag: GcFlags) -> bool {
        GcFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)).contains(flag)
    }

    fn set_flag(&self, flag: GcFlags, on: bool) {
        if on {
            self.flags.fetch_or(flag.bits(), Ordering::Relaxed);
        } else {
            self.flags.fetch_and(!flag.bits(), Ordering::Relaxed);
        }
    }
}
