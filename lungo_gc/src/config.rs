//! Configuration and statistics for the collector.

use std::time::Duration;

/// Every `FULL_GC_SCAN_CYCLE`-th scan cycle is a *full* cycle: the delay
/// queue is emptied into the scan set and nothing is deferred.
pub const FULL_GC_SCAN_CYCLE: u64 = 16;

/// Enqueueing `dec_ref` calls between scheduler invocations under normal
/// load.
pub(crate) const INVOKE_INTERVAL: i32 = 1000;

/// Invocation interval once the idle queue has grown past `gc_max`.
pub(crate) const INVOKE_INTERVAL_PRESSURED: i32 = 100;

/// How long a mutator yields to the worker when the idle queue is over
/// `gc_max`. A throttle, not a hard block.
pub(crate) const MUTATOR_THROTTLE: Duration = Duration::from_millis(1);

/// The waiting worker flushes the simple-value queue once it grows past this.
pub(crate) const IDLE2_FLUSH_THRESHOLD: usize = 10;

/// Tuning knobs for the collector.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// Lower work threshold: a scan is only worth starting once this many
    /// values await processing, and it is also the minimum per-invocation
    /// work budget of the incremental scheduler.
    pub gc_min: usize,
    /// Upper backlog threshold: past this, mutators are throttled (concurrent
    /// mode) or invoked more often (incremental mode).
    pub gc_max: usize,
}

impl Default for Configuration {
    /// Creates a default configuration for the collector.
    /// This sets:
    /// - `gc_min` to 1000 values
    /// - `gc_max` to 100 × `gc_min`
    fn default() -> Self {
        Self {
            gc_min: 1000,
            gc_max: 100 * 1000,
        }
    }
}

/// Counters describing collector activity.
#[derive(Clone, Debug, Default)]
pub struct Statistics {
    /// Scan cycles started.
    pub cycles: usize,
    /// Cycles that drained the delay queue into the scan set.
    pub full_cycles: usize,
    /// Cyclic-capable values destroyed.
    pub values_freed: usize,
    /// Simple values destroyed.
    pub simple_freed: usize,
    /// Values pushed to the delay queue by deferral or by surviving a scan.
    pub values_deferred: usize,
}

/// Snapshot of the collector's queue depths.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueDepths {
    pub idle: usize,
    pub work: usize,
    pub delay: usize,
    pub free: usize,
}
