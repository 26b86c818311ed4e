//! # Lungo GC
//!
//! A hybrid reference-counting / cycle-detecting garbage collector for the
//! Lungo VM.
//!
//! ## Overview
//!
//! Ownership is expressed through per-value reference counts, maintained by
//! the mutator through exactly three operations: [`Collector::inc_ref`],
//! [`Collector::dec_ref`] and [`Collector::assign`]. Counting reclaims
//! acyclic garbage promptly; reference cycles are found and dismantled by a
//! periodic scan over the values whose counts were recently dropped.
//!
//! ## The scan
//!
//! One scan cycle runs six phases over its work set:
//!
//! 1. **Prepare** — adopt the idle queue, deduplicate, defer what this cycle
//!    will not look at, destroy the garbage proven dead last cycle.
//! 2. **CycRefDec** — seed each value's cycle count from its reference count
//!    and subtract every reference originating inside the work set; what
//!    remains is the count of *external* owners.
//! 3. **Deregister** — erase the module-registry entries of namespaces with
//!    no external owner left, so the registry cannot resurrect them.
//! 4. **CycRefInc** — from every value that still has an external owner,
//!    transitively mark everything reachable alive and restore its counts.
//! 5. **RefDec** — dismantle what was not proven alive: drop neighbour
//!    counts directly and null the slots, breaking cycles without recursion.
//! 6. **Free** — route corpses to the free queue and survivors to the delay
//!    queue, and clear the per-cycle flags.
//!
//! ## Two schedulers, one driver
//!
//! - **Incremental** (default): the scan advances cooperatively on the
//!   mutator's own thread, a bounded budget per triggering `dec_ref`, with
//!   saved cursors between invocations. No other threads exist.
//! - **Concurrent** ([`Collector::start_concurrent`]): a dedicated worker
//!   runs whole cycles in parallel with any number of mutator threads.
//!   Reference counts are serialised by the idle-list mutex, shared
//!   containers by the `scanning`/`mutating` handshake, and a mutator that
//!   outruns the worker is throttled for a millisecond at a time.
//!
//! Simple values (integers, floats, strings) can never participate in a
//! cycle: their reference count reaching zero frees them immediately, or, in
//! concurrent mode, hands them to the worker for bulk destruction.
//!
//! The per-kind traversal contract lives in [`lungo_types`]: every
//! cyclic-capable value kind exposes its outbound reference slots to the
//! collector's dispatch, and nothing else about a payload is the collector's
//! business.

mod collector;
mod concurrent;
mod config;
mod error;
mod incremental;
mod scan;
mod traverse;

pub use collector::{Collector, ContainerGuard};
pub use config::{Configuration, FULL_GC_SCAN_CYCLE, QueueDepths, Statistics};
pub use error::{Error, Result};
