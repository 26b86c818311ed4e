//! Collector lifecycle and reference-count operation tests.

mod common;

use lungo_gc::{Collector, Configuration};
use lungo_types::{Value, ValueSlot};

#[test_log::test]
fn start_is_idempotent() {
    let gc = Collector::new();
    gc.start();
    gc.start();
    let stats = gc.statistics();
    assert_eq!(stats.cycles, 0);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn finish_on_empty_heap() {
    let gc = Collector::new();
    gc.start();
    gc.finish().expect("clean shutdown");
    assert_eq!(gc.queues().idle, 0);
}

#[test_log::test]
fn with_config_applies_thresholds() {
    let gc = Collector::with_config(Configuration {
        gc_min: 10,
        gc_max: 50,
    });
    gc.start();
    assert_eq!(gc.gc_min(-1), 10);
    assert_eq!(gc.gc_max(-1), 50);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn threshold_setters_return_previous() {
    let gc = Collector::new();
    gc.start();
    assert_eq!(gc.gc_min(500), 1000);
    assert_eq!(gc.gc_min(-1), 500);
    assert_eq!(gc.gc_min(0), 500);
    assert_eq!(gc.gc_max(2000), 100_000);
    assert_eq!(gc.gc_max(-7), 2000);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn dec_ref_of_none_is_a_noop() {
    let gc = Collector::new();
    gc.start();
    gc.dec_ref(None);
    gc.inc_ref(None);
    assert_eq!(gc.queues().idle, 0);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn simple_value_freed_synchronously() {
    let gc = Collector::new();
    gc.start();
    let n = Value::new_int(42);
    gc.dec_ref(Some(n));
    let stats = gc.statistics();
    assert_eq!(stats.simple_freed, 1);
    // Simple values never enter the cyclic queues.
    assert_eq!(gc.queues().idle, 0);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn inc_dec_round_trip_preserves_count() {
    let gc = Collector::new();
    gc.start();
    let tuple = Value::new_tuple(ValueSlot::EMPTY, 0);
    gc.inc_ref(Some(tuple));
    gc.dec_ref(Some(tuple));
    assert_eq!(tuple.header().rc(), 1);
    // Releasing the last owner eventually frees it.
    gc.dec_ref(Some(tuple));
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 1);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn assign_is_idempotent() {
    let gc = Collector::new();
    gc.start();
    let x = Value::new_tuple(ValueSlot::EMPTY, 0);
    let mut slot = ValueSlot::EMPTY;
    gc.assign(&mut slot, Some(x));
    assert_eq!(x.header().rc(), 2);
    gc.assign(&mut slot, Some(x));
    assert_eq!(x.header().rc(), 2);
    gc.assign(&mut slot, None);
    assert_eq!(x.header().rc(), 1);
    gc.dec_ref(Some(x));
    gc.collect();
    gc.collect();
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn assign_survives_self_assignment_at_rc_one() {
    let gc = Collector::new();
    gc.start();
    let x = Value::new_tuple(ValueSlot::EMPTY, 0);
    let mut a = ValueSlot::new(Some(x));
    let mut b = ValueSlot::EMPTY;
    // Move the only owning reference between slots; the count must never
    // transit through zero.
    gc.assign(&mut b, a.get());
    gc.assign(&mut a, None);
    assert_eq!(x.header().rc(), 1);
    assert_eq!(b.get(), Some(x));
    gc.dec_ref(b.take());
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 1);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn list_release_frees_contents() {
    let gc = Collector::new();
    gc.start();
    let list = common::int_list(&gc, 3);
    let before = gc.statistics();
    assert_eq!(before.simple_freed, 0);

    gc.dec_ref(Some(list));
    gc.collect();
    // Slot clearing frees the integers on the spot; the list itself is
    // proven dead and waits on the free queue.
    let mid = gc.statistics();
    assert_eq!(mid.simple_freed, 3);
    assert_eq!(gc.queues().free, 1);

    gc.collect();
    let after = gc.statistics();
    assert_eq!(after.values_freed, 1);
    assert_eq!(gc.queues().free, 0);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn noncyclic_container_clears_inline() {
    let gc = Collector::new();
    gc.start();
    let frozen = Value::new_type("list<int>", true);
    gc.inc_ref(Some(frozen));
    // The list owns one of the two references to its type.
    let list = Value::new_list(ValueSlot::new(Some(frozen)));
    for i in 0..4 {
        let n = Value::new_int(i);
        common::list_push(&gc, list, n);
        gc.dec_ref(Some(n));
    }
    // Inline release: the integers die with the last list reference, before
    // any scan runs.
    gc.dec_ref(Some(list));
    assert_eq!(gc.statistics().simple_freed, 4);

    gc.dec_ref(Some(frozen));
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 2);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn try_delete_respects_unaccounted_owner() {
    let gc = Collector::new();
    gc.start();
    // The test itself plays the unaccounted owner.
    let v = Value::new_tuple(ValueSlot::EMPTY, 0);
    gc.try_delete(Some(v));
    gc.collect();
    assert_eq!(v.header().rc(), 1);
    assert_eq!(gc.statistics().values_freed, 0);
    // The scan saw a surviving owner and parked the value on delay.
    assert_eq!(gc.queues().delay, 1);

    // Once the real owner lets go, the next full cycles reclaim it.
    gc.dec_ref(Some(v));
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 1);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn incremental_scheduler_collects_under_churn() {
    let gc = Collector::new();
    gc.start();
    gc.gc_min(64);
    // Enough enqueueing releases to trip the invoke countdown repeatedly.
    for _ in 0..20_000 {
        let t = Value::new_tuple(ValueSlot::EMPTY, 0);
        gc.dec_ref(Some(t));
    }
    let stats = gc.statistics();
    assert!(stats.cycles >= 1, "no scan cycle ran under churn");
    assert!(stats.values_freed > 0, "churned tuples were never reclaimed");
    gc.finish().expect("clean shutdown");
    assert_eq!(gc.queues(), lungo_gc::QueueDepths::default());
}

#[test_log::test]
fn consecutive_full_cycles_are_idempotent() {
    let gc = Collector::new();
    gc.start();
    let list = common::int_list(&gc, 5);
    let keeper = Value::new_tuple(ValueSlot::EMPTY, 1);
    common::tuple_set(&gc, keeper, 0, Some(list));
    gc.dec_ref(Some(list));

    gc.collect();
    gc.collect();
    let first = gc.statistics();
    let rc_before = keeper.header().rc();

    // With no mutator activity in between, another full cycle must not
    // change the heap.
    gc.collect();
    let second = gc.statistics();
    assert_eq!(second.values_freed, first.values_freed);
    assert_eq!(second.simple_freed, first.simple_freed);
    assert_eq!(keeper.header().rc(), rc_before);

    common::tuple_set(&gc, keeper, 0, None);
    gc.dec_ref(Some(keeper));
    gc.collect();
    gc.collect();
    gc.finish().expect("clean shutdown");
}
