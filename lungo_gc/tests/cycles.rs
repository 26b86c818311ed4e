//! Cycle detection and reclamation tests.

mod common;

use lungo_gc::Collector;
use lungo_types::{Value, ValueSlot};

#[test_log::test]
fn two_tuple_cycle_is_reclaimed() {
    let gc = Collector::new();
    gc.start();
    let x = Value::new_tuple(ValueSlot::EMPTY, 1);
    let y = Value::new_tuple(ValueSlot::EMPTY, 1);
    common::tuple_set(&gc, x, 0, Some(y));
    common::tuple_set(&gc, y, 0, Some(x));
    gc.dec_ref(Some(x));
    gc.dec_ref(Some(y));

    // One full cycle proves both dead and breaks the cycle; they wait on the
    // free queue.
    gc.collect();
    assert_eq!(gc.queues().free, 2);
    assert_eq!(gc.statistics().values_freed, 0);

    // The next cycle destroys them.
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 2);
    assert_eq!(gc.queues().free, 0);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn retained_cycle_survives_on_delay() {
    let gc = Collector::new();
    gc.start();
    let x = Value::new_tuple(ValueSlot::EMPTY, 1);
    let y = Value::new_tuple(ValueSlot::EMPTY, 1);
    common::tuple_set(&gc, x, 0, Some(y));
    common::tuple_set(&gc, y, 0, Some(x));
    // Keep the external reference to x; release only y.
    gc.dec_ref(Some(y));

    gc.collect();
    assert_eq!(gc.statistics().values_freed, 0);
    assert_eq!(gc.queues().delay, 2);
    assert!(x.header().rc() >= 1);
    assert!(y.header().rc() >= 1);

    // Another cycle with the owner still there changes nothing.
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 0);

    // Dropping the owner lets the scan take the whole cycle.
    gc.dec_ref(Some(x));
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 2);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn self_referencing_tuple_is_reclaimed() {
    let gc = Collector::new();
    gc.start();
    let v = Value::new_tuple(ValueSlot::EMPTY, 1);
    common::tuple_set(&gc, v, 0, Some(v));
    assert_eq!(v.header().rc(), 2);
    gc.dec_ref(Some(v));

    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 1);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn long_ring_reclaimed_in_bounded_cycles() {
    let gc = Collector::new();
    gc.start();
    let head = common::tuple_ring(&gc, 100);
    gc.dec_ref(Some(head));

    // The whole ring must go within one scan of the orphaned head plus one
    // destruction pass.
    gc.collect();
    assert_eq!(gc.queues().free, 100);
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 100);
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn cycle_through_list_and_map() {
    let gc = Collector::new();
    gc.start();
    // list -> map (as a value, under a tuple key) -> list again.
    let list = Value::new_list(ValueSlot::EMPTY);
    let map = Value::new_map(ValueSlot::EMPTY);
    let key = Value::new_tuple(ValueSlot::EMPTY, 0);
    common::list_push(&gc, list, map);
    common::map_insert(&gc, map, key, list);
    gc.dec_ref(Some(key));
    gc.dec_ref(Some(map));
    gc.dec_ref(Some(list));

    gc.collect();
    gc.collect();
    let stats = gc.statistics();
    assert_eq!(stats.values_freed, 3);
    assert_eq!(gc.queues(), lungo_gc::QueueDepths::default());
    gc.finish().expect("clean shutdown");
}

#[test_log::test]
fn mixed_graph_partial_release() {
    let gc = Collector::new();
    gc.start();
    // A cycle of two objects plus an acyclic list hanging off of it.
    let class = Value::new_class("Node");
    let a = Value::new_object(ValueSlot::EMPTY, 2);
    let b = Value::new_object(ValueSlot::EMPTY, 2);
    {
        // Safety: the test is the only mutator.
        let lungo_types::ValueData::Object(data) = (unsafe { a.data_mut() }) else {
            panic!("expected an object");
        };
        gc.assign(&mut data.class, Some(class));
        gc.assign(&mut data.fields[0], Some(b));
    }
    {
        let lungo_types::ValueData::Object(data) = (unsafe { b.data_mut() }) else {
            panic!("expected an object");
        };
        gc.assign(&mut data.class, Some(class));
        gc.assign(&mut data.fields[0], Some(a));
    }
    let list = common::int_list(&gc, 3);
    {
        let lungo_types::ValueData::Object(data) = (unsafe { a.data_mut() }) else {
            panic!("expected an object");
        };
        gc.assign(&mut data.fields[1], Some(list));
    }
    gc.dec_ref(Some(list));
    gc.dec_ref(Some(a));
    gc.dec_ref(Some(b));

    // The class is still externally owned; the objects and the list are not.
    gc.collect();
    gc.collect();
    let stats = gc.statistics();
    assert_eq!(stats.values_freed, 3);
    assert_eq!(stats.simple_freed, 3);
    assert_eq!(class.header().rc(), 1);

    gc.dec_ref(Some(class));
    gc.collect();
    gc.collect();
    assert_eq!(gc.statistics().values_freed, 4);
    gc.finish().expect("clean shutdown");
}
