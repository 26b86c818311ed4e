//! Graph-building helpers shared by the integration tests. They play the
//! role of the VM's value operations: every stored reference goes through
//! `assign`, and container mutations take the collector handshake.

#![allow(dead_code)]

use lungo_gc::Collector;
use lungo_types::{MapEntry, MapKey, Value, ValueData, ValueRef, ValueSlot};

/// Appends `item` to a list value, taking an owning reference to it.
pub fn list_push(gc: &Collector, list: ValueRef, item: ValueRef) {
    // Safety: the test owns the list; no other mutator exists for it.
    let ValueData::List(data) = (unsafe { list.data_mut() }) else {
        panic!("expected a list");
    };
    let _guard = gc.lock_seq(&data.items);
    data.items.push(ValueSlot::EMPTY);
    let slot = data.items.last_slot_mut().expect("slot just pushed");
    gc.assign(slot, Some(item));
}

/// Stores `value` into a tuple slot, taking an owning reference to it.
pub fn tuple_set(gc: &Collector, tuple: ValueRef, index: usize, value: Option<ValueRef>) {
    // Safety: the test owns the tuple; no other mutator exists for it.
    let ValueData::Tuple(data) = (unsafe { tuple.data_mut() }) else {
        panic!("expected a tuple");
    };
    gc.assign(&mut data.slots[index], value);
}

/// Inserts a key/value pair into a map value, taking owning references to
/// both sides.
pub fn map_insert(gc: &Collector, map: ValueRef, key: ValueRef, value: ValueRef) {
    // Safety: the test owns the map; no other mutator exists for it.
    let ValueData::Map(data) = (unsafe { map.data_mut() }) else {
        panic!("expected a map");
    };
    let _guard = gc.lock_map(&data.entries);
    data.entries.push(MapEntry {
        key: MapKey::Value(ValueSlot::EMPTY),
        value: ValueSlot::EMPTY,
    });
    let entry = data.entries.last_entry_mut().expect("entry just pushed");
    if let MapKey::Value(slot) = &mut entry.key {
        gc.assign(slot, Some(key));
    }
    gc.assign(&mut entry.value, Some(value));
}

/// Builds a fresh list of `len` integers, releasing the test's references to
/// the integers so the list is their sole owner. Returns the list, owned by
/// the caller.
pub fn int_list(gc: &Collector, len: i64) -> ValueRef {
    let list = Value::new_list(ValueSlot::EMPTY);
    for i in 0..len {
        let n = Value::new_int(i);
        list_push(gc, list, n);
        gc.dec_ref(Some(n));
    }
    list
}

/// Builds a ring of `len` single-slot tuples, each pointing at the next, and
/// releases the test's references to all members except the returned head.
pub fn tuple_ring(gc: &Collector, len: usize) -> ValueRef {
    assert!(len >= 1);
    let head = Value::new_tuple(ValueSlot::EMPTY, 1);
    let mut prev = head;
    for _ in 1..len {
        let next = Value::new_tuple(ValueSlot::EMPTY, 1);
        tuple_set(gc, prev, 0, Some(next));
        gc.dec_ref(Some(next));
        prev = next;
    }
    tuple_set(gc, prev, 0, Some(head));
    head
}
