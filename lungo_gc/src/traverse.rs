//! Traversal dispatch: enumerates the outbound references of one value.
//!
//! Three modes drive the whole cycle-detection algorithm:
//!
//! - `Dec` — first sight of a neighbour pulls it into the work queue with its
//!   cycle count seeded from its reference count; every sighting then drops
//!   the neighbour's cycle count by one. After the CycRefDec phase a value's
//!   cycle count equals the number of owners *outside* the scan set.
//! - `Inc` — marks a neighbour alive and re-raises its cycle count,
//!   transitively proving everything reachable from an externally-owned root.
//! - `Break` — drops the neighbour's reference count directly and nulls the
//!   slot, dismantling a proven-dead cycle at the graph level without
//!   recursing into the collector.
//!
//! Containers that a mutator might still be touching are scanned under the
//! `scanning`/`mutating`/data-lock handshake; `Break` skips the handshake
//! because by then no mutator can reach the container.

use crate::collector::Collector;
use crate::scan::ScanState;
use lungo_types::{
    MapKey, ValueData, ValueMap, ValueRef, ValueSeq, ValueSlot, ValueTraits, noncyclic_ctype,
};
use tracing::warn;

/// Mode for the shared (non-breaking) container scans.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Action {
    Dec,
    Inc,
}

/// Dec-mode callback for one outbound reference.
pub(crate) fn cyc_ref_dec(st: &mut ScanState, slot: ValueSlot) {
    let Some(v) = slot.get() else { return };
    let header = v.header();
    if header.kind().is_simple() {
        return;
    }
    if st.delay_mask && header.traits().contains(ValueTraits::DELAY_GC) && !header.delay() {
        st.delay.push(v);
        header.set_cyc(header.rc());
        header.set_delay(true);
        return;
    }
    if !header.work() {
        st.work.push(v);
        header.set_cyc(header.rc());
        header.set_work(true);
    }
    if header.dec_cyc() < 0 {
        // A traversal reported a reference this value does not own; a
        // missing inc_ref upstream. Clamp and keep going.
        warn!(kind = ?header.kind(), "cycle count went negative; clamping");
        header.set_cyc(0);
    }
}

/// Inc-mode callback for one outbound reference.
pub(crate) fn cyc_ref_inc(st: &mut ScanState, slot: ValueSlot) {
    let Some(v) = slot.get() else { return };
    let header = v.header();
    if header.kind().is_simple() {
        return;
    }
    header.inc_cyc();
    if !header.alive() {
        header.set_alive(true);
        st.aux.push(v);
        st.aux2.push(v);
    }
}

/// Break-mode callback: drop the neighbour's count and null the slot. A
/// simple neighbour whose count reaches zero is freed on the spot; cyclic
/// neighbours are already in the work queue.
pub(crate) fn break_ref(collector: &Collector, slot: &mut ValueSlot) {
    let Some(v) = slot.take() else { return };
    let header = v.header();
    if header.dec_rc() == 0 && header.kind().is_simple() {
        // Safety: the last reference is gone and simple values are never
        // queued, so nothing else can reach this allocation.
        unsafe { lungo_types::destroy(v) };
        collector.note_simple_freed(1);
    }
}

fn scan_slot(st: &mut ScanState, slot: ValueSlot, action: Action) {
    match action {
        Action::Dec => cyc_ref_dec(st, slot),
        Action::Inc => cyc_ref_inc(st, slot),
    }
}

/// Scans a shared sequence under the mutator handshake.
fn scan_seq(
    collector: &Collector,
    st: &mut ScanState,
    seq: &ValueSeq,
    action: Action,
) -> usize {
    if seq.kind() != lungo_types::DataKind::Values || seq.is_empty() {
        return 0;
    }
    collector.begin_container_scan(seq.scan_tag());
    while seq.is_mutating() {
        std::hint::spin_loop();
    }
    let guard = collector.lock_data();
    for slot in seq.slots() {
        scan_slot(st, *slot, action);
    }
    drop(guard);
    collector.end_container_scan();
    seq.len()
}

/// Scans a shared map under the mutator handshake, touching only the sides
/// its tags declare as managed.
fn scan_map(
    collector: &Collector,
    st: &mut ScanState,
    map: &ValueMap,
    action: Action,
) -> usize {
    let gc_keys = map.key_kind() == lungo_types::DataKind::Values;
    let gc_vals = map.val_kind() == lungo_types::DataKind::Values;
    if (!gc_keys && !gc_vals) || map.is_empty() {
        return 0;
    }
    collector.begin_container_scan(map.scan_tag());
    while map.is_mutating() {
        std::hint::spin_loop();
    }
    let guard = collector.lock_data();
    let mut count = 0;
    for entry in map.entries() {
        if gc_keys {
            if let MapKey::Value(slot) = &entry.key {
                scan_slot(st, *slot, action);
                count += 1;
            }
        }
        if gc_vals {
            scan_slot(st, entry.value, action);
            count += 1;
        }
    }
    drop(guard);
    collector.end_container_scan();
    count
}

/// Breaks every reference in a sequence and clears it. No handshake: only
/// proven-dead containers get here.
fn break_seq(collector: &Collector, seq: &mut ValueSeq) -> usize {
    if seq.kind() != lungo_types::DataKind::Values {
        return 0;
    }
    let count = seq.len();
    for slot in seq.slots_mut() {
        break_ref(collector, slot);
    }
    seq.clear();
    count
}

/// Breaks every managed key and value in a map, then clears and retags it.
fn break_map(collector: &Collector, map: &mut ValueMap) -> usize {
    let gc_keys = map.key_kind() == lungo_types::DataKind::Values;
    let gc_vals = map.val_kind() == lungo_types::DataKind::Values;
    if !gc_keys && !gc_vals {
        return 0;
    }
    let mut count = 0;
    for entry in map.entries_mut() {
        if gc_keys {
            if let MapKey::Value(slot) = &mut entry.key {
                break_ref(collector, slot);
                count += 1;
            }
        }
        if gc_vals {
            break_ref(collector, &mut entry.value);
            count += 1;
        }
    }
    map.set_raw();
    map.clear();
    count
}

/// Dec-mode traversal of one value. Returns the work units touched.
pub(crate) fn dec_scan(collector: &Collector, st: &mut ScanState, v: ValueRef) -> usize {
    let mut count = 1;
    // Safety: values in the work queue stay allocated until the Free phase.
    let data = unsafe { v.data() };
    match data {
        ValueData::None | ValueData::Int(_) | ValueData::Float(_) | ValueData::Str(_) => {}
        ValueData::Enum(d) => cyc_ref_dec(st, d.etype),
        ValueData::Constant(d) => cyc_ref_dec(st, d.value),
        ValueData::Variable(d) => {
            cyc_ref_dec(st, d.value);
            cyc_ref_dec(st, d.dtype);
            count += 1;
        }
        ValueData::Tuple(d) => {
            cyc_ref_dec(st, d.ctype);
            if !noncyclic_ctype(d.ctype) {
                for slot in &d.slots {
                    cyc_ref_dec(st, *slot);
                }
                count += d.slots.len();
            }
        }
        ValueData::List(d) => {
            cyc_ref_dec(st, d.ctype);
            if !noncyclic_ctype(d.ctype) {
                count += scan_seq(collector, st, &d.items, Action::Dec);
            }
        }
        ValueData::Map(d) => {
            cyc_ref_dec(st, d.ctype);
            count += scan_map(collector, st, &d.entries, Action::Dec);
        }
        ValueData::Object(d) => {
            for slot in &d.fields {
                cyc_ref_dec(st, *slot);
            }
            cyc_ref_dec(st, d.class);
            count += d.fields.len();
        }
        ValueData::Class(d) => {
            cyc_ref_dec(st, d.cls_type);
            cyc_ref_dec(st, d.ctor);
            count += scan_seq(collector, st, &d.constants, Action::Dec);
            count += scan_seq(collector, st, &d.variables, Action::Dec);
            count += scan_seq(collector, st, &d.bases, Action::Dec);
            count += scan_map(collector, st, &d.methods, Action::Dec);
        }
        ValueData::Interface(d) => {
            cyc_ref_dec(st, d.abtype);
            count += scan_seq(collector, st, &d.supers, Action::Dec);
            count += scan_map(collector, st, &d.methods, Action::Dec);
        }
        ValueData::Namespace(d) => {
            count += scan_seq(collector, st, &d.constants, Action::Dec);
            count += scan_seq(collector, st, &d.variables, Action::Dec);
            count += scan_seq(collector, st, &d.aux, Action::Dec);
            count += scan_map(collector, st, &d.types, Action::Dec);
        }
        ValueData::Routine(d) => {
            cyc_ref_dec(st, d.rtype);
            cyc_ref_dec(st, d.host);
            cyc_ref_dec(st, d.nspace);
            count += scan_seq(collector, st, &d.consts, Action::Dec);
            count += scan_seq(collector, st, &d.overloads, Action::Dec);
        }
        ValueData::Process(d) => {
            cyc_ref_dec(st, d.future);
            count += scan_seq(collector, st, &d.exceptions, Action::Dec);
            count += scan_seq(collector, st, &d.defers, Action::Dec);
            for slot in &d.stack {
                cyc_ref_dec(st, *slot);
            }
            count += d.stack.len();
            for frame in &d.frames {
                cyc_ref_dec(st, frame.routine);
                cyc_ref_dec(st, frame.object);
                cyc_ref_dec(st, frame.rtype);
            }
            count += 3 * d.frames.len();
        }
        ValueData::Type(d) => {
            cyc_ref_dec(st, d.aux);
            cyc_ref_dec(st, d.value);
            cyc_ref_dec(st, d.quadtype);
            count += scan_seq(collector, st, &d.nested, Action::Dec);
            count += scan_seq(collector, st, &d.bases, Action::Dec);
            count += scan_map(collector, st, &d.interfaces, Action::Dec);
        }
    }
    count
}

/// Inc-mode traversal of one value. Returns the work units touched.
pub(crate) fn inc_scan(collector: &Collector, st: &mut ScanState, v: ValueRef) -> usize {
    let mut count = 1;
    // Safety: values in the aux queue stay allocated until the Free phase.
    let data = unsafe { v.data() };
    match data {
        ValueData::None | ValueData::Int(_) | ValueData::Float(_) | ValueData::Str(_) => {}
        ValueData::Enum(d) => cyc_ref_inc(st, d.etype),
        ValueData::Constant(d) => cyc_ref_inc(st, d.value),
        ValueData::Variable(d) => {
            cyc_ref_inc(st, d.value);
            cyc_ref_inc(st, d.dtype);
            count += 1;
        }
        ValueData::Tuple(d) => {
            cyc_ref_inc(st, d.ctype);
            if !noncyclic_ctype(d.ctype) {
                for slot in &d.slots {
                    cyc_ref_inc(st, *slot);
                }
                count += d.slots.len();
            }
        }
        ValueData::List(d) => {
            cyc_ref_inc(st, d.ctype);
            if !noncyclic_ctype(d.ctype) {
                count += scan_seq(collector, st, &d.items, Action::Inc);
            }
        }
        ValueData::Map(d) => {
            cyc_ref_inc(st, d.ctype);
            count += scan_map(collector, st, &d.entries, Action::Inc);
        }
        ValueData::Object(d) => {
            for slot in &d.fields {
                cyc_ref_inc(st, *slot);
            }
            cyc_ref_inc(st, d.class);
            count += d.fields.len();
        }
        ValueData::Class(d) => {
            cyc_ref_inc(st, d.cls_type);
            cyc_ref_inc(st, d.ctor);
            count += scan_seq(collector, st, &d.constants, Action::Inc);
            count += scan_seq(collector, st, &d.variables, Action::Inc);
            count += scan_seq(collector, st, &d.bases, Action::Inc);
            count += scan_map(collector, st, &d.methods, Action::Inc);
        }
        ValueData::Interface(d) => {
            cyc_ref_inc(st, d.abtype);
            count += scan_seq(collector, st, &d.supers, Action::Inc);
            count += scan_map(collector, st, &d.methods, Action::Inc);
        }
        ValueData::Namespace(d) => {
            count += scan_seq(collector, st, &d.constants, Action::Inc);
            count += scan_seq(collector, st, &d.variables, Action::Inc);
            count += scan_seq(collector, st, &d.aux, Action::Inc);
            count += scan_map(collector, st, &d.types, Action::Inc);
        }
        ValueData::Routine(d) => {
            cyc_ref_inc(st, d.rtype);
            cyc_ref_inc(st, d.host);
            cyc_ref_inc(st, d.nspace);
            count += scan_seq(collector, st, &d.consts, Action::Inc);
            count += scan_seq(collector, st, &d.overloads, Action::Inc);
        }
        ValueData::Process(d) => {
            cyc_ref_inc(st, d.future);
            count += scan_seq(collector, st, &d.exceptions, Action::Inc);
            count += scan_seq(collector, st, &d.defers, Action::Inc);
            for slot in &d.stack {
                cyc_ref_inc(st, *slot);
            }
            count += d.stack.len();
            for frame in &d.frames {
                cyc_ref_inc(st, frame.routine);
                cyc_ref_inc(st, frame.object);
                cyc_ref_inc(st, frame.rtype);
            }
            count += 3 * d.frames.len();
        }
        ValueData::Type(d) => {
            cyc_ref_inc(st, d.aux);
            cyc_ref_inc(st, d.value);
            cyc_ref_inc(st, d.quadtype);
            count += scan_seq(collector, st, &d.nested, Action::Inc);
            count += scan_seq(collector, st, &d.bases, Action::Inc);
            count += scan_map(collector, st, &d.interfaces, Action::Inc);
        }
    }
    count
}

/// Break-mode traversal: dismantles one proven-dead value by dropping every
/// neighbour's count and nulling the slots. Returns the work units touched.
pub(crate) fn break_scan(collector: &Collector, v: ValueRef) -> usize {
    let mut count = 1;
    // Safety: only values with no live owner reach the break phase; the
    // collector is the sole accessor. Header access stays valid through the
    // disjoint field projection.
    let data = unsafe { v.data_mut() };
    match data {
        ValueData::None | ValueData::Int(_) | ValueData::Float(_) | ValueData::Str(_) => {}
        ValueData::Enum(d) => break_ref(collector, &mut d.etype),
        ValueData::Constant(d) => break_ref(collector, &mut d.value),
        ValueData::Variable(d) => {
            break_ref(collector, &mut d.value);
            break_ref(collector, &mut d.dtype);
            count += 1;
        }
        ValueData::Tuple(d) => {
            break_ref(collector, &mut d.ctype);
            count += d.slots.len();
            for slot in &mut d.slots {
                break_ref(collector, slot);
            }
            d.slots.clear();
        }
        ValueData::List(d) => {
            count += break_seq(collector, &mut d.items);
            break_ref(collector, &mut d.ctype);
        }
        ValueData::Map(d) => {
            count += break_map(collector, &mut d.entries);
            break_ref(collector, &mut d.ctype);
        }
        ValueData::Object(d) => {
            count += d.fields.len();
            for slot in &mut d.fields {
                break_ref(collector, slot);
            }
            d.fields.clear();
            break_ref(collector, &mut d.class);
        }
        ValueData::Class(d) => {
            count += break_map(collector, &mut d.methods);
            break_ref(collector, &mut d.cls_type);
            break_ref(collector, &mut d.ctor);
            count += break_seq(collector, &mut d.constants);
            count += break_seq(collector, &mut d.variables);
            count += break_seq(collector, &mut d.bases);
        }
        ValueData::Interface(d) => {
            count += break_map(collector, &mut d.methods);
            count += break_seq(collector, &mut d.supers);
            break_ref(collector, &mut d.abtype);
        }
        ValueData::Namespace(d) => {
            count += break_seq(collector, &mut d.constants);
            count += break_seq(collector, &mut d.variables);
            count += break_seq(collector, &mut d.aux);
            count += break_map(collector, &mut d.types);
        }
        ValueData::Routine(d) => {
            break_ref(collector, &mut d.nspace);
            break_ref(collector, &mut d.rtype);
            break_ref(collector, &mut d.host);
            count += break_seq(collector, &mut d.consts);
            count += break_seq(collector, &mut d.overloads);
        }
        ValueData::Process(d) => {
            break_ref(collector, &mut d.future);
            count += break_seq(collector, &mut d.exceptions);
            count += break_seq(collector, &mut d.defers);
            count += d.stack.len();
            for slot in &mut d.stack {
                break_ref(collector, slot);
            }
            d.stack.clear();
            count += 3 * d.frames.len();
            for frame in &mut d.frames {
                break_ref(collector, &mut frame.routine);
                break_ref(collector, &mut frame.object);
                break_ref(collector, &mut frame.rtype);
            }
            d.frames.clear();
        }
        ValueData::Type(d) => {
            count += break_seq(collector, &mut d.nested);
            count += break_seq(collector, &mut d.bases);
            break_ref(collector, &mut d.aux);
            break_ref(collector, &mut d.value);
            break_ref(collector, &mut d.quadtype);
            count += break_map(collector, &mut d.interfaces);
        }
    }
    count
}
