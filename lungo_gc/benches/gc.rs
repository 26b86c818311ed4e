use criterion::{Criterion, criterion_group, criterion_main};
use lungo_gc::Collector;
use lungo_types::{Value, ValueData, ValueSlot};
use std::time::Duration;

fn benchmarks(criterion: &mut Criterion) {
    bench_acyclic_churn(criterion);
    bench_cycle_collection(criterion);
}

fn list_push(gc: &Collector, list: lungo_types::ValueRef, item: lungo_types::ValueRef) {
    // Safety: the bench is the only mutator of this list.
    let ValueData::List(data) = (unsafe { list.data_mut() }) else {
        panic!("expected a list");
    };
    let _guard = gc.lock_seq(&data.items);
    data.items.push(ValueSlot::EMPTY);
    let slot = data.items.last_slot_mut().expect("slot just pushed");
    gc.assign(slot, Some(item));
}

fn bench_acyclic_churn(criterion: &mut Criterion) {
    let gc = Collector::new();
    gc.start();
    criterion.bench_function("gc_list_churn", |bencher| {
        bencher.iter(|| {
            for _ in 0..100 {
                let list = Value::new_list(ValueSlot::EMPTY);
                for i in 0..10 {
                    let n = Value::new_int(i);
                    list_push(&gc, list, n);
                    gc.dec_ref(Some(n));
                }
                gc.dec_ref(Some(list));
            }
            gc.collect();
        });
    });
}

fn bench_cycle_collection(criterion: &mut Criterion) {
    let gc = Collector::new();
    gc.start();
    criterion.bench_function("gc_cycle_collection", |bencher| {
        bencher.iter(|| {
            for _ in 0..100 {
                let x = Value::new_tuple(ValueSlot::EMPTY, 1);
                let y = Value::new_tuple(ValueSlot::EMPTY, 1);
                // Safety: the bench is the only mutator of these tuples.
                if let ValueData::Tuple(data) = unsafe { x.data_mut() } {
                    gc.assign(&mut data.slots[0], Some(y));
                }
                if let ValueData::Tuple(data) = unsafe { y.data_mut() } {
                    gc.assign(&mut data.slots[0], Some(x));
                }
                gc.dec_ref(Some(x));
                gc.dec_ref(Some(y));
            }
            gc.collect();
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = benchmarks
);
criterion_main!(benches);
