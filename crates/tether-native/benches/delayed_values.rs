//! Benchmarks for delayed value flushes

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tether_native::{
    DelayedFlags, DelayedSlot, DelayedValue, DelayedValues, NativeCx, RecreateState,
    StructuralValues,
};

#[derive(Default)]
struct Widget {
    values: Vec<u64>,
    bits: u32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Bits: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const C = 1 << 2;
        const D = 1 << 3;
    }
}

fn registry(size: usize) -> DelayedValues<Widget> {
    let mut values = DelayedValues::new();
    for index in 0..size {
        let key = values.add(DelayedValue::new(
            index as u64,
            move |w: &Widget| w.values[index],
            move |cx: &mut NativeCx<'_, Widget>, v| cx.values[index] = v,
        ));
        values.set(key, None, index as u64 * 2);
    }
    values
}

fn bench_apply_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("delayed_apply_all");

    for size in [8, 64, 512] {
        group.throughput(Throughput::Elements(size as u64));
        let values = registry(size);
        let mut widget = Widget {
            values: vec![0; size],
            bits: 0,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let mut structure = StructuralValues::new();
                let mut state = RecreateState::new();
                let mut cx = NativeCx::new(&mut widget, &mut structure, &mut state);
                values.apply_all(black_box(&mut cx));
            });
        });
    }

    group.finish();
}

fn bench_receive_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("delayed_receive_all");

    for size in [8, 64, 512] {
        group.throughput(Throughput::Elements(size as u64));
        let mut values = registry(size);
        let widget = Widget {
            values: (0..size as u64).collect(),
            bits: 0,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| values.receive_all(black_box(&widget)));
        });
    }

    group.finish();
}

fn bench_flags(c: &mut Criterion) {
    let grouped = DelayedFlags::<Widget, Bits>::new(Bits::A | Bits::C).with_group(
        Bits::all(),
        |w: &Widget| Bits::from_bits_retain(w.bits),
        |cx: &mut NativeCx<'_, Widget>, bits: Bits| cx.bits = bits.bits(),
    );
    let per_bit = [Bits::A, Bits::B, Bits::C, Bits::D]
        .into_iter()
        .fold(DelayedFlags::<Widget, Bits>::new(Bits::A | Bits::C), |flags, bit| {
            flags.with_bit(
                bit,
                move |w: &Widget| w.bits & bit.bits() != 0,
                move |cx: &mut NativeCx<'_, Widget>, value: bool| {
                    if value {
                        cx.bits |= bit.bits();
                    } else {
                        cx.bits &= !bit.bits();
                    }
                },
            )
        });
    let mut widget = Widget::default();

    c.bench_function("flags_apply_grouped", |b| {
        b.iter(|| {
            let mut structure = StructuralValues::new();
            let mut state = RecreateState::new();
            let mut cx = NativeCx::new(&mut widget, &mut structure, &mut state);
            grouped.apply(black_box(&mut cx));
        });
    });

    c.bench_function("flags_apply_per_bit", |b| {
        b.iter(|| {
            let mut structure = StructuralValues::new();
            let mut state = RecreateState::new();
            let mut cx = NativeCx::new(&mut widget, &mut structure, &mut state);
            per_bit.apply(black_box(&mut cx));
        });
    });
}

criterion_group!(benches, bench_apply_all, bench_receive_all, bench_flags);
criterion_main!(benches);
