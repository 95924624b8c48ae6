//! Benchmarks for handle creation and recreate cycles

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tether_native::{
    Control, CreateContext, DelayedValue, EngineConfig, Environment, HandleResult, IdReusePolicy,
    ItemCategory, NativeCx, NativeWidget, RawHandle, SlotKey, StructuralKey,
};

struct Handle {
    raw: u64,
    style: u32,
    text: String,
}

struct BenchWidget {
    next: u64,
    style: Option<StructuralKey<u32>>,
}

impl NativeWidget for BenchWidget {
    type Handle = Handle;

    fn create(&mut self, cx: &CreateContext<'_, Handle>) -> HandleResult<Handle> {
        self.next += 1;
        Ok(Handle {
            raw: self.next,
            style: self.style.map_or(0, |key| *cx.structural(key)),
            text: String::new(),
        })
    }

    fn destroy(&mut self, handle: Handle) {
        black_box(handle);
    }

    fn raw(&self, handle: &Handle) -> RawHandle {
        RawHandle::from_raw(handle.raw)
    }
}

type Edit = (
    Control<BenchWidget>,
    StructuralKey<u32>,
    Vec<SlotKey<String>>,
);

fn edit(env: &Rc<Environment>, slots: usize) -> Edit {
    let mut control = Control::new(
        env,
        BenchWidget {
            next: 0,
            style: None,
        },
    );
    let style = control.register_structural(0u32);
    control.widget_mut().style = Some(style);
    let keys = (0..slots)
        .map(|_| {
            control.register_value(DelayedValue::new(
                String::new(),
                |h: &Handle| h.text.clone(),
                |cx: &mut NativeCx<'_, Handle>, v: String| cx.text = v,
            ))
        })
        .collect();
    (control, style, keys)
}

fn bench_recreate(c: &mut Criterion) {
    tether_core::profiling::set_enabled(false);
    let mut group = c.benchmark_group("recreate_cycle");

    for slots in [1, 16, 128] {
        group.throughput(Throughput::Elements(slots as u64));
        let env = Environment::new(EngineConfig::default()).unwrap();
        let (mut control, style, keys) = edit(&env, slots);
        for key in &keys {
            control.set(*key, "value".to_string()).unwrap();
        }
        control.create_handle().unwrap();
        let mut next_style = 0u32;

        group.bench_with_input(BenchmarkId::from_parameter(slots), &slots, |b, _| {
            b.iter(|| {
                next_style = next_style.wrapping_add(1);
                control.set_structural(style, black_box(next_style)).unwrap();
                black_box(control.drain_events());
            });
        });
        black_box(control.handle().map(|h| h.style));
    }

    group.finish();
}

fn bench_command_item_cycle(c: &mut Criterion) {
    let config = EngineConfig::default().with_reuse(IdReusePolicy::FreedFirst);
    let env = Environment::new(config).unwrap();
    let item = Control::new(
        &env,
        BenchWidget {
            next: 0,
            style: None,
        },
    )
    .with_command_category(ItemCategory::MenuItem)
    .into_shared();

    c.bench_function("command_item_create_destroy", |b| {
        b.iter(|| {
            let mut item = item.borrow_mut();
            item.create_handle().unwrap();
            item.destroy_handle().unwrap();
            black_box(item.drain_events());
        });
    });

    item.borrow_mut().create_handle().unwrap();
    let id = item.borrow().id().unwrap();
    c.bench_function("command_dispatch", |b| {
        b.iter(|| {
            let handled = env.dispatch_command(ItemCategory::MenuItem, black_box(id));
            item.borrow_mut().drain_events();
            handled
        });
    });
}

criterion_group!(benches, bench_recreate, bench_command_item_cycle);
criterion_main!(benches);
