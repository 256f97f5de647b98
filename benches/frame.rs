use criterion::*;
use std::hint::black_box;

use dynsoa::prelude::*;
use dynsoa::{Store, ViewId};

mod common;
use common::*;

fn physics(store: &mut Store, v: ViewId, ctx: &KernelCtx) -> KernelReport {
    let (x, vx) = store
        .column_pair_mut::<f32>(v, "Position.x", "Velocity.vx")
        .expect("particle columns");
    for i in 0..x.len() {
        x[i] += vx[i] * ctx.dt;
    }
    KernelReport { p95_tile_us: 20, p99_tile_us: 26, ..KernelReport::default() }
}

fn branchy(store: &mut Store, v: ViewId, _ctx: &KernelCtx) -> KernelReport {
    let (x, vx) = store
        .column_pair_mut::<f32>(v, "Position.x", "Velocity.vx")
        .expect("particle columns");
    for i in 0..x.len() {
        if x[i] > 1000.0 {
            x[i] *= 0.97;
        } else if x[i] < -1000.0 {
            x[i] *= 1.03;
        } else {
            x[i] += vx[i] * 0.001;
        }
    }
    KernelReport {
        p95_tile_us: 45,
        p99_tile_us: 70,
        branch_div: 0.5,
        mem_coalesce: 0.6,
        ..KernelReport::default()
    }
}

fn frame_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    group.sample_size(20);

    group.bench_function("mixed_batch_100k_fixed_soa", |b| {
        b.iter_batched(
            || populated(Config::default(), ENTITIES_SMALL),
            |(mut rt, v)| {
                let ctx = KernelCtx { dt: 0.016, tile: 0 };
                for _ in 0..8 {
                    rt.begin_frame();
                    rt.run_kernel("physics", v, &ctx, physics);
                    rt.run_kernel("branchy", v, &ctx, branchy);
                    rt.end_frame();
                }
                black_box(rt);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("mixed_batch_100k_adaptive", |b| {
        b.iter_batched(
            || {
                let config = Config {
                    scheduler_enabled: true,
                    max_retile_us: 200_000,
                    ..Config::default()
                };
                let (mut rt, v) = populated(config, ENTITIES_SMALL);
                rt.set_policy(Some(Policy {
                    triggers: vec![PolicyTrigger {
                        when: "branch_div > 0.2".to_string(),
                        action: TriggerAction::RetileAosoa,
                        arg: 128,
                        priority: 1.0,
                    }],
                    cooloff_frames: 3,
                    ..Policy::default()
                }));
                (rt, v)
            },
            |(mut rt, v)| {
                let ctx = KernelCtx { dt: 0.016, tile: 0 };
                for _ in 0..8 {
                    rt.begin_frame();
                    rt.run_kernel("physics", v, &ctx, physics);
                    rt.run_kernel("branchy", v, &ctx, branchy);
                    rt.end_frame();
                }
                black_box(rt);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, frame_benchmark);
criterion_main!(benches);
