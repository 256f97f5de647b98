use criterion::*;
use std::hint::black_box;

use dynsoa::prelude::*;

mod common;
use common::*;

fn retile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("retile");

    for entities in [ENTITIES_SMALL, ENTITIES_MED] {
        group.bench_function(format!("soa_to_aosoa_128_{entities}"), |b| {
            b.iter_batched(
                || populated(Config::default(), entities),
                |(mut rt, v)| {
                    rt.store_mut().soa_to_aosoa(v, 128).unwrap();
                    black_box(rt);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(format!("aosoa_roundtrip_{entities}"), |b| {
            b.iter_batched(
                || {
                    let (mut rt, v) = populated(Config::default(), entities);
                    rt.store_mut().soa_to_aosoa(v, 128).unwrap();
                    (rt, v)
                },
                |(mut rt, v)| {
                    rt.store_mut().aosoa_to_soa(v).unwrap();
                    rt.store_mut().soa_to_aosoa(v, 128).unwrap();
                    black_box(rt);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("matrix_block_2x4096_roundtrip", |b| {
        b.iter_batched(
            || populated(Config::default(), ENTITIES_SMALL),
            |(mut rt, v)| {
                let mut block = rt
                    .acquire_matrix_block(v, &["Position.x", "Velocity.vx"], 4096, 0)
                    .unwrap();
                let (p, vel) = block.column_pair_mut(0, 1).unwrap();
                for i in 0..p.len() {
                    p[i] += 0.25 * vel[i];
                }
                rt.release_matrix_block(block, true).unwrap();
                black_box(rt);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, retile_benchmark);
criterion_main!(benches);
