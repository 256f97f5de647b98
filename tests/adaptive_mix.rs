//! End-to-end frame loop: a mixed kernel batch over one view with the
//! adaptive scheduler enabled, checking that values stay coherent while the
//! layout adapts underneath the kernels.

use dynsoa::prelude::*;
use dynsoa::{ArchetypeId, ViewId};

fn particle_runtime() -> (Runtime, ArchetypeId) {
    let mut rt = Runtime::new(Config {
        scheduler_enabled: true,
        max_retile_us: 200_000,
        ..Config::default()
    });
    rt.define_component(Component::new(
        "Position",
        vec![Field::new("x", ScalarType::F32)],
    ));
    rt.define_component(Component::new(
        "Velocity",
        vec![Field::new("vx", ScalarType::F32)],
    ));
    let arch = rt.define_archetype("Particle", &["Position", "Velocity"]);
    (rt, arch)
}

fn physics(store: &mut dynsoa::Store, v: ViewId, ctx: &KernelCtx) -> KernelReport {
    let (x, vx) = store
        .column_pair_mut::<f32>(v, "Position.x", "Velocity.vx")
        .expect("particle columns");
    for i in 0..x.len() {
        x[i] += vx[i] * ctx.dt;
    }
    KernelReport { p95_tile_us: 10, p99_tile_us: 12, mem_coalesce: 0.95, ..KernelReport::default() }
}

fn branchy(store: &mut dynsoa::Store, v: ViewId, _ctx: &KernelCtx) -> KernelReport {
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
        p95_tile_us: 40,
        p99_tile_us: 60,
        branch_div: 0.5,
        mem_coalesce: 0.6,
        ..KernelReport::default()
    }
}

#[test]
fn mixed_kernel_batch_stays_coherent_while_adapting() {
    let (mut rt, arch) = particle_runtime();
    let n = 4096;
    let v = rt
        .spawn_with(arch, n, |i, row| {
            row.set_f32("Position.x", i as f32 * 0.001);
            row.set_f32("Velocity.vx", 1.0);
        })
        .unwrap();

    rt.set_policy(Some(Policy {
        triggers: vec![PolicyTrigger {
            when: "branch_div > 0.2".to_string(),
            action: TriggerAction::RetileAosoa,
            arg: 128,
            priority: 1.0,
        }],
        cooloff_frames: 5,
        ..Policy::default()
    }));

    let ctx = KernelCtx { dt: 0.016, tile: 0 };
    let frames = 12;
    for f in 0..frames {
        rt.begin_frame();
        rt.run_kernel("physics", v, &ctx, physics);
        rt.run_kernel("branchy", v, &ctx, branchy);
        if f % 4 == 3 {
            // A transient block pass over the first 1024 rows.
            let mut block = rt
                .acquire_matrix_block(v, &["Position.x", "Velocity.vx"], 1024, 0)
                .unwrap();
            let (p, vel) = block.column_pair_mut(0, 1).unwrap();
            for i in 0..p.len() {
                p[i] += 0.25 * vel[i];
            }
            rt.release_matrix_block(block, true).unwrap();
        }
        rt.end_frame();
    }

    // branchy reports divergence that keeps the windowed average above the
    // trigger threshold, so the view must have adapted to AoSoA.
    assert_eq!(rt.current_layout(v), Some(LayoutKind::AoSoA));
    assert_eq!(rt.store().aosoa_tile(v), 128);

    // Each frame moves x by dt + 0.001; block frames add 0.25 more for the
    // first 1024 rows. Nothing strays near the branchy clamps, so the
    // trajectory is exact.
    let per_frame: f32 = 0.016 + 0.001;
    let block_frames = (frames / 4) as f32;
    let x = rt.column_slice::<f32>(v, "Position.x").unwrap();
    for (i, &val) in x.iter().enumerate() {
        let base = i as f32 * 0.001 + per_frame * frames as f32;
        let expected = if i < 1024 { base + 0.25 * block_frames } else { base };
        assert!(
            (val - expected).abs() < 1e-3,
            "row {i}: got {val}, expected {expected}"
        );
    }

    // The samples all landed in the window.
    let agg = rt.aggregate(v, 3);
    assert!(agg.branch_div > 0.0);
}
