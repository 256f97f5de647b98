use dynsoa::prelude::*;
use dynsoa::runtime::policy::eval_predicate;
use dynsoa::MetricsHub;

fn sample(view: u64, time_us: u32) -> Sample {
    Sample {
        kernel: "k".to_string(),
        view,
        time_us,
        ..Sample::default()
    }
}

#[test]
fn window_caps_at_120_and_aggregate_reads_recent() {
    let hub = MetricsHub::new();
    for i in 0..130u32 {
        hub.emit(&sample(7, i));
    }

    // Newest three samples: 127, 128, 129.
    let a = hub.aggregate(7, 3);
    assert_eq!(a.mean_us, (127.0 + 128.0 + 129.0) / 3.0);

    // Asking for more than the window holds reads at most 120 samples,
    // i.e. times 10..130.
    let a = hub.aggregate(7, 1000);
    assert_eq!(a.mean_us, (10.0 + 129.0) / 2.0);
}

#[test]
fn aggregate_takes_tile_percentiles_from_newest_sample() {
    let hub = MetricsHub::new();
    let mut old = sample(3, 100);
    old.p95_tile_us = 100;
    old.p99_tile_us = 110;
    hub.emit(&old);

    let mut new = sample(3, 100);
    new.p95_tile_us = 200;
    new.p99_tile_us = 300;
    hub.emit(&new);

    let a = hub.aggregate(3, 2);
    assert_eq!(a.p95_us, 200.0);
    assert_eq!(a.p99_us, 300.0);
    assert!((a.tail_ratio - 1.5).abs() < 1e-12);
}

#[test]
fn aggregate_without_samples_is_default() {
    let hub = MetricsHub::new();
    let a = hub.aggregate(42, 3);
    assert_eq!(a.mean_us, 0.0);
    assert_eq!(a.p95_us, 0.0);
    assert_eq!(a.warp_eff, 1.0);
    assert_eq!(a.mem_coalesce, 1.0);
    assert_eq!(a.tail_ratio, 0.0);
}

#[test]
fn aggregate_averages_behavior_signals() {
    let hub = MetricsHub::new();
    for (div, mem) in [(0.2f32, 0.4f32), (0.4, 0.6)] {
        let mut s = sample(1, 100);
        s.branch_div = div;
        s.mem_coalesce = mem;
        hub.emit(&s);
    }
    let a = hub.aggregate(1, 2);
    assert!((a.branch_div - 0.3).abs() < 1e-6);
    assert!((a.mem_coalesce - 0.5).abs() < 1e-6);
}

#[test]
fn ewma_seeds_zero_fields_then_lerps() {
    let hub = MetricsHub::new();

    let mut s = sample(5, 100);
    s.p95_tile_us = 100;
    s.p99_tile_us = 150;
    s.branch_div = 0.5;
    hub.note_frame_end(5, &s);

    let e = hub.ewma(5);
    assert_eq!(e.mean_us, 100.0); // seeded
    assert_eq!(e.p95_us, 100.0); // seeded
    assert!((e.branch_div - 0.1).abs() < 1e-12); // lerped from 0
    assert!((e.tail_ratio - 1.5).abs() < 1e-12);

    let mut s2 = sample(5, 200);
    s2.p95_tile_us = 100;
    s2.p99_tile_us = 150;
    hub.note_frame_end(5, &s2);

    let e = hub.ewma(5);
    assert!((e.mean_us - 120.0).abs() < 1e-12); // 0.8 * 100 + 0.2 * 200
}

#[test]
fn csv_sink_writes_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.csv");

    {
        let hub = MetricsHub::new();
        hub.enable_csv(&path);
        hub.emit(&sample(1, 500));
        hub.emit(&sample(1, 600));
        // Rows are flushed when the hub drops.
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "kernel,view,time_us,p95_tile_us,p99_tile_us,warp_eff,branch_div,mem_coalesce,l2_miss_rate"
    );
    assert!(lines[1].starts_with("k,1,500,"));
    assert!(lines[2].starts_with("k,1,600,"));
}

#[test]
fn run_kernel_times_and_reports_signals() {
    let mut rt = Runtime::new(Config::default());
    rt.define_component(Component::new(
        "Position",
        vec![Field::new("x", ScalarType::F32)],
    ));
    let arch = rt.define_archetype("P", &["Position"]);
    let v = rt.spawn(arch, 4096).unwrap();

    rt.begin_frame();
    rt.run_kernel("advect", v, &KernelCtx { dt: 0.016, tile: 0 }, |store, v, ctx| {
        let x = store.column_slice_mut::<f32>(v, "Position.x").unwrap();
        for slot in x.iter_mut() {
            *slot += ctx.dt;
        }
        KernelReport { branch_div: 0.3, mem_coalesce: 0.9, ..KernelReport::default() }
    });
    rt.end_frame();

    let a = rt.aggregate(v, 1);
    assert!((a.branch_div - 0.3).abs() < 1e-6);
    assert!((a.mem_coalesce - 0.9).abs() < 1e-6);

    // The EWMA was folded once: branch_div lerps up from zero.
    let e = rt.ewma(v);
    assert!((e.branch_div - 0.06).abs() < 1e-6);

    let x = rt.column_slice::<f32>(v, "Position.x").unwrap();
    assert!((x[0] - 0.016).abs() < 1e-6);
}

// ── Predicate evaluation ─────────────────────────────────────────────────

fn agg_with(branch_div: f64, warp_eff: f64) -> FrameAgg {
    FrameAgg { branch_div, warp_eff, ..FrameAgg::default() }
}

#[test]
fn predicate_and_pair() {
    let a = agg_with(0.25, 0.70);
    assert!(eval_predicate("branch_div > 0.2 && warp_eff < 0.8", &a));
    assert!(!eval_predicate("branch_div > 0.2 && warp_eff < 0.5", &a));
}

#[test]
fn predicate_or_pair() {
    let a = agg_with(0.10, 0.70);
    assert!(eval_predicate("branch_div > 0.2 || warp_eff < 0.8", &a));
    assert!(!eval_predicate("branch_div > 0.2 || warp_eff < 0.5", &a));
}

#[test]
fn predicate_on_zero_aggregate() {
    let zero = FrameAgg { warp_eff: 0.0, mem_coalesce: 0.0, ..FrameAgg::default() };
    assert!(eval_predicate("mean_us >= 0", &zero));
}

#[test]
fn predicate_unknown_field_reads_zero() {
    let a = agg_with(0.9, 0.1);
    assert!(!eval_predicate("unknown > 0", &a));
    assert!(eval_predicate("unknown >= 0", &a));
}

#[test]
fn predicate_equality_tolerates_epsilon() {
    let mut a = FrameAgg::default();
    a.mean_us = 100.0 + 1e-10;
    assert!(eval_predicate("mean_us == 100", &a));
    a.mean_us = 100.1;
    assert!(!eval_predicate("mean_us == 100", &a));
}

#[test]
fn predicate_is_whitespace_tolerant() {
    let mut a = FrameAgg::default();
    a.p95_us = 50.0;
    assert!(eval_predicate("  p95_us   >=  10 ", &a));
}

#[test]
fn predicate_parse_failures_are_inert() {
    let a = agg_with(0.9, 0.1);
    assert!(!eval_predicate("", &a));
    assert!(!eval_predicate("branch_div >", &a));
    assert!(!eval_predicate("branch_div > abc", &a));
    assert!(!eval_predicate("branch_div 0.2", &a));
}
