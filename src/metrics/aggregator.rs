//! Sample windows, EWMA aggregation, and the CSV sink.
//!
//! ## Concurrency
//!
//! All state lives behind a single mutex so `emit` may be called from kernel
//! worker threads. `aggregate` is intended to be called only from the frame
//! thread at frame boundaries; it takes the same lock and never blocks on
//! I/O beyond the buffered CSV writer.
//!
//! ## Aggregation model
//!
//! `aggregate` averages the scalar behavior signals of the most recent
//! `min(W, window)` samples. The `p95_us`/`p99_us` fields are **not**
//! percentiles of the window; they carry the tile percentiles reported by
//! the most recent sample. The EWMA fold in `note_frame_end` is independent
//! of the window; both are kept.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::runtime::types::ViewId;

/// Capacity of the per-view sample window; the oldest sample drops when full.
pub const WINDOW_CAP: usize = 120;

/// Smoothing factor of the per-view EWMA fold.
pub const EWMA_ALPHA: f64 = 0.2;

const CSV_HEADER: &str =
    "kernel,view,time_us,p95_tile_us,p99_tile_us,warp_eff,branch_div,mem_coalesce,l2_miss_rate";

/// One kernel invocation's measured signals.
///
/// `time_us` is wall time measured by the invocation path. The remaining
/// fields are modeled GPU-style behavior signals supplied by the kernel (or
/// left at their neutral defaults).
#[derive(Clone, Debug)]
pub struct Sample {
    /// Kernel name.
    pub kernel: String,
    /// View the kernel ran over.
    pub view: ViewId,
    /// Wall time of the invocation in microseconds.
    pub time_us: u32,
    /// Modeled 95th-percentile per-tile time.
    pub p95_tile_us: u32,
    /// Modeled 99th-percentile per-tile time.
    pub p99_tile_us: u32,
    /// Modeled warp efficiency in [0, 1].
    pub warp_eff: f32,
    /// Modeled branch divergence in [0, 1].
    pub branch_div: f32,
    /// Modeled memory coalescing in [0, 1].
    pub mem_coalesce: f32,
    /// Modeled L2 miss rate in [0, 1].
    pub l2_miss_rate: f32,
}

impl Default for Sample {
    fn default() -> Self {
        Self {
            kernel: String::new(),
            view: 0,
            time_us: 0,
            p95_tile_us: 0,
            p99_tile_us: 0,
            warp_eff: 1.0,
            branch_div: 0.0,
            mem_coalesce: 1.0,
            l2_miss_rate: 0.0,
        }
    }
}

/// Aggregated metrics over a recent window (or the EWMA fold).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameAgg {
    /// Mean invocation time in microseconds.
    pub mean_us: f64,
    /// Most recent modeled p95 tile time.
    pub p95_us: f64,
    /// Most recent modeled p99 tile time.
    pub p99_us: f64,
    /// Mean warp efficiency.
    pub warp_eff: f64,
    /// Mean branch divergence.
    pub branch_div: f64,
    /// Mean memory coalescing.
    pub mem_coalesce: f64,
    /// Mean L2 miss rate.
    pub l2_miss: f64,
    /// `p99_us / p95_us` when `p95_us > 0`, else 0.
    pub tail_ratio: f64,
}

impl Default for FrameAgg {
    fn default() -> Self {
        Self {
            mean_us: 0.0,
            p95_us: 0.0,
            p99_us: 0.0,
            warp_eff: 1.0,
            branch_div: 0.0,
            mem_coalesce: 1.0,
            l2_miss: 0.0,
            tail_ratio: 0.0,
        }
    }
}

#[derive(Default)]
struct ViewAgg {
    window: VecDeque<Sample>,
    ewma: FrameAgg,
}

#[derive(Default)]
struct HubInner {
    csv: Option<BufWriter<File>>,
    views: HashMap<ViewId, ViewAgg>,
}

/// Process-wide metrics state: CSV sink, sample windows, EWMA aggregates.
#[derive(Default)]
pub struct MetricsHub {
    inner: Mutex<HubInner>,
}

impl MetricsHub {
    /// Creates a hub with no CSV sink and no recorded samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (truncating) a CSV sink; every subsequent emitted sample appends
    /// one row. Failure to open is silent and leaves the sink disabled.
    pub fn enable_csv(&self, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.csv = None;
        if let Ok(file) = File::create(path) {
            let mut writer = BufWriter::new(file);
            if writeln!(writer, "{CSV_HEADER}").is_ok() {
                let _ = writer.flush();
                inner.csv = Some(writer);
            }
        }
    }

    /// Appends a sample to its view's window (dropping the oldest beyond
    /// capacity) and mirrors it to the CSV sink when enabled.
    pub fn emit(&self, sample: &Sample) {
        let mut inner = self.inner.lock().unwrap();

        if let Some(writer) = inner.csv.as_mut() {
            let _ = writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{}",
                sample.kernel,
                sample.view,
                sample.time_us,
                sample.p95_tile_us,
                sample.p99_tile_us,
                sample.warp_eff,
                sample.branch_div,
                sample.mem_coalesce,
                sample.l2_miss_rate,
            );
        }

        let agg = inner.views.entry(sample.view).or_default();
        agg.window.push_back(sample.clone());
        if agg.window.len() > WINDOW_CAP {
            agg.window.pop_front();
        }
    }

    /// Folds a sample into the view's EWMA. A field whose current value is
    /// exactly 0 (never updated) is seeded with the observation; otherwise
    /// `new = (1 - α) * cur + α * obs`.
    pub fn note_frame_end(&self, view: ViewId, sample: &Sample) {
        let mut inner = self.inner.lock().unwrap();
        let ewma = &mut inner.views.entry(view).or_default().ewma;

        let lerp = |cur: f64, obs: f64| (1.0 - EWMA_ALPHA) * cur + EWMA_ALPHA * obs;
        let seed = |cur: f64, obs: f64| if cur == 0.0 { obs } else { lerp(cur, obs) };

        ewma.mean_us = seed(ewma.mean_us, sample.time_us as f64);
        ewma.warp_eff = seed(ewma.warp_eff, sample.warp_eff as f64);
        ewma.branch_div = lerp(ewma.branch_div, sample.branch_div as f64);
        ewma.mem_coalesce = lerp(ewma.mem_coalesce, sample.mem_coalesce as f64);
        ewma.l2_miss = lerp(ewma.l2_miss, sample.l2_miss_rate as f64);
        ewma.p95_us = seed(ewma.p95_us, sample.p95_tile_us as f64);
        ewma.p99_us = seed(ewma.p99_us, sample.p99_tile_us as f64);
        ewma.tail_ratio = if ewma.p95_us > 0.0 { ewma.p99_us / ewma.p95_us } else { 0.0 };
    }

    /// The view's current EWMA aggregate (default if nothing was folded).
    pub fn ewma(&self, view: ViewId) -> FrameAgg {
        let inner = self.inner.lock().unwrap();
        inner.views.get(&view).map_or_else(FrameAgg::default, |v| v.ewma)
    }

    /// Averages the scalar signals of the most recent `min(window_frames,
    /// window)` samples; `p95_us`/`p99_us` carry the newest sample's tile
    /// percentiles. Returns the default aggregate when the view has no
    /// samples (or `window_frames` is 0).
    pub fn aggregate(&self, view: ViewId, window_frames: usize) -> FrameAgg {
        let inner = self.inner.lock().unwrap();
        let Some(agg) = inner.views.get(&view) else {
            return FrameAgg::default();
        };
        let take_n = window_frames.min(agg.window.len());
        if take_n == 0 {
            return FrameAgg::default();
        }

        let mut mean_us = 0.0;
        let mut warp_eff = 0.0;
        let mut branch_div = 0.0;
        let mut mem_coalesce = 0.0;
        let mut l2_miss = 0.0;
        for sample in agg.window.iter().rev().take(take_n) {
            mean_us += sample.time_us as f64;
            warp_eff += sample.warp_eff as f64;
            branch_div += sample.branch_div as f64;
            mem_coalesce += sample.mem_coalesce as f64;
            l2_miss += sample.l2_miss_rate as f64;
        }

        let n = take_n as f64;
        let newest = agg.window.back().expect("window is non-empty");
        let p95_us = newest.p95_tile_us as f64;
        let p99_us = newest.p99_tile_us as f64;
        FrameAgg {
            mean_us: mean_us / n,
            p95_us,
            p99_us,
            warp_eff: warp_eff / n,
            branch_div: branch_div / n,
            mem_coalesce: mem_coalesce / n,
            l2_miss: l2_miss / n,
            tail_ratio: if p95_us > 0.0 { p99_us / p95_us } else { 0.0 },
        }
    }
}
