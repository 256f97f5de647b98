//! The runtime facade.
//!
//! All process-wide state (schema registry, columnar store, metrics hub,
//! scheduler) is collected into one [`Runtime`] value constructed at init
//! and persisted at shutdown. Every externally visible entry point is a
//! method on it; nothing in the crate is a global.

use std::path::Path;
use std::time::Instant;

use crate::metrics::{FrameAgg, MetricsHub, Sample};
use crate::runtime::error::{RuntimeResult, StoreResult};
use crate::runtime::layout::{self, RetilePlan};
use crate::runtime::policy::Policy;
use crate::runtime::schema::{Component, SchemaRegistry};
use crate::runtime::scheduler::{LearnState, SchedulerState};
use crate::runtime::store::{ColumnScalar, MatrixBlock, RowWriter, Store};
use crate::runtime::types::{ArchetypeId, Config, KernelCtx, LayoutKind, ViewId};

/// Behavior signals a kernel reports about its own invocation.
///
/// Wall time is measured by the runtime; everything else is modeled by the
/// kernel itself. The default is the neutral report: full efficiency, no
/// divergence, perfect coalescing, no tile-time percentiles.
#[derive(Clone, Copy, Debug)]
pub struct KernelReport {
    /// Modeled 95th-percentile per-tile time in microseconds.
    pub p95_tile_us: u32,
    /// Modeled 99th-percentile per-tile time in microseconds.
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

impl Default for KernelReport {
    fn default() -> Self {
        Self {
            p95_tile_us: 0,
            p99_tile_us: 0,
            warp_eff: 1.0,
            branch_div: 0.0,
            mem_coalesce: 1.0,
            l2_miss_rate: 0.0,
        }
    }
}

/// The adaptive layout runtime.
pub struct Runtime {
    config: Config,
    schema: SchemaRegistry,
    store: Store,
    metrics: MetricsHub,
    scheduler: SchedulerState,
    shut_down: bool,
}

impl Runtime {
    /// Constructs a runtime and loads any persisted learned coefficients.
    ///
    /// The config's `max_retile_us` becomes the scheduler's per-frame retile
    /// budget.
    pub fn new(config: Config) -> Self {
        let mut scheduler = SchedulerState::new(config.max_retile_us as f64);
        scheduler.load_state();
        Self {
            config,
            schema: SchemaRegistry::new(),
            store: Store::new(),
            metrics: MetricsHub::new(),
            scheduler,
            shut_down: false,
        }
    }

    /// The construction config.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persists the learned coefficients. Idempotent; further frames may
    /// still run but nothing is saved again.
    pub fn shutdown(&mut self) {
        if !self.shut_down {
            self.scheduler.save_state();
            self.shut_down = true;
        }
    }

    // ── Schema API ───────────────────────────────────────────────────────

    /// Interns a component definition by name (last wins).
    pub fn define_component(&mut self, component: Component) {
        self.schema.define_component(component);
    }

    /// Defines an archetype over component names; returns its 1-based id.
    pub fn define_archetype(&mut self, name: &str, components: &[&str]) -> ArchetypeId {
        self.schema.define_archetype(name, components)
    }

    /// The schema registry.
    #[inline]
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    // ── Storage API ──────────────────────────────────────────────────────

    /// Spawns `count` zero-initialized entities of an archetype; returns the
    /// new view's id.
    pub fn spawn(&mut self, arch: ArchetypeId, count: usize) -> RuntimeResult<ViewId> {
        self.store.spawn(&self.schema, arch, count)
    }

    /// Spawns with a per-row initializer.
    pub fn spawn_with(
        &mut self,
        arch: ArchetypeId,
        count: usize,
        init: impl FnMut(usize, &mut RowWriter<'_>),
    ) -> RuntimeResult<ViewId> {
        self.store.spawn_with(&self.schema, arch, count, init)
    }

    /// Returns the first view with this archetype, creating an empty one if
    /// none exists.
    pub fn make_view(&mut self, arch: ArchetypeId) -> ViewId {
        self.store.make_view(arch)
    }

    /// Entity count of a view; 0 for an unknown id.
    pub fn view_len(&self, v: ViewId) -> usize {
        self.store.view_len(v)
    }

    /// Raw pointer and byte length of a column, or `None`.
    pub fn column(&mut self, v: ViewId, path: &str) -> Option<(*mut u8, usize)> {
        self.store.column(v, path)
    }

    /// A column as a typed slice.
    pub fn column_slice<T: ColumnScalar>(&self, v: ViewId, path: &str) -> Option<&[T]> {
        self.store.column_slice(v, path)
    }

    /// A column as a mutable typed slice.
    pub fn column_slice_mut<T: ColumnScalar>(&mut self, v: ViewId, path: &str) -> Option<&mut [T]> {
        self.store.column_slice_mut(v, path)
    }

    /// Current layout of a view.
    pub fn current_layout(&self, v: ViewId) -> Option<LayoutKind> {
        self.store.current_layout(v)
    }

    /// Direct access to the store (kernels receive it through
    /// [`Runtime::run_kernel`]; this is for setup and inspection).
    #[inline]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable access to the store.
    #[inline]
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    // ── Retile API ───────────────────────────────────────────────────────

    /// Builds an AoSoA plan for a view using the current aggregates and
    /// learned coefficients.
    pub fn plan_aosoa(&self, v: ViewId, tile: u32) -> RetilePlan {
        let learn = self.scheduler.learn();
        layout::plan_aosoa(&self.store, &self.metrics, &learn, v, tile)
    }

    /// Builds a matrix-block packing plan for a view.
    pub fn plan_matrix(&self, v: ViewId, block: u32) -> RetilePlan {
        let learn = self.scheduler.learn();
        layout::plan_matrix(&self.store, &self.metrics, &learn, v, block)
    }

    /// Applies a plan's transition; `false` when the store refuses.
    pub fn retile(&mut self, v: ViewId, plan: &RetilePlan) -> bool {
        layout::retile(&mut self.store, v, plan)
    }

    /// Returns a view to SoA.
    pub fn retile_to_soa(&mut self, v: ViewId) -> bool {
        layout::retile_to_soa(&mut self.store, v)
    }

    /// Extracts a transient column-major block from selected columns.
    pub fn acquire_matrix_block(
        &mut self,
        v: ViewId,
        comps: &[&str],
        rows: usize,
        offset: usize,
    ) -> StoreResult<MatrixBlock> {
        self.store.acquire_matrix_block(v, comps, rows, offset)
    }

    /// Releases a block, optionally writing it back by column name.
    pub fn release_matrix_block(&mut self, block: MatrixBlock, write_back: bool) -> StoreResult<()> {
        self.store.release_matrix_block(block, write_back)
    }

    // ── Frame API ────────────────────────────────────────────────────────

    /// Opens the frame envelope.
    pub fn begin_frame(&mut self) {
        self.scheduler.on_begin_frame();
    }

    /// Times one kernel invocation over a view, then emits its sample and
    /// folds the view's EWMA.
    pub fn run_kernel(
        &mut self,
        name: &str,
        view: ViewId,
        ctx: &KernelCtx,
        kernel: impl FnOnce(&mut Store, ViewId, &KernelCtx) -> KernelReport,
    ) {
        let start = Instant::now();
        let report = kernel(&mut self.store, view, ctx);
        let time_us = start.elapsed().as_micros().min(u32::MAX as u128) as u32;

        let sample = Sample {
            kernel: name.to_string(),
            view,
            time_us,
            p95_tile_us: report.p95_tile_us,
            p99_tile_us: report.p99_tile_us,
            warp_eff: report.warp_eff,
            branch_div: report.branch_div,
            mem_coalesce: report.mem_coalesce,
            l2_miss_rate: report.l2_miss_rate,
        };
        self.metrics.emit(&sample);
        self.metrics.note_frame_end(view, &sample);
    }

    /// Closes the frame envelope. When the scheduler is enabled, runs the
    /// decision pass, budgeted application, and delayed learning.
    pub fn end_frame(&mut self) {
        if self.config.scheduler_enabled {
            self.scheduler.on_end_frame(&mut self.store, &self.metrics);
        }
    }

    /// Installs a policy; `None` clears to the empty default.
    pub fn set_policy(&mut self, policy: Option<Policy>) {
        self.scheduler.set_policy(policy);
    }

    // ── Metrics API ──────────────────────────────────────────────────────

    /// Opens the metrics CSV sink.
    pub fn metrics_enable_csv(&self, path: impl AsRef<Path>) {
        self.metrics.enable_csv(path);
    }

    /// Emits a sample directly (bypassing the timed kernel path).
    pub fn emit_metric(&self, sample: &Sample) {
        self.metrics.emit(sample);
    }

    /// Folds a sample into a view's EWMA directly.
    pub fn note_frame_end(&self, view: ViewId, sample: &Sample) {
        self.metrics.note_frame_end(view, sample);
    }

    /// Windowed aggregate for a view.
    pub fn aggregate(&self, v: ViewId, window_frames: usize) -> FrameAgg {
        self.metrics.aggregate(v, window_frames)
    }

    /// EWMA aggregate for a view.
    pub fn ewma(&self, v: ViewId) -> FrameAgg {
        self.metrics.ewma(v)
    }

    /// The metrics hub (shareable with kernel worker threads).
    #[inline]
    pub fn metrics(&self) -> &MetricsHub {
        &self.metrics
    }

    // ── Scheduler state ──────────────────────────────────────────────────

    /// Current learned coefficients.
    pub fn learn_state(&self) -> LearnState {
        self.scheduler.learn()
    }

    /// Seeds the learned coefficients.
    pub fn set_learn_state(&mut self, learn: LearnState) {
        self.scheduler.set_learn(learn);
    }

    /// Overrides the coefficient persistence path.
    pub fn set_persist_path(&mut self, path: impl AsRef<Path>) {
        self.scheduler.set_persist_path(path);
    }

    /// Current frame index.
    pub fn frame_index(&self) -> u64 {
        self.scheduler.frame_index()
    }

    /// The scheduler state (bandit statistics, coefficients).
    #[inline]
    pub fn scheduler(&self) -> &SchedulerState {
        &self.scheduler
    }
}
