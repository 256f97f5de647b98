//! Retile plans and the cost/gain model.
//!
//! A plan names a target layout and carries the model's estimated cost and
//! gain in microseconds. Cost is bytes-moved over a fixed memory-bandwidth
//! heuristic; gain multiplies a latency base by learned coefficients applied
//! to thresholded pressure terms (branch divergence, poor coalescing, tail
//! inflation). The model is deliberately approximate; the online learner
//! compensates for its coefficients.

use crate::metrics::MetricsHub;
use crate::runtime::scheduler::LearnState;
use crate::runtime::store::Store;
use crate::runtime::types::{LayoutKind, ViewId};

/// Modeled memory bandwidth used to convert bytes moved into microseconds.
pub const MEM_BW_BYTES_PER_US: f64 = 4096.0;

/// Target of a retile plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanAction {
    /// Return the view to plain structure-of-arrays.
    Soa,
    /// Re-lay the view out as AoSoA with the given tile width.
    Aosoa {
        /// Tile width in entities.
        tile: u32,
    },
    /// Pack a transient matrix block of the given row count. The store
    /// itself is untouched; the block path is acquire/release.
    Matrix {
        /// Block row count.
        block: u32,
    },
}

impl PlanAction {
    /// Stable per-action key: `layout_tag * 100000 + tile_or_block`.
    pub fn bandit_key(self) -> i64 {
        match self {
            PlanAction::Soa => LayoutKind::SoA.tag() * 100_000,
            PlanAction::Aosoa { tile } => LayoutKind::AoSoA.tag() * 100_000 + tile as i64,
            PlanAction::Matrix { block } => LayoutKind::Matrix.tag() * 100_000 + block as i64,
        }
    }

    /// Layout tag for trace logs.
    pub(crate) fn target_tag(self) -> i64 {
        match self {
            PlanAction::Soa => LayoutKind::SoA.tag(),
            PlanAction::Aosoa { .. } => LayoutKind::AoSoA.tag(),
            PlanAction::Matrix { .. } => LayoutKind::Matrix.tag(),
        }
    }

    /// Tile or block argument for trace logs; 0 for SoA.
    pub(crate) fn arg(self) -> u32 {
        match self {
            PlanAction::Soa => 0,
            PlanAction::Aosoa { tile } => tile,
            PlanAction::Matrix { block } => block,
        }
    }

    /// Action name as it appears in policies and trace logs.
    pub(crate) fn name(self) -> &'static str {
        match self {
            PlanAction::Soa => "RETILE_SOA",
            PlanAction::Aosoa { .. } => "RETILE_AOSOA",
            PlanAction::Matrix { .. } => "PACK_MATRIX",
        }
    }
}

/// A candidate layout action with its modeled cost and gain.
#[derive(Clone, Copy, Debug)]
pub struct RetilePlan {
    /// The target action.
    pub action: PlanAction,
    /// Estimated transition cost in microseconds.
    pub est_cost_us: f64,
    /// Estimated per-frame gain in microseconds.
    pub est_gain_us: f64,
}

impl RetilePlan {
    /// A plain SoA plan carrying no cost model.
    pub fn to_soa() -> Self {
        Self { action: PlanAction::Soa, est_cost_us: 0.0, est_gain_us: 0.0 }
    }
}

/// Builds an AoSoA retile plan for a view.
///
/// Cost is the view's total column bytes over the bandwidth heuristic. Gain
/// applies the learned coefficients to divergence, coalescing, and tail
/// pressure terms over a recent aggregate, clamped to [30, 35% of base].
pub fn plan_aosoa(
    store: &Store,
    metrics: &MetricsHub,
    learn: &LearnState,
    v: ViewId,
    tile: u32,
) -> RetilePlan {
    let bytes = store.bytes_to_move(v) as f64;
    let est_cost_us = bytes / MEM_BW_BYTES_PER_US;

    let a = metrics.aggregate(v, 3);
    let div_term = (a.branch_div - 0.15).max(0.0);
    let mem_term = (0.75 - a.mem_coalesce).max(0.0);
    let tail_term = (a.tail_ratio - 1.10).max(0.0);
    let base = if a.p95_us > 0.0 {
        a.p95_us
    } else if a.mean_us > 0.0 {
        a.mean_us
    } else {
        500.0
    };

    let raw = base * (learn.a_div * div_term + learn.a_mem * mem_term + learn.a_tail * tail_term);
    RetilePlan {
        action: PlanAction::Aosoa { tile },
        est_cost_us,
        est_gain_us: raw.min(base * 0.35).max(30.0),
    }
}

/// Builds a matrix-block packing plan for a view.
///
/// Packing touches only the selected columns, so cost is discounted to a
/// quarter of a full move. Gain rewards poor coalescing only, clamped to
/// [15, 20% of base].
pub fn plan_matrix(
    store: &Store,
    metrics: &MetricsHub,
    learn: &LearnState,
    v: ViewId,
    block: u32,
) -> RetilePlan {
    let bytes = store.bytes_to_move(v) as f64;
    let est_cost_us = 0.25 * bytes / MEM_BW_BYTES_PER_US;

    let a = metrics.aggregate(v, 3);
    let mem_term = (0.80 - a.mem_coalesce).max(0.0);
    let base = if a.mean_us > 0.0 { a.mean_us } else { 400.0 };

    let raw = base * (0.8 * learn.a_mem * mem_term);
    RetilePlan {
        action: PlanAction::Matrix { block },
        est_cost_us,
        est_gain_us: raw.min(base * 0.20).max(15.0),
    }
}

/// Applies a plan's layout transition to the store.
///
/// `Matrix` is a no-op success: blocks are transient via acquire/release.
/// Returns `false` when the store refuses (unknown view, outstanding block).
pub fn retile(store: &mut Store, v: ViewId, plan: &RetilePlan) -> bool {
    match plan.action {
        PlanAction::Aosoa { tile } => store.soa_to_aosoa(v, tile).is_ok(),
        PlanAction::Soa => store.aosoa_to_soa(v).is_ok(),
        PlanAction::Matrix { .. } => true,
    }
}

/// Returns a view to SoA. Equivalent to applying [`RetilePlan::to_soa`].
pub fn retile_to_soa(store: &mut Store, v: ViewId) -> bool {
    store.aosoa_to_soa(v).is_ok()
}
