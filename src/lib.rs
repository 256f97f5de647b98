//! # DynSoA
//!
//! Adaptive data-layout runtime for entity-component-style workloads.
//!
//! A program declares *components* (named records of scalar fields) and
//! *archetypes* (sets of components), spawns a population of entities, and
//! submits compute *kernels* that iterate over the population frame by frame.
//! The runtime stores entity state in one of several physical layouts
//! (structure-of-arrays, tiled AoSoA, or a transient column-major matrix
//! block) and reshapes the layout between frames based on observed kernel
//! behavior, with the goal of reducing tail latency.
//!
//! ## Design Goals
//! - Columnar storage with explicit, value-preserving layout transitions
//! - Per-kernel timing and behavior metrics with windowed aggregation
//! - A frame-boundary control loop driven by user policy, a cost/gain model
//!   with online-learned coefficients, and UCB1 catalog exploration
//! - Single ownership of all process state in one [`Runtime`] value

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod metrics;
pub mod runtime;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Runtime facade

pub use runtime::runtime::{KernelReport, Runtime};

pub use runtime::types::{
    ArchetypeId,
    Config,
    Device,
    KernelCtx,
    LayoutKind,
    ScalarType,
    ViewId,
};

// Schema

pub use runtime::schema::{
    ArchetypeDesc,
    Component,
    Field,
    SchemaRegistry,
};

// Storage

pub use runtime::store::{
    ColumnBuf,
    ColumnScalar,
    MatrixBlock,
    RowWriter,
    Store,
};

// Layout plans and the cost/gain model

pub use runtime::layout::{
    PlanAction,
    RetilePlan,
};

// Policy and scheduling

pub use runtime::policy::{
    Policy,
    PolicyTrigger,
    TriggerAction,
};

pub use runtime::scheduler::LearnState;

pub use runtime::error::{
    RuntimeError,
    RuntimeResult,
    SchemaError,
    StoreError,
    StoreResult,
};

// Metrics

pub use metrics::{FrameAgg, MetricsHub, Sample};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used runtime types.
///
/// Import with:
/// ```rust
/// use dynsoa::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Component,
        Config,
        Field,
        FrameAgg,
        KernelCtx,
        KernelReport,
        LayoutKind,
        Policy,
        PolicyTrigger,
        RetilePlan,
        Runtime,
        Sample,
        ScalarType,
        TriggerAction,
    };
}
