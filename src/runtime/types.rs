//! Core Types, Identifiers, and Configuration
//!
//! This module defines the **fundamental types and identifiers** shared across
//! all runtime subsystems: the schema registry, the columnar store, layout
//! planning, metrics, and the scheduler.
//!
//! ## Identifiers
//!
//! Archetypes and views are identified by stable **1-based** integer ids.
//! Id `0` is never valid; a lookup with an unknown id yields `None` (or an
//! empty/default value at APIs that promise non-propagating failure).
//!
//! ## Layouts
//!
//! [`LayoutKind`] names the physical arrangement of a view's columns:
//!
//! - `SoA` — one contiguous buffer per column, element `i` at offset
//!   `i * elem_size`. The initial layout of every view.
//! - `AoSoA` — each column partitioned into tiles of `T` elements; the last
//!   tile may be short. Logical index `i` maps to tile `i / T`, lane `i % T`.
//! - `Matrix` — a transient column-major dense block extracted from selected
//!   columns; exists only between acquire and release.
//! - `AoS` — present for completeness; the runtime never constructs it and
//!   refuses to retile toward it.

use std::fmt;

/// Stable 1-based identifier for an archetype.
pub type ArchetypeId = u64;

/// Stable 1-based identifier for a view (a concrete entity population).
pub type ViewId = u64;

/// Execution device selector.
///
/// The runtime only *models* GPU-style behavior signals (warp efficiency,
/// branch divergence, coalescing); there is no device backend behind this
/// flag. It is carried in [`Config`] for API completeness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    /// Host CPU execution.
    Cpu,
    /// Modeled GPU execution.
    Gpu,
}

/// Scalar type tag for a component field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// 32-bit IEEE float.
    F32,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit IEEE float.
    F64,
    /// 64-bit signed integer.
    I64,
}

impl ScalarType {
    /// Byte width of one element of this scalar type.
    #[inline]
    pub fn width(self) -> usize {
        match self {
            ScalarType::F32 | ScalarType::I32 | ScalarType::U32 => 4,
            ScalarType::F64 | ScalarType::I64 => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::F32 => "f32",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::F64 => "f64",
            ScalarType::I64 => "i64",
        };
        f.write_str(name)
    }
}

/// Physical arrangement of a view's columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    /// Array-of-structures. Unsupported as a retile target.
    AoS,
    /// Structure-of-arrays. The initial layout.
    SoA,
    /// Tiled array-of-structure-of-arrays.
    AoSoA,
    /// Transient column-major dense block.
    Matrix,
}

impl LayoutKind {
    /// Stable numeric tag used in bandit action keys and trace logs.
    #[inline]
    pub(crate) fn tag(self) -> i64 {
        match self {
            LayoutKind::AoS => 0,
            LayoutKind::SoA => 1,
            LayoutKind::AoSoA => 2,
            LayoutKind::Matrix => 3,
        }
    }
}

/// Runtime construction options.
///
/// `max_retile_us` is adopted as the scheduler's per-frame retile budget:
/// the sum of estimated costs of actions applied in one frame never exceeds
/// it. The remaining fields are defaults handed to demo policies and the
/// matrix-block path.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Execution device (modeled only).
    pub device: Device,
    /// Default AoSoA tile width in entities.
    pub aosoa_tile: u32,
    /// Default matrix-block row count.
    pub matrix_block: u32,
    /// Per-frame retile budget in microseconds.
    pub max_retile_us: u32,
    /// Run the adaptive decision loop on frame boundaries.
    pub scheduler_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            aosoa_tile: 128,
            matrix_block: 1024,
            max_retile_us: 500,
            scheduler_enabled: false,
        }
    }
}

/// Per-invocation context handed to a kernel.
#[derive(Clone, Copy, Debug, Default)]
pub struct KernelCtx {
    /// Simulation timestep in seconds.
    pub dt: f32,
    /// Tile width the kernel may exploit (0 when the view is SoA).
    pub tile: u32,
}
