//! Error types for the schema registry and columnar store.
//!
//! This module declares focused, composable error types used across the
//! storage and retile pipeline. Each error carries enough context to make
//! failures actionable while remaining small and cheap to pass around or
//! convert into the aggregate [`RuntimeError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (unknown
//!   view id, outstanding matrix block, overlapping acquire).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`std::fmt::Display`], and provide `From<T>` conversions into aggregate
//!   errors so callers can use `?`.
//!
//! ## Failure policy
//! Precondition violations at lookup APIs (`column`, `view_len`,
//! `current_layout`) do not produce errors at all; they yield `None` or an
//! empty value and the runtime continues. The typed errors here cover the
//! mutating paths where a caller must know the operation did not happen.

use std::fmt;

use crate::runtime::types::{ArchetypeId, ViewId};

/// Returned when an operation addresses a view id that was never created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownViewError {
    /// The offending view id.
    pub view: ViewId,
}

impl fmt::Display for UnknownViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown view id {}", self.view)
    }
}

impl std::error::Error for UnknownViewError {}

/// Returned when a layout transition is requested while one or more matrix
/// blocks are outstanding on the view.
///
/// A matrix block is a disjoint temporary copy of selected column rows;
/// re-laying out the columns underneath it would make the eventual
/// write-back target stale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOutstandingError {
    /// The view holding outstanding blocks.
    pub view: ViewId,
    /// Number of blocks currently outstanding.
    pub outstanding: usize,
}

impl fmt::Display for BlockOutstandingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "view {} has {} outstanding matrix block(s); layout transition refused",
            self.view, self.outstanding
        )
    }
}

impl std::error::Error for BlockOutstandingError {}

/// Returned when a matrix-block acquire overlaps the row range of a block
/// that is still outstanding on the same view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOverlapError {
    /// The view the acquire addressed.
    pub view: ViewId,
    /// Requested starting row.
    pub offset: usize,
    /// Requested row count.
    pub rows: usize,
}

impl fmt::Display for BlockOverlapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "matrix block rows [{}, {}) overlap an outstanding block on view {}",
            self.offset,
            self.offset + self.rows,
            self.view
        )
    }
}

impl std::error::Error for BlockOverlapError {}

/// Aggregate error for columnar-store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// A view id was never created.
    UnknownView(UnknownViewError),
    /// A layout transition was refused because matrix blocks are outstanding.
    BlockOutstanding(BlockOutstandingError),
    /// A matrix-block acquire overlapped an outstanding block.
    BlockOverlap(BlockOverlapError),
    /// A tile width of zero was requested for an AoSoA transition.
    ZeroTile,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownView(e) => write!(f, "{e}"),
            StoreError::BlockOutstanding(e) => write!(f, "{e}"),
            StoreError::BlockOverlap(e) => write!(f, "{e}"),
            StoreError::ZeroTile => f.write_str("AoSoA tile width must be nonzero"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<UnknownViewError> for StoreError {
    fn from(e: UnknownViewError) -> Self {
        StoreError::UnknownView(e)
    }
}

impl From<BlockOutstandingError> for StoreError {
    fn from(e: BlockOutstandingError) -> Self {
        StoreError::BlockOutstanding(e)
    }
}

impl From<BlockOverlapError> for StoreError {
    fn from(e: BlockOverlapError) -> Self {
        StoreError::BlockOverlap(e)
    }
}

/// Aggregate error for schema lookups during storage allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// An archetype id was never defined.
    UnknownArchetype {
        /// The offending archetype id.
        archetype: ArchetypeId,
    },
    /// An archetype references a component name that was never defined.
    UnknownComponent {
        /// The missing component name.
        component: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownArchetype { archetype } => {
                write!(f, "unknown archetype id {archetype}")
            }
            SchemaError::UnknownComponent { component } => {
                write!(f, "archetype references undefined component '{component}'")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Top-level error for runtime entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A columnar-store operation failed.
    Store(StoreError),
    /// A schema lookup failed.
    Schema(SchemaError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Store(e) => write!(f, "{e}"),
            RuntimeError::Schema(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<StoreError> for RuntimeError {
    fn from(e: StoreError) -> Self {
        RuntimeError::Store(e)
    }
}

impl From<SchemaError> for RuntimeError {
    fn from(e: SchemaError) -> Self {
        RuntimeError::Schema(e)
    }
}

/// Result alias for columnar-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result alias for runtime entry points.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
