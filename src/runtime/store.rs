//! Columnar entity store with explicit layout transitions.
//!
//! Views are append-only records addressed by 1-based [`ViewId`]. Each view
//! owns one typed buffer per `"Component.field"` column path. A column's
//! physical byte image is identical under SoA and AoSoA (tiles of a single
//! column are contiguous logical ranges), so transitions re-copy tile by tile
//! (modeling the memory traffic) and must leave every logical element
//! unchanged.
//!
//! ## Invariants
//! - `column byte length == view_len * elem_size` for every column.
//! - A logical read by entity index observes the same scalar value under any
//!   layout.
//! - No layout transition starts while a matrix block is outstanding, and no
//!   two outstanding blocks overlap in rows.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::runtime::error::{
    BlockOutstandingError,
    BlockOverlapError,
    RuntimeResult,
    StoreError,
    StoreResult,
    UnknownViewError,
};
use crate::runtime::schema::SchemaRegistry;
use crate::runtime::types::{ArchetypeId, LayoutKind, ScalarType, ViewId};

/// Marker trait tying a Rust scalar to its [`ScalarType`] column tag.
///
/// Implemented for exactly the five scalar types a column may hold. Used by
/// the typed column accessors; not intended for implementation outside this
/// crate.
pub trait ColumnScalar: bytemuck::Pod {
    /// The scalar tag corresponding to `Self`.
    const SCALAR: ScalarType;

    #[doc(hidden)]
    fn slice(buf: &ColumnBuf) -> Option<&[Self]>;

    #[doc(hidden)]
    fn slice_mut(buf: &mut ColumnBuf) -> Option<&mut [Self]>;
}

/// Typed storage for one column.
#[derive(Clone, Debug)]
pub enum ColumnBuf {
    /// 32-bit float elements.
    F32(Vec<f32>),
    /// 32-bit signed elements.
    I32(Vec<i32>),
    /// 32-bit unsigned elements.
    U32(Vec<u32>),
    /// 64-bit float elements.
    F64(Vec<f64>),
    /// 64-bit signed elements.
    I64(Vec<i64>),
}

macro_rules! impl_column_scalar {
    ($rust:ty, $tag:ident) => {
        impl ColumnScalar for $rust {
            const SCALAR: ScalarType = ScalarType::$tag;

            fn slice(buf: &ColumnBuf) -> Option<&[Self]> {
                match buf {
                    ColumnBuf::$tag(v) => Some(v),
                    _ => None,
                }
            }

            fn slice_mut(buf: &mut ColumnBuf) -> Option<&mut [Self]> {
                match buf {
                    ColumnBuf::$tag(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_column_scalar!(f32, F32);
impl_column_scalar!(i32, I32);
impl_column_scalar!(u32, U32);
impl_column_scalar!(f64, F64);
impl_column_scalar!(i64, I64);

impl ColumnBuf {
    fn zeroed(ty: ScalarType, len: usize) -> Self {
        match ty {
            ScalarType::F32 => ColumnBuf::F32(vec![0.0; len]),
            ScalarType::I32 => ColumnBuf::I32(vec![0; len]),
            ScalarType::U32 => ColumnBuf::U32(vec![0; len]),
            ScalarType::F64 => ColumnBuf::F64(vec![0.0; len]),
            ScalarType::I64 => ColumnBuf::I64(vec![0; len]),
        }
    }

    /// Scalar tag of the stored elements.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ColumnBuf::F32(_) => ScalarType::F32,
            ColumnBuf::I32(_) => ScalarType::I32,
            ColumnBuf::U32(_) => ScalarType::U32,
            ColumnBuf::F64(_) => ScalarType::F64,
            ColumnBuf::I64(_) => ScalarType::I64,
        }
    }

    /// Byte width of one element.
    #[inline]
    pub fn elem_size(&self) -> usize {
        self.scalar_type().width()
    }

    fn bytes(&self) -> &[u8] {
        match self {
            ColumnBuf::F32(v) => bytemuck::cast_slice(v),
            ColumnBuf::I32(v) => bytemuck::cast_slice(v),
            ColumnBuf::U32(v) => bytemuck::cast_slice(v),
            ColumnBuf::F64(v) => bytemuck::cast_slice(v),
            ColumnBuf::I64(v) => bytemuck::cast_slice(v),
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            ColumnBuf::F32(v) => bytemuck::cast_slice_mut(v),
            ColumnBuf::I32(v) => bytemuck::cast_slice_mut(v),
            ColumnBuf::U32(v) => bytemuck::cast_slice_mut(v),
            ColumnBuf::F64(v) => bytemuck::cast_slice_mut(v),
            ColumnBuf::I64(v) => bytemuck::cast_slice_mut(v),
        }
    }

    fn byte_len(&self) -> usize {
        self.bytes().len()
    }

    // Re-copies the buffer tile by tile. The destination offsets equal the
    // source offsets (tiles of one column are contiguous logical ranges), so
    // this models the transition's memory traffic without changing values.
    fn retile(&mut self, len: usize, tile: usize) {
        match self {
            ColumnBuf::F32(v) => tile_copy(v, len, tile),
            ColumnBuf::I32(v) => tile_copy(v, len, tile),
            ColumnBuf::U32(v) => tile_copy(v, len, tile),
            ColumnBuf::F64(v) => tile_copy(v, len, tile),
            ColumnBuf::I64(v) => tile_copy(v, len, tile),
        }
    }
}

fn tile_copy<T: Copy + Default>(buf: &mut Vec<T>, len: usize, tile: usize) {
    let mut dst = vec![T::default(); buf.len()];
    let mut base = 0;
    while base < len {
        let end = (base + tile).min(len);
        dst[base..end].copy_from_slice(&buf[base..end]);
        base = end;
    }
    *buf = dst;
}

/// Per-row field writer handed to spawn initializers.
///
/// Unknown column paths and scalar-type mismatches are ignored: an
/// initializer can only touch columns the archetype actually allocated.
pub struct RowWriter<'a> {
    columns: &'a mut HashMap<String, ColumnBuf>,
    index: usize,
}

macro_rules! row_setter {
    ($fn_name:ident, $rust:ty, $tag:ident) => {
        /// Sets one field of the current row by column path.
        pub fn $fn_name(&mut self, path: &str, value: $rust) {
            if let Some(ColumnBuf::$tag(v)) = self.columns.get_mut(path) {
                if let Some(slot) = v.get_mut(self.index) {
                    *slot = value;
                }
            }
        }
    };
}

impl RowWriter<'_> {
    /// Index of the row being initialized.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    row_setter!(set_f32, f32, F32);
    row_setter!(set_i32, i32, I32);
    row_setter!(set_u32, u32, U32);
    row_setter!(set_f64, f64, F64);
    row_setter!(set_i64, i64, I64);
}

/// Transient column-major dense extract of K columns × B rows.
///
/// Element `(i, j)` lives at `data[j * leading_dim + i]`. The handle records
/// the column paths it was acquired from; releasing with write-back targets
/// exactly those columns by name. Rows past the view's real extent carry
/// zeroes and are never written back.
pub struct MatrixBlock {
    view: ViewId,
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    leading_dim: usize,
    offset: usize,
    columns: Vec<String>,
}

impl MatrixBlock {
    /// The view this block was extracted from.
    #[inline]
    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Row count B (not clamped at the view edge).
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count K.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stride between consecutive columns; equals `rows`.
    #[inline]
    pub fn leading_dim(&self) -> usize {
        self.leading_dim
    }

    /// First logical row covered by this block.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total buffer size in bytes.
    #[inline]
    pub fn bytes(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }

    /// The whole column-major buffer.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to the whole column-major buffer.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// One block column as a contiguous slice.
    pub fn column(&self, j: usize) -> Option<&[f32]> {
        if j >= self.cols {
            return None;
        }
        Some(&self.data[j * self.leading_dim..j * self.leading_dim + self.rows])
    }

    /// One block column as a mutable contiguous slice.
    pub fn column_mut(&mut self, j: usize) -> Option<&mut [f32]> {
        if j >= self.cols {
            return None;
        }
        Some(&mut self.data[j * self.leading_dim..j * self.leading_dim + self.rows])
    }

    /// Two distinct block columns, mutably at once.
    pub fn column_pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut [f32], &mut [f32])> {
        if a == b || a >= self.cols || b >= self.cols {
            return None;
        }
        let ld = self.leading_dim;
        let rows = self.rows;
        let (lo, hi, swapped) = if a < b { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.data.split_at_mut(hi * ld);
        let lo_slice = &mut head[lo * ld..lo * ld + rows];
        let hi_slice = &mut tail[..rows];
        if swapped {
            Some((hi_slice, lo_slice))
        } else {
            Some((lo_slice, hi_slice))
        }
    }
}

// Invariant:
// - `columns[path].byte_len() == len * elem_size` for every column.
// - `aosoa_tile` is nonzero exactly when `layout == AoSoA`.
// - `outstanding` holds the (offset, rows) ranges of live matrix blocks.
struct ViewRec {
    arch: ArchetypeId,
    len: usize,
    columns: HashMap<String, ColumnBuf>,
    layout: LayoutKind,
    aosoa_tile: u32,
    outstanding: Vec<(usize, usize)>,
}

impl ViewRec {
    fn empty(arch: ArchetypeId) -> Self {
        Self {
            arch,
            len: 0,
            columns: HashMap::new(),
            layout: LayoutKind::SoA,
            aosoa_tile: 0,
            outstanding: Vec::new(),
        }
    }
}

/// Owner of all views and their column buffers.
#[derive(Default)]
pub struct Store {
    views: Vec<ViewRec>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn view(&self, v: ViewId) -> Option<&ViewRec> {
        if v == 0 {
            return None;
        }
        self.views.get(v as usize - 1)
    }

    fn view_mut(&mut self, v: ViewId) -> Result<&mut ViewRec, UnknownViewError> {
        if v == 0 {
            return Err(UnknownViewError { view: v });
        }
        self.views
            .get_mut(v as usize - 1)
            .ok_or(UnknownViewError { view: v })
    }

    /// Iterates over all live view ids in creation order.
    pub fn view_ids(&self) -> impl Iterator<Item = ViewId> {
        1..=self.views.len() as ViewId
    }

    /// Allocates a view of `count` zero-initialized entities for an
    /// archetype, deriving one column per registered component field and
    /// honoring each field's scalar width.
    pub fn spawn(
        &mut self,
        schema: &SchemaRegistry,
        arch: ArchetypeId,
        count: usize,
    ) -> RuntimeResult<ViewId> {
        let layout = schema.column_layout(arch)?;

        let mut rec = ViewRec::empty(arch);
        rec.len = count;
        for (path, ty) in layout {
            rec.columns.insert(path, ColumnBuf::zeroed(ty, count));
        }
        self.views.push(rec);
        Ok(self.views.len() as ViewId)
    }

    /// Like [`Store::spawn`], then calls `init` once per row with a
    /// [`RowWriter`] positioned at that row.
    pub fn spawn_with(
        &mut self,
        schema: &SchemaRegistry,
        arch: ArchetypeId,
        count: usize,
        mut init: impl FnMut(usize, &mut RowWriter<'_>),
    ) -> RuntimeResult<ViewId> {
        let id = self.spawn(schema, arch, count)?;
        let rec = &mut self.views[id as usize - 1];
        for i in 0..count {
            let mut row = RowWriter { columns: &mut rec.columns, index: i };
            init(i, &mut row);
        }
        Ok(id)
    }

    /// Returns the first existing view with this archetype, or creates a new
    /// empty one. Ids are 1-based.
    pub fn make_view(&mut self, arch: ArchetypeId) -> ViewId {
        for (i, rec) in self.views.iter().enumerate() {
            if rec.arch == arch {
                return (i + 1) as ViewId;
            }
        }
        self.views.push(ViewRec::empty(arch));
        self.views.len() as ViewId
    }

    /// Entity count of a view; 0 for an unknown id.
    pub fn view_len(&self, v: ViewId) -> usize {
        self.view(v).map_or(0, |rec| rec.len)
    }

    /// Current physical layout of a view.
    pub fn current_layout(&self, v: ViewId) -> Option<LayoutKind> {
        self.view(v).map(|rec| rec.layout)
    }

    /// AoSoA tile width of a view; 0 unless the layout is AoSoA.
    pub fn aosoa_tile(&self, v: ViewId) -> u32 {
        self.view(v).map_or(0, |rec| rec.aosoa_tile)
    }

    /// Total bytes across all of a view's columns. Feeds the cost model.
    pub fn bytes_to_move(&self, v: ViewId) -> usize {
        self.view(v)
            .map_or(0, |rec| rec.columns.values().map(ColumnBuf::byte_len).sum())
    }

    /// Raw pointer and byte length of a column buffer, or `None` for an
    /// unknown view or column path.
    pub fn column(&mut self, v: ViewId, path: &str) -> Option<(*mut u8, usize)> {
        let rec = self.view_mut(v).ok()?;
        let bytes = rec.columns.get_mut(path)?.bytes_mut();
        Some((bytes.as_mut_ptr(), bytes.len()))
    }

    /// A column's buffer as bytes.
    pub fn column_bytes(&self, v: ViewId, path: &str) -> Option<&[u8]> {
        Some(self.view(v)?.columns.get(path)?.bytes())
    }

    /// A column's buffer as a typed slice. `None` if the view or path is
    /// unknown or the scalar type does not match `T`.
    pub fn column_slice<T: ColumnScalar>(&self, v: ViewId, path: &str) -> Option<&[T]> {
        T::slice(self.view(v)?.columns.get(path)?)
    }

    /// A column's buffer as a mutable typed slice.
    pub fn column_slice_mut<T: ColumnScalar>(&mut self, v: ViewId, path: &str) -> Option<&mut [T]> {
        T::slice_mut(self.view_mut(v).ok()?.columns.get_mut(path)?)
    }

    /// Two distinct columns of one view, mutably at once. `None` if the
    /// paths are equal, unknown, or mismatch `T`.
    pub fn column_pair_mut<T: ColumnScalar>(
        &mut self,
        v: ViewId,
        a: &str,
        b: &str,
    ) -> Option<(&mut [T], &mut [T])> {
        if a == b {
            return None;
        }
        let rec = self.view_mut(v).ok()?;
        let mut first = None;
        let mut second = None;
        for (path, buf) in rec.columns.iter_mut() {
            if path == a {
                first = T::slice_mut(buf);
            } else if path == b {
                second = T::slice_mut(buf);
            }
        }
        Some((first?, second?))
    }

    fn refuse_if_blocked(rec: &ViewRec, v: ViewId) -> StoreResult<()> {
        if rec.outstanding.is_empty() {
            Ok(())
        } else {
            Err(BlockOutstandingError { view: v, outstanding: rec.outstanding.len() }.into())
        }
    }

    /// Re-lays out every column of a view as ⌈N/T⌉ tiles of up to `tile`
    /// contiguous elements and marks the view AoSoA.
    ///
    /// Observable entity values are unchanged at every logical index. Refused
    /// while a matrix block is outstanding.
    pub fn soa_to_aosoa(&mut self, v: ViewId, tile: u32) -> StoreResult<()> {
        if tile == 0 {
            return Err(StoreError::ZeroTile);
        }
        let rec = self.view_mut(v)?;
        Self::refuse_if_blocked(rec, v)?;

        let len = rec.len;
        let tile = tile as usize;
        rec.columns
            .par_iter_mut()
            .for_each(|(_, col)| col.retile(len, tile));
        rec.layout = LayoutKind::AoSoA;
        rec.aosoa_tile = tile as u32;
        Ok(())
    }

    /// Inverse of [`Store::soa_to_aosoa`]. On a view that is already SoA,
    /// only clears the tile width.
    pub fn aosoa_to_soa(&mut self, v: ViewId) -> StoreResult<()> {
        let rec = self.view_mut(v)?;
        Self::refuse_if_blocked(rec, v)?;

        if rec.layout == LayoutKind::AoSoA {
            let len = rec.len;
            rec.columns
                .par_iter_mut()
                .for_each(|(_, col)| col.retile(len, len.max(1)));
        }
        rec.layout = LayoutKind::SoA;
        rec.aosoa_tile = 0;
        Ok(())
    }

    /// Extracts a column-major `f32` block of `comps.len()` columns ×
    /// `rows` rows starting at logical row `offset`.
    ///
    /// Unknown or non-`f32` column paths leave their block column zeroed.
    /// Rows past the view's extent stay zeroed. An acquire whose row range
    /// overlaps an outstanding block on the same view is refused.
    pub fn acquire_matrix_block(
        &mut self,
        v: ViewId,
        comps: &[&str],
        rows: usize,
        offset: usize,
    ) -> StoreResult<MatrixBlock> {
        let rec = self.view_mut(v)?;
        for &(o, r) in &rec.outstanding {
            if offset < o + r && o < offset + rows {
                return Err(BlockOverlapError { view: v, offset, rows }.into());
            }
        }

        let n = rec.len;
        let cols = comps.len();
        let mut data = vec![0.0f32; rows * cols];
        for (j, path) in comps.iter().enumerate() {
            let Some(ColumnBuf::F32(src)) = rec.columns.get(*path) else {
                continue;
            };
            let count = rows.min(n.saturating_sub(offset));
            if count > 0 {
                data[j * rows..j * rows + count].copy_from_slice(&src[offset..offset + count]);
            }
        }
        rec.outstanding.push((offset, rows));

        Ok(MatrixBlock {
            view: v,
            data,
            rows,
            cols,
            leading_dim: rows,
            offset,
            columns: comps.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Releases a matrix block, optionally writing its contents back to the
    /// columns it was acquired from, by name, clamped at the view edge.
    /// Consumes the handle; the block buffer is freed either way.
    pub fn release_matrix_block(&mut self, block: MatrixBlock, write_back: bool) -> StoreResult<()> {
        let rec = self.view_mut(block.view)?;

        if write_back {
            let n = rec.len;
            for (j, path) in block.columns.iter().enumerate() {
                let Some(ColumnBuf::F32(dst)) = rec.columns.get_mut(path.as_str()) else {
                    continue;
                };
                let count = block.rows.min(n.saturating_sub(block.offset));
                if count > 0 {
                    let src = &block.data[j * block.leading_dim..j * block.leading_dim + count];
                    dst[block.offset..block.offset + count].copy_from_slice(src);
                }
            }
        }

        if let Some(pos) = rec
            .outstanding
            .iter()
            .position(|&(o, r)| o == block.offset && r == block.rows)
        {
            rec.outstanding.swap_remove(pos);
        }
        Ok(())
    }
}
