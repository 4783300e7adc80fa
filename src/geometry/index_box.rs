//! Rectangular regions of index space with per-axis cell/node centering.
//!
//! An [`IndexBox`] is the closed integer interval `[lo, hi]` on every axis.
//! Along an axis the box is either *cell* centred (indices name cells) or
//! *node* centred (indices name the faces between cells, face `i` lying
//! between cells `i - 1` and `i`). Boxes of different centering never
//! intersect; convert first.

use core::fmt;
use core::ops::BitAnd;
use serde::{Deserialize, Serialize};

use super::int_vect::IntVect;
use super::orientation::{Orientation, Side};

/// Per-axis centering bitmask: bit `d` set means node centred along `d`.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexType(u32);

impl IndexType {
    /// Cell centred along every axis.
    #[inline]
    pub const fn cell() -> Self {
        Self(0)
    }

    /// Node centred along `axis` only (the centering of axis-`axis` fluxes).
    #[inline]
    pub const fn face(axis: usize) -> Self {
        Self(1 << axis)
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_node(&self, axis: usize) -> bool {
        self.0 & (1 << axis) != 0
    }

    #[inline]
    pub fn is_cell(&self, axis: usize) -> bool {
        !self.is_node(axis)
    }

    #[inline]
    pub fn with_node(self, axis: usize) -> Self {
        Self(self.0 | (1 << axis))
    }

    #[inline]
    pub fn with_cell(self, axis: usize) -> Self {
        Self(self.0 & !(1 << axis))
    }
}

impl fmt::Debug for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "cell")
        } else {
            write!(f, "node{:#b}", self.0)
        }
    }
}

/// Closed box `[lo, hi]` of a `D`-dimensional index space.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexBox<const D: usize> {
    lo: IntVect<D>,
    hi: IntVect<D>,
    itype: IndexType,
}

impl<const D: usize> IndexBox<D> {
    /// Cell-centred box.
    #[inline]
    pub fn new(lo: IntVect<D>, hi: IntVect<D>) -> Self {
        Self::with_type(lo, hi, IndexType::cell())
    }

    #[inline]
    pub fn with_type(lo: IntVect<D>, hi: IntVect<D>, itype: IndexType) -> Self {
        Self { lo, hi, itype }
    }

    /// Cell-centred box from plain arrays.
    #[inline]
    pub fn from_corners(lo: [i64; D], hi: [i64; D]) -> Self {
        Self::new(IntVect(lo), IntVect(hi))
    }

    #[inline]
    pub fn lo(&self) -> IntVect<D> {
        self.lo
    }

    #[inline]
    pub fn hi(&self) -> IntVect<D> {
        self.hi
    }

    #[inline]
    pub fn index_type(&self) -> IndexType {
        self.itype
    }

    /// True when `lo > hi` along some axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..D).any(|d| self.lo[d] > self.hi[d])
    }

    #[inline]
    pub fn length(&self, axis: usize) -> i64 {
        (self.hi[axis] - self.lo[axis] + 1).max(0)
    }

    pub fn num_pts(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        (0..D).map(|d| self.length(d) as usize).product()
    }

    #[inline]
    pub fn contains_point(&self, p: &IntVect<D>) -> bool {
        self.lo.all_le(p) && p.all_le(&self.hi)
    }

    /// `other` lies inside `self`; centering must agree.
    pub fn contains(&self, other: &Self) -> bool {
        self.itype == other.itype
            && !other.is_empty()
            && self.lo.all_le(&other.lo)
            && other.hi.all_le(&self.hi)
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.itype == other.itype && !self.intersection(other).is_empty()
    }

    /// Overlap of two equally centred boxes (possibly empty).
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            lo: self.lo.component_max(&other.lo),
            hi: self.hi.component_min(&other.hi),
            itype: self.itype,
        }
    }

    pub fn grow(&self, n: i64) -> Self {
        let g = IntVect::splat(n);
        Self {
            lo: self.lo - g,
            hi: self.hi + g,
            itype: self.itype,
        }
    }

    pub fn grow_dir(&self, axis: usize, n: i64) -> Self {
        let mut b = *self;
        b.lo[axis] -= n;
        b.hi[axis] += n;
        b
    }

    pub fn shift(&self, iv: IntVect<D>) -> Self {
        Self {
            lo: self.lo + iv,
            hi: self.hi + iv,
            itype: self.itype,
        }
    }

    pub fn shift_dir(&self, axis: usize, n: i64) -> Self {
        self.shift(IntVect::unit(axis) * n)
    }

    /// Coarsen by a positive ratio. Cell axes floor both ends; node axes
    /// floor `lo` and take the ceiling of `hi` so every fine face maps into
    /// the result.
    pub fn coarsen(&self, ratio: &IntVect<D>) -> Self {
        let lo = self.lo.coarsen(ratio);
        let mut hi = self.hi.coarsen(ratio);
        for d in 0..D {
            if self.itype.is_node(d) && self.hi[d].rem_euclid(ratio[d]) != 0 {
                hi[d] += 1;
            }
        }
        Self {
            lo,
            hi,
            itype: self.itype,
        }
    }

    pub fn refine(&self, ratio: &IntVect<D>) -> Self {
        let lo = self.lo.scale(ratio);
        let mut hi = self.hi.scale(ratio);
        for d in 0..D {
            if self.itype.is_cell(d) {
                hi[d] = (self.hi[d] + 1) * ratio[d] - 1;
            }
        }
        Self {
            lo,
            hi,
            itype: self.itype,
        }
    }

    /// Node-centre along `axis` (the faces bounding the cells of `self`).
    pub fn surrounding_nodes(&self, axis: usize) -> Self {
        if self.itype.is_node(axis) {
            return *self;
        }
        let mut b = *self;
        b.hi[axis] += 1;
        b.itype = self.itype.with_node(axis);
        b
    }

    /// Cell-centre along `axis` (the cells between the faces of `self`).
    pub fn enclosed_cells(&self, axis: usize) -> Self {
        if self.itype.is_cell(axis) {
            return *self;
        }
        let mut b = *self;
        b.hi[axis] -= 1;
        b.itype = self.itype.with_cell(axis);
        b
    }

    /// Fully cell-centred version of this box.
    pub fn to_cells(&self) -> Self {
        (0..D).fold(*self, |b, d| b.enclosed_cells(d))
    }

    /// One-cell-thick slab of cells just outside `face`.
    pub fn adj_cell(&self, face: Orientation) -> Self {
        let cells = self.to_cells();
        let d = face.axis();
        let mut b = cells;
        match face.side() {
            Side::Low => {
                b.lo[d] = cells.lo[d] - 1;
                b.hi[d] = cells.lo[d] - 1;
            }
            Side::High => {
                b.lo[d] = cells.hi[d] + 1;
                b.hi[d] = cells.hi[d] + 1;
            }
        }
        b
    }

    /// One-face-thick, node-along-axis box on `face` of the cell region.
    pub fn face_box(&self, face: Orientation) -> Self {
        let cells = self.to_cells();
        let d = face.axis();
        let k = match face.side() {
            Side::Low => cells.lo[d],
            Side::High => cells.hi[d] + 1,
        };
        let mut b = cells;
        b.lo[d] = k;
        b.hi[d] = k;
        b.itype = IndexType::face(d);
        b
    }

    /// Linear offset of `p` with axis 0 fastest. `p` must lie in the box.
    #[inline]
    pub fn offset(&self, p: &IntVect<D>) -> usize {
        let mut off = 0usize;
        let mut stride = 1usize;
        for d in 0..D {
            off += (p[d] - self.lo[d]) as usize * stride;
            stride *= self.length(d) as usize;
        }
        off
    }

    /// Iterate the indices of the box, axis 0 fastest.
    pub fn iter(&self) -> BoxIter<D> {
        BoxIter {
            bx: *self,
            next: if self.is_empty() { None } else { Some(self.lo) },
        }
    }
}

impl<const D: usize> BitAnd for IndexBox<D> {
    type Output = IndexBox<D>;
    fn bitand(self, rhs: Self) -> Self {
        self.intersection(&rhs)
    }
}

impl<const D: usize> fmt::Debug for IndexBox<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<const D: usize> fmt::Display for IndexBox<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]{}", self.lo, self.hi, self.itype)
    }
}

/// Index iterator returned by [`IndexBox::iter`].
pub struct BoxIter<const D: usize> {
    bx: IndexBox<D>,
    next: Option<IntVect<D>>,
}

impl<const D: usize> Iterator for BoxIter<D> {
    type Item = IntVect<D>;

    fn next(&mut self) -> Option<IntVect<D>> {
        let cur = self.next?;
        let mut nxt = cur;
        let mut advanced = false;
        for d in 0..D {
            if nxt[d] < self.bx.hi[d] {
                nxt[d] += 1;
                advanced = true;
                break;
            }
            nxt[d] = self.bx.lo[d];
        }
        self.next = advanced.then_some(nxt);
        Some(cur)
    }
}

impl<const D: usize> IntoIterator for &IndexBox<D> {
    type Item = IntVect<D>;
    type IntoIter = BoxIter<D>;
    fn into_iter(self) -> BoxIter<D> {
        self.iter()
    }
}
