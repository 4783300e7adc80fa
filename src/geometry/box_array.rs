//! BoxArray: the ordered, globally known box list of one AMR level.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::index_box::{IndexBox, IndexType};
use super::int_vect::IntVect;
use crate::debug_invariants::DebugInvariants;
use crate::flux_error::FluxRegisterError;

/// Ordered list of equally centred boxes. Box `k` keeps index `k` for the
/// lifetime of the array; every rank sees the same list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxArray<const D: usize> {
    boxes: Vec<IndexBox<D>>,
}

impl<const D: usize> BoxArray<D> {
    pub fn new(boxes: Vec<IndexBox<D>>) -> Self {
        Self { boxes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    #[inline]
    pub fn get(&self, k: usize) -> Option<&IndexBox<D>> {
        self.boxes.get(k)
    }

    /// Like [`get`](Self::get) but reports an out-of-range index as an error.
    pub fn try_get(&self, k: usize) -> Result<&IndexBox<D>, FluxRegisterError> {
        self.boxes
            .get(k)
            .ok_or(FluxRegisterError::BoxIndexOutOfRange {
                index: k,
                len: self.boxes.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexBox<D>> {
        self.boxes.iter()
    }

    pub fn as_slice(&self) -> &[IndexBox<D>] {
        &self.boxes
    }

    /// Centering shared by all boxes (cell for an empty array).
    pub fn index_type(&self) -> IndexType {
        self.boxes
            .first()
            .map_or(IndexType::cell(), |b| b.index_type())
    }

    pub fn coarsen(&self, ratio: &IntVect<D>) -> Self {
        Self::new(self.boxes.iter().map(|b| b.coarsen(ratio)).collect())
    }

    pub fn surrounding_nodes(&self, axis: usize) -> Self {
        Self::new(self.boxes.iter().map(|b| b.surrounding_nodes(axis)).collect())
    }

    /// First overlapping pair, if any.
    pub fn first_overlap(&self) -> Option<(usize, usize)> {
        self.boxes
            .iter()
            .enumerate()
            .tuple_combinations()
            .find(|((_, a), (_, b))| a.intersects(b))
            .map(|((i, _), (j, _))| (i, j))
    }

    pub fn is_disjoint(&self) -> bool {
        self.first_overlap().is_none()
    }

    /// Indices of the boxes that intersect `region`.
    pub fn intersecting(&self, region: &IndexBox<D>) -> Vec<usize> {
        self.boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.intersects(region))
            .map(|(k, _)| k)
            .collect()
    }
}

impl<const D: usize> From<Vec<IndexBox<D>>> for BoxArray<D> {
    fn from(boxes: Vec<IndexBox<D>>) -> Self {
        Self::new(boxes)
    }
}

impl<const D: usize> core::ops::Index<usize> for BoxArray<D> {
    type Output = IndexBox<D>;
    fn index(&self, k: usize) -> &IndexBox<D> {
        &self.boxes[k]
    }
}

impl<const D: usize> DebugInvariants for BoxArray<D> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "BoxArray");
    }

    fn validate_invariants(&self) -> Result<(), FluxRegisterError> {
        let t = self.index_type();
        for b in &self.boxes {
            if b.index_type() != t {
                return Err(FluxRegisterError::IndexTypeMismatch {
                    expected: t.to_string(),
                    found: b.index_type().to_string(),
                });
            }
            if b.is_empty() {
                return Err(FluxRegisterError::RegionNotContained {
                    region: b.to_string(),
                    container: "a non-empty box".into(),
                });
            }
        }
        Ok(())
    }
}
