//! FabArray: a distributed array of [`FArrayBox`] patches.
//!
//! Every rank holds the full [`BoxArray`] and [`DistributionMapping`] but
//! stores only the patches it owns. Data owned elsewhere is reachable only
//! through [`CopyDescriptor`](crate::algs::copy_descriptor::CopyDescriptor).

use std::collections::BTreeMap;

use super::distribution::DistributionMapping;
use super::fab::FArrayBox;
use crate::Real;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{BoxArray, IndexBox};

#[derive(Clone, Debug)]
pub struct FabArray<const D: usize> {
    boxes: BoxArray<D>,
    dm: DistributionMapping,
    ncomp: usize,
    rank: usize,
    fabs: BTreeMap<usize, FArrayBox<D>>,
}

/// Cell data of one AMR level.
pub type MultiFab<const D: usize> = FabArray<D>;
/// Boundary data attached to a box array (one face per box).
pub type FabSet<const D: usize> = FabArray<D>;

impl<const D: usize> FabArray<D> {
    /// Allocate zero-filled patches for the boxes `rank` owns.
    pub fn new(
        boxes: BoxArray<D>,
        dm: DistributionMapping,
        ncomp: usize,
        rank: usize,
    ) -> Result<Self, FluxRegisterError> {
        if boxes.len() != dm.len() {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: boxes.len(),
                found: dm.len(),
            });
        }
        let fabs = dm
            .local_indices(rank)
            .map(|k| (k, FArrayBox::new(boxes[k], ncomp)))
            .collect();
        Ok(Self {
            boxes,
            dm,
            ncomp,
            rank,
            fabs,
        })
    }

    /// Allocate and fill each local patch with `f(box_index, patch)`.
    pub fn from_fn<F>(
        boxes: BoxArray<D>,
        dm: DistributionMapping,
        ncomp: usize,
        rank: usize,
        mut f: F,
    ) -> Result<Self, FluxRegisterError>
    where
        F: FnMut(usize, &mut FArrayBox<D>),
    {
        let mut fa = Self::new(boxes, dm, ncomp, rank)?;
        for (&k, fab) in fa.fabs.iter_mut() {
            f(k, fab);
        }
        Ok(fa)
    }

    #[inline]
    pub fn box_array(&self) -> &BoxArray<D> {
        &self.boxes
    }

    #[inline]
    pub fn distribution_map(&self) -> &DistributionMapping {
        &self.dm
    }

    #[inline]
    pub fn n_comp(&self) -> usize {
        self.ncomp
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Global box `k` (known on every rank).
    pub fn index_box(&self, k: usize) -> Result<&IndexBox<D>, FluxRegisterError> {
        self.boxes.try_get(k)
    }

    #[inline]
    pub fn is_local(&self, k: usize) -> bool {
        self.fabs.contains_key(&k)
    }

    pub fn local_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.fabs.keys().copied()
    }

    /// Locally owned patch `k`.
    pub fn get(&self, k: usize) -> Result<&FArrayBox<D>, FluxRegisterError> {
        self.fabs
            .get(&k)
            .ok_or_else(|| not_local(&self.dm, self.rank, k))
    }

    pub fn get_mut(&mut self, k: usize) -> Result<&mut FArrayBox<D>, FluxRegisterError> {
        let Self { fabs, dm, rank, .. } = self;
        fabs.get_mut(&k).ok_or_else(|| not_local(dm, *rank, k))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FArrayBox<D>)> {
        self.fabs.iter().map(|(&k, f)| (k, f))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut FArrayBox<D>)> {
        self.fabs.iter_mut().map(|(&k, f)| (k, f))
    }

    pub fn set_val(&mut self, v: Real) {
        for fab in self.fabs.values_mut() {
            fab.set_val(v);
        }
    }
}

fn not_local(dm: &DistributionMapping, rank: usize, k: usize) -> FluxRegisterError {
    match dm.owner(k) {
        Some(owner) => FluxRegisterError::OwnershipMismatch {
            index: k,
            owner,
            rank,
        },
        None => FluxRegisterError::BoxIndexOutOfRange {
            index: k,
            len: dm.len(),
        },
    }
}
