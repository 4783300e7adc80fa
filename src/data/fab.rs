//! FArrayBox: a dense, multi-component patch of `Real` values over an
//! [`IndexBox`], plus translated read/write views.
//!
//! Storage is axis 0 fastest, component slowest. The translated views
//! ([`FabView`], [`FabViewMut`]) present the same data at shifted indices,
//! which is how periodic images are addressed without moving the patch.

use crate::Real;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{IndexBox, IntVect};

/// Check that `[start, start + count)` fits in `available` components.
#[inline]
pub(crate) fn check_components(
    start: usize,
    count: usize,
    available: usize,
) -> Result<(), FluxRegisterError> {
    if start.checked_add(count).is_some_and(|end| end <= available) {
        Ok(())
    } else {
        Err(FluxRegisterError::ComponentRange {
            start,
            count,
            available,
        })
    }
}

/// Check that `region` lies inside `container` (same centering).
#[inline]
pub(crate) fn check_contains<const D: usize>(
    container: &IndexBox<D>,
    region: &IndexBox<D>,
) -> Result<(), FluxRegisterError> {
    if region.is_empty() || container.contains(region) {
        Ok(())
    } else {
        Err(FluxRegisterError::RegionNotContained {
            region: region.to_string(),
            container: container.to_string(),
        })
    }
}

/// Dense multi-component patch.
#[derive(Clone, Debug, PartialEq)]
pub struct FArrayBox<const D: usize> {
    bx: IndexBox<D>,
    ncomp: usize,
    data: Vec<Real>,
}

impl<const D: usize> FArrayBox<D> {
    /// Zero-filled patch.
    pub fn new(bx: IndexBox<D>, ncomp: usize) -> Self {
        Self::filled(bx, ncomp, 0.0)
    }

    pub fn filled(bx: IndexBox<D>, ncomp: usize, value: Real) -> Self {
        Self {
            bx,
            ncomp,
            data: vec![value; bx.num_pts() * ncomp],
        }
    }

    pub fn from_fn<F>(bx: IndexBox<D>, ncomp: usize, f: F) -> Self
    where
        F: Fn(IntVect<D>, usize) -> Real,
    {
        let mut fab = Self::new(bx, ncomp);
        for n in 0..ncomp {
            for p in bx.iter() {
                let i = fab.idx(&p, n);
                fab.data[i] = f(p, n);
            }
        }
        fab
    }

    /// Rebuild a patch from values packed by [`extract`](Self::extract).
    pub fn from_packed(
        bx: IndexBox<D>,
        ncomp: usize,
        data: Vec<Real>,
    ) -> Result<Self, FluxRegisterError> {
        let expected = bx.num_pts() * ncomp;
        if data.len() != expected {
            return Err(FluxRegisterError::DimensionMismatch {
                expected,
                found: data.len(),
            });
        }
        Ok(Self { bx, ncomp, data })
    }

    #[inline]
    pub fn index_box(&self) -> &IndexBox<D> {
        &self.bx
    }

    #[inline]
    pub fn n_comp(&self) -> usize {
        self.ncomp
    }

    #[inline]
    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Real] {
        &mut self.data
    }

    #[inline]
    fn idx(&self, p: &IntVect<D>, comp: usize) -> usize {
        debug_assert!(self.bx.contains_point(p), "{p} outside {}", self.bx);
        debug_assert!(comp < self.ncomp);
        comp * self.bx.num_pts() + self.bx.offset(p)
    }

    #[inline]
    pub fn get(&self, p: &IntVect<D>, comp: usize) -> Real {
        self.data[self.idx(p, comp)]
    }

    pub fn try_get(&self, p: &IntVect<D>, comp: usize) -> Option<Real> {
        (self.bx.contains_point(p) && comp < self.ncomp).then(|| self.get(p, comp))
    }

    #[inline]
    pub fn set(&mut self, p: &IntVect<D>, comp: usize, v: Real) {
        let i = self.idx(p, comp);
        self.data[i] = v;
    }

    #[inline]
    pub fn add(&mut self, p: &IntVect<D>, comp: usize, v: Real) {
        let i = self.idx(p, comp);
        self.data[i] += v;
    }

    pub fn set_val(&mut self, v: Real) {
        self.data.fill(v);
    }

    /// Copy `ncomp` components of `src` over `region` (overwriting).
    pub fn copy_from(
        &mut self,
        src: &FArrayBox<D>,
        region: &IndexBox<D>,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
    ) -> Result<(), FluxRegisterError> {
        check_components(src_comp, ncomp, src.ncomp)?;
        check_components(dest_comp, ncomp, self.ncomp)?;
        check_contains(&src.bx, region)?;
        check_contains(&self.bx, region)?;
        for n in 0..ncomp {
            for p in region.iter() {
                let v = src.get(&p, src_comp + n);
                self.set(&p, dest_comp + n, v);
            }
        }
        Ok(())
    }

    /// Multiply `ncomp` components over `region` by `mult`.
    pub fn scale(
        &mut self,
        mult: Real,
        region: &IndexBox<D>,
        comp: usize,
        ncomp: usize,
    ) -> Result<(), FluxRegisterError> {
        check_components(comp, ncomp, self.ncomp)?;
        check_contains(&self.bx, region)?;
        for n in 0..ncomp {
            for p in region.iter() {
                let i = self.idx(&p, comp + n);
                self.data[i] *= mult;
            }
        }
        Ok(())
    }

    /// Sum of one component over the whole patch.
    pub fn sum(&self, comp: usize) -> Real {
        if comp >= self.ncomp {
            return 0.0;
        }
        let npts = self.bx.num_pts();
        self.data[comp * npts..(comp + 1) * npts].iter().sum()
    }

    /// Pack `ncomp` components over `region`, component-major.
    pub fn extract(
        &self,
        region: &IndexBox<D>,
        comp: usize,
        ncomp: usize,
    ) -> Result<Vec<Real>, FluxRegisterError> {
        check_components(comp, ncomp, self.ncomp)?;
        check_contains(&self.bx, region)?;
        let mut out = Vec::with_capacity(region.num_pts() * ncomp);
        for n in 0..ncomp {
            out.extend(region.iter().map(|p| self.get(&p, comp + n)));
        }
        Ok(out)
    }

    /// Sub-patch over `region` holding components `[comp, comp + ncomp)`.
    pub fn sub_box(
        &self,
        region: &IndexBox<D>,
        comp: usize,
        ncomp: usize,
    ) -> Result<FArrayBox<D>, FluxRegisterError> {
        let data = self.extract(region, comp, ncomp)?;
        FArrayBox::from_packed(*region, ncomp, data)
    }

    /// Read-only view at the patch's own indices.
    #[inline]
    pub fn view(&self) -> FabView<'_, D> {
        self.shifted(IntVect::zero())
    }

    /// Read-only view whose index `p + shift` addresses stored index `p`.
    #[inline]
    pub fn shifted(&self, shift: IntVect<D>) -> FabView<'_, D> {
        FabView { fab: self, shift }
    }

    #[inline]
    pub fn view_mut(&mut self) -> FabViewMut<'_, D> {
        self.shifted_mut(IntVect::zero())
    }

    /// Writable view whose index `p + shift` addresses stored index `p`.
    #[inline]
    pub fn shifted_mut(&mut self, shift: IntVect<D>) -> FabViewMut<'_, D> {
        FabViewMut { fab: self, shift }
    }
}

/// Translated read-only accessor over a [`FArrayBox`].
#[derive(Copy, Clone, Debug)]
pub struct FabView<'a, const D: usize> {
    fab: &'a FArrayBox<D>,
    shift: IntVect<D>,
}

impl<const D: usize> FabView<'_, D> {
    /// The patch box as seen through this view.
    #[inline]
    pub fn index_box(&self) -> IndexBox<D> {
        self.fab.bx.shift(self.shift)
    }

    #[inline]
    pub fn n_comp(&self) -> usize {
        self.fab.ncomp
    }

    #[inline]
    pub fn get(&self, p: &IntVect<D>, comp: usize) -> Real {
        self.fab.get(&(*p - self.shift), comp)
    }
}

/// Translated writable accessor over a [`FArrayBox`].
#[derive(Debug)]
pub struct FabViewMut<'a, const D: usize> {
    fab: &'a mut FArrayBox<D>,
    shift: IntVect<D>,
}

impl<const D: usize> FabViewMut<'_, D> {
    #[inline]
    pub fn index_box(&self) -> IndexBox<D> {
        self.fab.bx.shift(self.shift)
    }

    #[inline]
    pub fn n_comp(&self) -> usize {
        self.fab.ncomp
    }

    #[inline]
    pub fn get(&self, p: &IntVect<D>, comp: usize) -> Real {
        self.fab.get(&(*p - self.shift), comp)
    }

    #[inline]
    pub fn add(&mut self, p: &IntVect<D>, comp: usize, v: Real) {
        self.fab.add(&(*p - self.shift), comp, v)
    }
}
