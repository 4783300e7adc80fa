//! FluxRegister: the coarse/fine flux-mismatch accumulator.
//!
//! A register is built from the box list of a fine level. For every coarsened
//! fine box and every face orientation it stores one layer of coarse faces
//! (the Face Storage). Over one coarse step:
//!
//! 1. coarse fluxes are injected with [`crse_init`](FluxRegister::crse_init)
//!    (or [`crse_init_area`](FluxRegister::crse_init_area)), buffering writes
//!    to boxes owned by other ranks;
//! 2. [`crse_init_finish`](FluxRegister::crse_init_finish) ships the
//!    buffered writes to their owners (collective);
//! 3. fine fluxes of every sub-step are added with
//!    [`fine_add`](FluxRegister::fine_add) and friends (always local);
//! 4. [`reflux_volume`](FluxRegister::reflux_volume) or
//!    [`reflux_cartesian`](FluxRegister::reflux_cartesian) applies the
//!    difference to the coarse solution (collective).
//!
//! Steps 1 and 3 may be interleaved freely, but no read of the Face Storage
//! is valid while an accumulation cycle is open; see [`CycleState`].

mod consolidate;
mod crse_init;
mod fine_add;
mod pending;
mod reflux;

use core::fmt;

use crate::Real;
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::copy_descriptor::FetchTags;
use crate::algs::reduction::all_reduce_sum;
use crate::data::distribution::DistributionMapping;
use crate::data::fab::{FArrayBox, check_components};
use crate::data::fab_array::FabSet;
use crate::debug_invariants::DebugInvariants;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{BoxArray, IndexType, IntVect, Orientation};

use pending::PendingBuffer;

/// Where a register stands in its accumulation cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// No contribution is in flight; Face Storage may be read.
    #[default]
    Idle,
    /// `crse_init` has run since the last consolidation.
    Accumulating,
    /// A consolidation is running, or failed part-way.
    Consolidating,
}

impl CycleState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::Accumulating => "accumulating",
            CycleState::Consolidating => "consolidating",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Communication tags for the register's collective operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FluxRegisterTags {
    /// Consolidation of buffered `crse_init` contributions.
    pub consolidate: ExchangeTags,
    /// Remote fetches of `crse_init_area` and reflux.
    pub fetch: FetchTags,
    /// Global sum of `sum_reg`.
    pub reduce: CommTag,
}

impl FluxRegisterTags {
    /// Construct tags from a base, assigning deterministic offsets per phase.
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            consolidate: ExchangeTags::from_base(base),
            fetch: FetchTags::from_base(base.offset(3)),
            reduce: base.offset(9),
        }
    }
}

impl Default for FluxRegisterTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0xF1A0))
    }
}

/// Face-flux accumulator for one coarse/fine interface.
#[derive(Clone, Debug)]
pub struct FluxRegister<const D: usize> {
    grids: BoxArray<D>,
    ratio: IntVect<D>,
    fine_level: usize,
    ncomp: usize,
    rank: usize,
    /// Face Storage, indexed by [`Orientation::index`].
    bndry: Vec<FabSet<D>>,
    pending: PendingBuffer<D>,
    cycle: CycleState,
    tags: FluxRegisterTags,
}

impl<const D: usize> Default for FluxRegister<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> FluxRegister<D> {
    /// An undefined register; call [`define`](Self::define) before use.
    pub fn new() -> Self {
        Self {
            grids: BoxArray::default(),
            ratio: IntVect::splat(1),
            fine_level: 0,
            ncomp: 0,
            rank: 0,
            bndry: Vec::new(),
            pending: PendingBuffer::default(),
            cycle: CycleState::Idle,
            tags: FluxRegisterTags::default(),
        }
    }

    /// Construct and [`define`](Self::define) in one step.
    pub fn with_grids(
        fine_boxes: &BoxArray<D>,
        ratio: IntVect<D>,
        fine_level: usize,
        ncomp: usize,
        dm: &DistributionMapping,
        my_rank: usize,
    ) -> Result<Self, FluxRegisterError> {
        let mut fr = Self::new();
        fr.define(fine_boxes, ratio, fine_level, ncomp, dm, my_rank)?;
        Ok(fr)
    }

    /// Replace the communication tags (e.g. to run two registers side by
    /// side on one communicator).
    pub fn with_tags(mut self, tags: FluxRegisterTags) -> Self {
        self.tags = tags;
        self
    }

    /// Build the Face Storage from the fine level's boxes.
    ///
    /// `dm` is the fine level's distribution: register box `k` lives on the
    /// rank that owns fine box `k`, so fine fluxes are always added locally.
    /// All checks run before anything is allocated.
    pub fn define(
        &mut self,
        fine_boxes: &BoxArray<D>,
        ratio: IntVect<D>,
        fine_level: usize,
        ncomp: usize,
        dm: &DistributionMapping,
        my_rank: usize,
    ) -> Result<(), FluxRegisterError> {
        if self.is_defined() {
            return Err(FluxRegisterError::AlreadyDefined);
        }
        if (0..D).any(|d| ratio[d] < 1) {
            return Err(FluxRegisterError::InvalidRatio(ratio.to_string()));
        }
        if ncomp == 0 {
            return Err(FluxRegisterError::ComponentRange {
                start: 0,
                count: 1,
                available: 0,
            });
        }
        if fine_boxes.index_type() != IndexType::cell() {
            return Err(FluxRegisterError::IndexTypeMismatch {
                expected: IndexType::cell().to_string(),
                found: fine_boxes.index_type().to_string(),
            });
        }
        fine_boxes.validate_invariants()?;
        if let Some((first, second)) = fine_boxes.first_overlap() {
            return Err(FluxRegisterError::OverlappingBoxes { first, second });
        }
        if dm.len() != fine_boxes.len() {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: fine_boxes.len(),
                found: dm.len(),
            });
        }
        if let Some(b) = fine_boxes
            .iter()
            .find(|b| b.coarsen(&ratio).refine(&ratio) != **b)
        {
            return Err(FluxRegisterError::InvalidRatio(format!(
                "{ratio} does not evenly coarsen fine box {b}"
            )));
        }

        let grids = fine_boxes.coarsen(&ratio);
        let mut bndry = Vec::with_capacity(2 * D);
        for face in Orientation::all::<D>() {
            let faces = BoxArray::new(grids.iter().map(|g| g.face_box(face)).collect());
            bndry.push(FabSet::new(faces, dm.clone(), ncomp, my_rank)?);
        }

        self.grids = grids;
        self.ratio = ratio;
        self.fine_level = fine_level;
        self.ncomp = ncomp;
        self.rank = my_rank;
        self.bndry = bndry;
        self.pending = PendingBuffer::default();
        self.cycle = CycleState::Idle;

        log::debug!(
            "rank {my_rank}: flux register for level {fine_level} defined over {} boxes, ratio {ratio}, {ncomp} comps ({} local)",
            self.grids.len(),
            self.bndry[0].local_indices().count()
        );
        self.debug_assert_invariants();
        Ok(())
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        !self.bndry.is_empty()
    }

    /// Coarsened fine boxes.
    #[inline]
    pub fn grids(&self) -> &BoxArray<D> {
        &self.grids
    }

    #[inline]
    pub fn ratio(&self) -> IntVect<D> {
        self.ratio
    }

    #[inline]
    pub fn fine_level(&self) -> usize {
        self.fine_level
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
    pub fn tags(&self) -> FluxRegisterTags {
        self.tags
    }

    #[inline]
    pub fn cycle_state(&self) -> CycleState {
        self.cycle
    }

    /// Number of contributions waiting for `crse_init_finish`.
    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Face Storage of one orientation.
    pub fn face(&self, face: Orientation) -> Result<&FabSet<D>, FluxRegisterError> {
        self.ensure_defined()?;
        check_dir::<D>(face.axis())?;
        Ok(&self.bndry[face.index::<D>()])
    }

    /// Reset every local Face Storage entry to `v`.
    pub fn set_val(&mut self, v: Real) -> Result<(), FluxRegisterError> {
        self.ensure_defined()?;
        self.ensure_idle()?;
        for fs in &mut self.bndry {
            fs.set_val(v);
        }
        Ok(())
    }

    /// Copy the locally stored low and high faces of axis `dir` into `flx`
    /// (a patch node centred along `dir`) wherever they overlap it.
    pub fn copy_to(
        &self,
        flx: &mut FArrayBox<D>,
        dir: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
    ) -> Result<(), FluxRegisterError> {
        self.ensure_defined()?;
        self.ensure_idle()?;
        check_dir::<D>(dir)?;
        check_face_type(dir, flx.index_box().index_type())?;
        check_components(src_comp, ncomp, self.ncomp)?;
        check_components(dest_comp, ncomp, flx.n_comp())?;
        let target = *flx.index_box();
        for face in [Orientation::low(dir), Orientation::high(dir)] {
            for (_, fab) in self.bndry[face.index::<D>()].iter() {
                let region = *fab.index_box() & target;
                if !region.is_empty() {
                    flx.copy_from(fab, &region, src_comp, dest_comp, ncomp)?;
                }
            }
        }
        Ok(())
    }

    /// Global sum over all boxes and axes of (low faces - high faces) for
    /// component `comp`. Collective; the result is identical on every rank.
    pub fn sum_reg<C>(&self, comp: usize, comm: &C) -> Result<Real, FluxRegisterError>
    where
        C: Communicator,
    {
        self.ensure_defined()?;
        self.ensure_idle()?;
        check_components(comp, 1, self.ncomp)?;
        let local = self.local_sum(comp)?;
        log::trace!("rank {}: local register sum {local}", self.rank);
        all_reduce_sum(local, comm, self.tags.reduce)
    }

    /// Per-box (low - high) sums, added in box order.
    fn local_sum(&self, comp: usize) -> Result<Real, FluxRegisterError> {
        let per_box = |k: usize| -> Result<Real, FluxRegisterError> {
            let mut s = 0.0;
            for d in 0..D {
                let lo = self.bndry[Orientation::low(d).index::<D>()].get(k)?;
                let hi = self.bndry[Orientation::high(d).index::<D>()].get(k)?;
                s += lo.sum(comp) - hi.sum(comp);
            }
            Ok(s)
        };
        let local: Vec<usize> = self.bndry[0].local_indices().collect();

        #[cfg(feature = "rayon")]
        let parts: Vec<Real> = {
            use rayon::prelude::*;
            local
                .par_iter()
                .map(|&k| per_box(k))
                .collect::<Result<_, _>>()?
        };
        #[cfg(not(feature = "rayon"))]
        let parts: Vec<Real> = local
            .iter()
            .map(|&k| per_box(k))
            .collect::<Result<_, _>>()?;

        Ok(parts.into_iter().sum())
    }

    pub(crate) fn ensure_defined(&self) -> Result<(), FluxRegisterError> {
        if self.is_defined() {
            Ok(())
        } else {
            Err(FluxRegisterError::NotDefined)
        }
    }

    /// Face Storage reads need a closed cycle.
    pub(crate) fn ensure_idle(&self) -> Result<(), FluxRegisterError> {
        match self.cycle {
            CycleState::Idle => Ok(()),
            other => Err(FluxRegisterError::CycleOpen(other.as_str())),
        }
    }

    /// Accumulation is refused after a failed consolidation.
    pub(crate) fn ensure_writable(&self) -> Result<(), FluxRegisterError> {
        match self.cycle {
            CycleState::Consolidating => Err(FluxRegisterError::CycleOpen(self.cycle.as_str())),
            _ => Ok(()),
        }
    }
}

pub(crate) fn check_dir<const D: usize>(dir: usize) -> Result<(), FluxRegisterError> {
    if dir < D {
        Ok(())
    } else {
        Err(FluxRegisterError::InvalidAxis { axis: dir, dim: D })
    }
}

/// `found` must be the centering of axis-`dir` fluxes.
pub(crate) fn check_face_type(dir: usize, found: IndexType) -> Result<(), FluxRegisterError> {
    let expected = IndexType::face(dir);
    if found == expected {
        Ok(())
    } else {
        Err(FluxRegisterError::IndexTypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

impl<const D: usize> DebugInvariants for FluxRegister<D> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "FluxRegister");
    }

    fn validate_invariants(&self) -> Result<(), FluxRegisterError> {
        if !self.is_defined() {
            return Ok(());
        }
        if self.bndry.len() != 2 * D {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: 2 * D,
                found: self.bndry.len(),
            });
        }
        if let Some((first, second)) = self.grids.first_overlap() {
            return Err(FluxRegisterError::OverlappingBoxes { first, second });
        }
        for face in Orientation::all::<D>() {
            let fs = &self.bndry[face.index::<D>()];
            for (k, g) in self.grids.iter().enumerate() {
                let expected = g.face_box(face);
                let found = fs.index_box(k)?;
                if *found != expected {
                    return Err(FluxRegisterError::RegionNotContained {
                        region: found.to_string(),
                        container: expected.to_string(),
                    });
                }
            }
        }
        if self.cycle == CycleState::Idle && !self.pending.is_empty() {
            return Err(FluxRegisterError::ProtocolViolation {
                neighbor: self.rank,
                reason: format!("{} contributions pending in an idle cycle", self.pending.len()),
            });
        }
        if let Some(p) = self.pending.iter().find(|p| p.dest == self.rank) {
            return Err(FluxRegisterError::ProtocolViolation {
                neighbor: self.rank,
                reason: format!("contribution to local box {} was buffered", p.box_index),
            });
        }
        Ok(())
    }
}
