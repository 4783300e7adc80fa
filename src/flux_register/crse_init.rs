//! Coarse-flux injection.

use crate::Real;
use crate::algs::communicator::Communicator;
use crate::algs::copy_descriptor::{CopyDescriptor, FetchId};
use crate::data::fab::{FArrayBox, check_components, check_contains};
use crate::data::fab_array::MultiFab;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{IndexBox, Orientation};
use crate::kernels;

use super::pending::PendingContribution;
use super::{CycleState, FluxRegister, check_dir, check_face_type};

/// One `crse_init_area` target: region of register box `box_index` on
/// `face`, with its fetched flux and area.
struct AreaInit<const D: usize> {
    face: Orientation,
    box_index: usize,
    region: IndexBox<D>,
    flux: FetchId,
    area: FetchId,
}

impl<const D: usize> FluxRegister<D> {
    /// Overwrite the register faces of axis `dir` that lie in `subbox` with
    /// `mult * flux`.
    ///
    /// `flux` holds coarse fluxes node centred along `dir` and must contain
    /// `subbox`. Faces of boxes owned here are written immediately; faces of
    /// boxes owned by another rank are buffered and written on the owner by
    /// [`crse_init_finish`](Self::crse_init_finish). Opens an accumulation
    /// cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn crse_init(
        &mut self,
        flux: &FArrayBox<D>,
        subbox: &IndexBox<D>,
        dir: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        self.ensure_defined()?;
        self.ensure_writable()?;
        check_dir::<D>(dir)?;
        check_face_type(dir, subbox.index_type())?;
        check_components(src_comp, ncomp, flux.n_comp())?;
        check_components(dest_comp, ncomp, self.ncomp)?;
        check_contains(flux.index_box(), subbox)?;

        let rank = self.rank;
        let mut touched = 0usize;
        for face in [Orientation::low(dir), Orientation::high(dir)] {
            let fs = &mut self.bndry[face.index::<D>()];
            for k in 0..fs.len() {
                let region = *fs.index_box(k)? & *subbox;
                if region.is_empty() {
                    continue;
                }
                touched += 1;
                let owner = fs.distribution_map().try_owner(k)?;
                if owner == rank {
                    let fab = fs.get_mut(k)?;
                    fab.copy_from(flux, &region, src_comp, dest_comp, ncomp)?;
                    fab.scale(mult, &region, dest_comp, ncomp)?;
                    log::trace!("rank {rank}: crse_init {face} box {k} {region} local");
                } else {
                    let mut data = flux.extract(&region, src_comp, ncomp)?;
                    for v in &mut data {
                        *v *= mult;
                    }
                    log::trace!("rank {rank}: crse_init {face} box {k} {region} buffered for rank {owner}");
                    self.pending.push(PendingContribution {
                        dest: owner,
                        box_index: k,
                        face,
                        region,
                        dest_comp,
                        ncomp,
                        data,
                    });
                }
            }
        }
        if touched == 0 {
            log::warn!("rank {rank}: crse_init over {subbox} touches no register face");
        }
        if self.cycle == CycleState::Idle {
            self.cycle = CycleState::Accumulating;
        }
        Ok(())
    }

    /// Area-weighted coarse injection from distributed arrays: every locally
    /// owned register face of axis `dir` covered by a box of `mflx` is set
    /// to `mult * flux * area`.
    ///
    /// `mflx` and `area` are indexed alike (node centred along `dir`); their
    /// patches may live on any rank and are fetched as needed, so this call
    /// is collective. It writes only local faces and leaves the cycle state
    /// unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn crse_init_area<C>(
        &mut self,
        mflx: &MultiFab<D>,
        area: &MultiFab<D>,
        dir: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
        comm: &C,
    ) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        self.ensure_defined()?;
        self.ensure_writable()?;
        check_dir::<D>(dir)?;
        check_face_type(dir, mflx.box_array().index_type())?;
        if area.len() != mflx.len() {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: mflx.len(),
                found: area.len(),
            });
        }
        check_components(src_comp, ncomp, mflx.n_comp())?;
        check_components(0, 1, area.n_comp())?;
        check_components(dest_comp, ncomp, self.ncomp)?;

        let mut cd = CopyDescriptor::new();
        let flux_src = cd.register(mflx);
        let area_src = cd.register(area);
        let mut work = Vec::new();
        for face in [Orientation::low(dir), Orientation::high(dir)] {
            let fs = &self.bndry[face.index::<D>()];
            for k in fs.local_indices() {
                let faces = *fs.index_box(k)?;
                for j in mflx.box_array().intersecting(&faces) {
                    let region = faces & mflx.box_array()[j];
                    work.push(AreaInit {
                        face,
                        box_index: k,
                        region,
                        flux: cd.add_box(flux_src, region, j, src_comp, ncomp)?,
                        area: cd.add_box(area_src, region, j, 0, 1)?,
                    });
                }
            }
        }
        cd.collect(comm, self.tags.fetch)?;
        log::debug!(
            "rank {}: crse_init_area on axis {dir} sets {} face patches",
            self.rank,
            work.len()
        );

        for w in work {
            let reg = self.bndry[w.face.index::<D>()].get_mut(w.box_index)?;
            kernels::crse_area_init(
                reg,
                cd.fill(w.flux)?,
                cd.fill(w.area)?,
                &w.region,
                dest_comp,
                0,
                ncomp,
                mult,
            )?;
        }
        Ok(())
    }
}
