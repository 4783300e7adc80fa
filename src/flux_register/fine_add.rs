//! Fine-flux accumulation. Always local: register box `k` lives with fine
//! box `k`.

use crate::Real;
use crate::data::fab::{FArrayBox, check_components, check_contains};
use crate::data::fab_array::MultiFab;
use crate::flux_error::FluxRegisterError;
use crate::geometry::Orientation;
use crate::kernels;

use super::{FluxRegister, check_dir, check_face_type};

impl<const D: usize> FluxRegister<D> {
    /// Add `mult` times the fine fluxes of fine box `box_index` (node
    /// centred along `dir`) to both register faces of axis `dir`, summing
    /// the fine faces that cover each coarse face.
    #[allow(clippy::too_many_arguments)]
    pub fn fine_add(
        &mut self,
        flux: &FArrayBox<D>,
        dir: usize,
        box_index: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        self.fine_add_with(flux, None, dir, box_index, src_comp, dest_comp, ncomp, mult)
    }

    /// As [`fine_add`](Self::fine_add), weighting each fine face by `area`.
    #[allow(clippy::too_many_arguments)]
    pub fn fine_area_add(
        &mut self,
        flux: &FArrayBox<D>,
        area: &FArrayBox<D>,
        dir: usize,
        box_index: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        self.fine_add_with(flux, Some(area), dir, box_index, src_comp, dest_comp, ncomp, mult)
    }

    /// [`fine_add`](Self::fine_add) for every local patch of `mflx`.
    pub fn fine_add_all(
        &mut self,
        mflx: &MultiFab<D>,
        dir: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        for (k, flux) in mflx.iter() {
            self.fine_add(flux, dir, k, src_comp, dest_comp, ncomp, mult)?;
        }
        Ok(())
    }

    /// [`fine_area_add`](Self::fine_area_add) for every local patch of
    /// `mflx`, with the matching patch of `area`.
    #[allow(clippy::too_many_arguments)]
    pub fn fine_area_add_all(
        &mut self,
        mflx: &MultiFab<D>,
        area: &MultiFab<D>,
        dir: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        for (k, flux) in mflx.iter() {
            self.fine_area_add(flux, area.get(k)?, dir, k, src_comp, dest_comp, ncomp, mult)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn fine_add_with(
        &mut self,
        flux: &FArrayBox<D>,
        area: Option<&FArrayBox<D>>,
        dir: usize,
        box_index: usize,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        mult: Real,
    ) -> Result<(), FluxRegisterError> {
        self.ensure_defined()?;
        self.ensure_writable()?;
        check_dir::<D>(dir)?;
        check_face_type(dir, flux.index_box().index_type())?;
        check_components(src_comp, ncomp, flux.n_comp())?;
        check_components(dest_comp, ncomp, self.ncomp)?;
        self.grids.try_get(box_index)?;

        // both faces are checked before either is touched
        let ratio = self.ratio;
        let cbox = flux.index_box().coarsen(&ratio);
        let faces = [Orientation::low(dir), Orientation::high(dir)];
        for face in faces {
            let reg = self.bndry[face.index::<D>()].get(box_index)?;
            check_contains(&cbox, reg.index_box())?;
            let fine_faces = reg.index_box().refine(&ratio);
            check_contains(flux.index_box(), &fine_faces)?;
            if let Some(area) = area {
                check_components(0, 1, area.n_comp())?;
                check_contains(area.index_box(), &fine_faces)?;
            }
        }
        for face in faces {
            let reg = self.bndry[face.index::<D>()].get_mut(box_index)?;
            match area {
                Some(area) => kernels::fine_area_add(
                    reg, flux, area, dest_comp, src_comp, ncomp, dir, &ratio, mult,
                )?,
                None => kernels::fine_add(reg, flux, dest_comp, src_comp, ncomp, dir, &ratio, mult)?,
            }
        }
        log::trace!(
            "rank {}: fine_add axis {dir} box {box_index} mult {mult}",
            self.rank
        );
        Ok(())
    }
}
