//! Reflux: apply the accumulated face mismatch to the coarse solution.
//!
//! For every local solution box and every register box whose one-cell halo
//! touches it, each face of the register box contributes to the exterior
//! coarse cells adjacent to that face. On periodic domains the solution box
//! is also tried at its periodic images; an image is reached through a
//! translated view of the solution patch, never by moving the patch itself.
//! Register data is fetched from its owner in one batched round.

use crate::Real;
use crate::algs::communicator::Communicator;
use crate::algs::copy_descriptor::{CopyDescriptor, FetchId};
use crate::data::fab::check_components;
use crate::data::fab_array::MultiFab;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{Geometry, IndexBox, IndexType, IntVect, Orientation};
use crate::kernels::{self, face_region};

use super::FluxRegister;

/// How a correction is normalised.
#[derive(Copy, Clone)]
enum Weights<'a, const D: usize> {
    /// Divide by the cell volume of the corrected cell.
    Volume(&'a MultiFab<D>),
    /// Divide by the cell size along the face normal.
    CellSize([Real; D]),
}

/// One correction: exterior cells `region` (in image coordinates) of
/// register `face`, applied to solution box `state_index` seen through
/// `shift`.
#[derive(Debug)]
struct RefluxPatch<const D: usize> {
    fetch: FetchId,
    state_index: usize,
    face: Orientation,
    shift: IntVect<D>,
    region: IndexBox<D>,
}

impl<const D: usize> FluxRegister<D> {
    /// Finite-volume reflux: `state += s * reg / volume` on the coarse cells
    /// adjacent to the register, with `s = -scale` for low faces and
    /// `+scale` for high faces. `volume` is indexed like `state`. Collective.
    #[allow(clippy::too_many_arguments)]
    pub fn reflux_volume<C>(
        &self,
        state: &mut MultiFab<D>,
        volume: &MultiFab<D>,
        scale: Real,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        geom: &Geometry<D>,
        comm: &C,
    ) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        if volume.len() != state.len() {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: state.len(),
                found: volume.len(),
            });
        }
        check_components(0, 1, volume.n_comp())?;
        self.reflux_with(
            state,
            Weights::Volume(volume),
            scale,
            src_comp,
            dest_comp,
            ncomp,
            geom,
            comm,
        )
    }

    /// Cartesian reflux: as [`reflux_volume`](Self::reflux_volume) but
    /// dividing by the coarse cell size along the face normal.
    #[allow(clippy::too_many_arguments)]
    pub fn reflux_cartesian<C>(
        &self,
        state: &mut MultiFab<D>,
        scale: Real,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        geom: &Geometry<D>,
        comm: &C,
    ) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        self.reflux_with(
            state,
            Weights::CellSize(*geom.cell_size()),
            scale,
            src_comp,
            dest_comp,
            ncomp,
            geom,
            comm,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn reflux_with<C>(
        &self,
        state: &mut MultiFab<D>,
        weights: Weights<'_, D>,
        scale: Real,
        src_comp: usize,
        dest_comp: usize,
        ncomp: usize,
        geom: &Geometry<D>,
        comm: &C,
    ) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        self.ensure_defined()?;
        self.ensure_idle()?;
        check_components(src_comp, ncomp, self.ncomp)?;
        check_components(dest_comp, ncomp, state.n_comp())?;
        if state.box_array().index_type() != IndexType::cell() {
            return Err(FluxRegisterError::IndexTypeMismatch {
                expected: IndexType::cell().to_string(),
                found: state.box_array().index_type().to_string(),
            });
        }

        let mut cd = CopyDescriptor::new();
        let sources: Vec<_> = self.bndry.iter().map(|fs| cd.register(fs)).collect();
        let periodic = geom.is_any_periodic();
        let mut work = Vec::new();

        for s in state.local_indices() {
            let vbox = *state.index_box(s)?;
            for (k, g) in self.grids.iter().enumerate() {
                let grown = g.grow(1);
                let mut shifts = Vec::new();
                if grown.intersects(&vbox) {
                    shifts.push(IntVect::zero());
                }
                if periodic && !geom.domain().contains(&grown) {
                    shifts.extend(geom.periodic_shifts(&grown, &vbox));
                }
                for shift in shifts {
                    let image = vbox.shift(shift);
                    for face in Orientation::all::<D>() {
                        let region = g.adj_cell(face) & image;
                        if region.is_empty() {
                            continue;
                        }
                        let fetch = cd.add_box(
                            sources[face.index::<D>()],
                            face_region(&region, face),
                            k,
                            src_comp,
                            ncomp,
                        )?;
                        work.push(RefluxPatch {
                            fetch,
                            state_index: s,
                            face,
                            shift,
                            region,
                        });
                    }
                }
            }
        }

        cd.collect(comm, self.tags.fetch)?;
        log::debug!(
            "rank {}: reflux applies {} patches ({} through periodic images)",
            self.rank,
            work.len(),
            work.iter().filter(|p| !p.shift.is_zero()).count()
        );

        for p in &work {
            let reg = cd.fill(p.fetch)?;
            let mult = if p.face.is_low() { -scale } else { scale };
            let mut dst = state.get_mut(p.state_index)?.shifted_mut(p.shift);
            match weights {
                Weights::Volume(volume) => {
                    let vol = volume.get(p.state_index)?.shifted(p.shift);
                    kernels::reflux_volume(&mut dst, &vol, reg, &p.region, p.face, dest_comp, ncomp, mult)?;
                }
                Weights::CellSize(dx) => {
                    kernels::reflux_cartesian(&mut dst, &dx, reg, &p.region, p.face, dest_comp, ncomp, mult)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::distribution::DistributionMapping;
    use crate::data::fab::FArrayBox;
    use crate::data::fab_array::FabArray;
    use crate::geometry::BoxArray;

    fn coarse_state(value: Real) -> MultiFab<2> {
        let ba = BoxArray::new(vec![IndexBox::from_corners([0, 0], [15, 15])]);
        FabArray::from_fn(ba, DistributionMapping::single(1, 0), 1, 0, |_, f| f.set_val(value)).unwrap()
    }

    fn x_faces(x: i64, ylo: i64, yhi: i64) -> IndexBox<2> {
        IndexBox::with_type(IntVect([x, ylo]), IntVect([x, yhi]), IndexType::face(0))
    }

    #[test]
    fn unit_flux_sign_convention() {
        let fine = BoxArray::new(vec![IndexBox::from_corners([8, 8], [23, 23])]);
        let geom = Geometry::non_periodic(IndexBox::from_corners([0, 0], [15, 15]));
        let dm = DistributionMapping::single(1, 0);

        for (face, x, cell, delta) in [
            (Orientation::low(0), 4, [3, 5], -1.0),
            (Orientation::high(0), 12, [12, 5], 1.0),
        ] {
            let mut fr = FluxRegister::with_grids(&fine, IntVect::splat(2), 1, 1, &dm, 0).unwrap();
            let flux = FArrayBox::filled(x_faces(x, 5, 5), 1, 1.0);
            fr.crse_init(&flux, &x_faces(x, 5, 5), 0, 0, 0, 1, 1.0).unwrap();
            fr.crse_init_finish(&NoComm).unwrap();
            let mut state = coarse_state(10.0);
            let vol = coarse_state(1.0);
            fr.reflux_volume(&mut state, &vol, 1.0, 0, 0, 1, &geom, &NoComm).unwrap();
            let fab = state.get(0).unwrap();
            assert_eq!(fab.get(&IntVect(cell), 0), 10.0 + delta, "{face}");
            assert_eq!(fab.sum(0), 256.0 * 10.0 + delta);
        }
    }

    #[test]
    fn reflux_refuses_an_open_cycle() {
        let fine = BoxArray::new(vec![IndexBox::from_corners([8, 8], [23, 23])]);
        let geom = Geometry::non_periodic(IndexBox::from_corners([0, 0], [15, 15]));
        let mut fr =
            FluxRegister::with_grids(&fine, IntVect::splat(2), 1, 1, &DistributionMapping::single(1, 0), 0)
                .unwrap();
        let flux = FArrayBox::filled(x_faces(4, 4, 11), 1, 1.0);
        fr.crse_init(&flux, &x_faces(4, 4, 11), 0, 0, 0, 1, 1.0).unwrap();
        let mut state = coarse_state(0.0);
        let err = fr
            .reflux_cartesian(&mut state, 1.0, 0, 0, 1, &geom, &NoComm)
            .unwrap_err();
        assert_eq!(err, FluxRegisterError::CycleOpen("accumulating"));
        assert!(state.get(0).unwrap().as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn cartesian_divides_by_normal_cell_size() {
        let fine = BoxArray::new(vec![IndexBox::from_corners([8, 8], [23, 23])]);
        let geom = Geometry::new(IndexBox::from_corners([0, 0], [15, 15]), [false, false], [0.5, 0.25]);
        let mut fr =
            FluxRegister::with_grids(&fine, IntVect::splat(2), 1, 1, &DistributionMapping::single(1, 0), 0)
                .unwrap();
        let y = IndexBox::with_type(IntVect([6, 12]), IntVect([6, 12]), IndexType::face(1));
        fr.crse_init(&FArrayBox::filled(y, 1, 1.0), &y, 1, 0, 0, 1, 1.0).unwrap();
        fr.crse_init_finish(&NoComm).unwrap();
        let mut state = coarse_state(0.0);
        fr.reflux_cartesian(&mut state, 2.0, 0, 0, 1, &geom, &NoComm).unwrap();
        // high y face: +scale / dy
        assert_eq!(state.get(0).unwrap().get(&IntVect([6, 12]), 0), 8.0);
    }
}
