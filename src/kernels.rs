//! Per-cell arithmetic of the flux register.
//!
//! Pure functions over explicit index regions and typed patches/views. None
//! of them hold state; each validates its index ranges before touching data
//! and then runs a plain loop, component outermost.
//!
//! Index conventions (coarse level, `axis` = face normal):
//! - register faces are node centred along `axis`;
//! - the exterior cell `c` adjacent to a **low** register face reads the face
//!   `c + e_axis`, the one adjacent to a **high** face reads the face `c`;
//! - a coarse face `F` covers the fine faces `F * ratio + o`, where `o` ranges
//!   over `[0, ratio)` on the transverse axes and is zero along `axis`.

use crate::Real;
use crate::data::fab::{FArrayBox, FabView, FabViewMut, check_components, check_contains};
use crate::flux_error::FluxRegisterError;
use crate::geometry::{IndexBox, IndexType, IntVect, Orientation};

/// Faces read by reflux over the exterior cells `cells` of `face`.
pub fn face_region<const D: usize>(cells: &IndexBox<D>, face: Orientation) -> IndexBox<D> {
    let d = face.axis();
    let shift = if face.is_low() {
        IntVect::unit(d)
    } else {
        IntVect::zero()
    };
    IndexBox::with_type(cells.lo() + shift, cells.hi() + shift, IndexType::face(d))
}

fn check_axis<const D: usize>(axis: usize) -> Result<(), FluxRegisterError> {
    if axis < D {
        Ok(())
    } else {
        Err(FluxRegisterError::InvalidAxis { axis, dim: D })
    }
}

fn check_index_type<const D: usize>(
    expected: IndexType,
    bx: &IndexBox<D>,
) -> Result<(), FluxRegisterError> {
    if bx.index_type() == expected {
        Ok(())
    } else {
        Err(FluxRegisterError::IndexTypeMismatch {
            expected: expected.to_string(),
            found: bx.index_type().to_string(),
        })
    }
}

/// Validation shared by both reflux forms.
fn check_reflux<const D: usize>(
    dst: &FabViewMut<'_, D>,
    reg: &FArrayBox<D>,
    region: &IndexBox<D>,
    face: Orientation,
    dest_comp: usize,
    ncomp: usize,
) -> Result<(), FluxRegisterError> {
    check_axis::<D>(face.axis())?;
    check_index_type(IndexType::cell(), region)?;
    check_components(dest_comp, ncomp, dst.n_comp())?;
    check_components(0, ncomp, reg.n_comp())?;
    check_contains(&dst.index_box(), region)?;
    check_contains(reg.index_box(), &face_region(region, face))
}

/// Finite-volume reflux: `dst[c] += mult * reg[f(c)] / vol[c]` over the
/// exterior cells `region` of `face`. Register components start at 0.
#[allow(clippy::too_many_arguments)]
pub fn reflux_volume<const D: usize>(
    dst: &mut FabViewMut<'_, D>,
    vol: &FabView<'_, D>,
    reg: &FArrayBox<D>,
    region: &IndexBox<D>,
    face: Orientation,
    dest_comp: usize,
    ncomp: usize,
    mult: Real,
) -> Result<(), FluxRegisterError> {
    check_reflux(dst, reg, region, face, dest_comp, ncomp)?;
    check_contains(&vol.index_box(), region)?;
    let fshift = face_region(region, face).lo() - region.lo();
    for n in 0..ncomp {
        for c in region.iter() {
            let v = mult * reg.get(&(c + fshift), n) / vol.get(&c, 0);
            dst.add(&c, dest_comp + n, v);
        }
    }
    Ok(())
}

/// Cartesian reflux: `dst[c] += mult * reg[f(c)] / dx[axis]`.
#[allow(clippy::too_many_arguments)]
pub fn reflux_cartesian<const D: usize>(
    dst: &mut FabViewMut<'_, D>,
    dx: &[Real; D],
    reg: &FArrayBox<D>,
    region: &IndexBox<D>,
    face: Orientation,
    dest_comp: usize,
    ncomp: usize,
    mult: Real,
) -> Result<(), FluxRegisterError> {
    check_reflux(dst, reg, region, face, dest_comp, ncomp)?;
    let fshift = face_region(region, face).lo() - region.lo();
    let inv = mult / dx[face.axis()];
    for n in 0..ncomp {
        for c in region.iter() {
            dst.add(&c, dest_comp + n, inv * reg.get(&(c + fshift), n));
        }
    }
    Ok(())
}

/// Transverse fine-face offsets covered by one coarse face.
fn fine_offsets<const D: usize>(axis: usize, ratio: &IntVect<D>) -> IndexBox<D> {
    let mut hi = *ratio - IntVect::splat(1);
    hi[axis] = 0;
    IndexBox::new(IntVect::zero(), hi)
}

/// Coarse faces of `reg` that `fine` covers, after checking that every fine
/// face they need is present.
fn covered_faces<const D: usize>(
    reg: &FArrayBox<D>,
    fine: &IndexBox<D>,
    axis: usize,
    ratio: &IntVect<D>,
) -> Result<IndexBox<D>, FluxRegisterError> {
    check_axis::<D>(axis)?;
    check_index_type(IndexType::face(axis), reg.index_box())?;
    check_index_type(IndexType::face(axis), fine)?;
    let faces = *reg.index_box();
    check_contains(fine, &faces.refine(ratio))?;
    Ok(faces)
}

/// `reg[F] += mult * sum(flux[F*ratio + o])` over every face `F` of `reg`.
#[allow(clippy::too_many_arguments)]
pub fn fine_add<const D: usize>(
    reg: &mut FArrayBox<D>,
    flux: &FArrayBox<D>,
    dest_comp: usize,
    src_comp: usize,
    ncomp: usize,
    axis: usize,
    ratio: &IntVect<D>,
    mult: Real,
) -> Result<(), FluxRegisterError> {
    check_components(dest_comp, ncomp, reg.n_comp())?;
    check_components(src_comp, ncomp, flux.n_comp())?;
    let faces = covered_faces(reg, flux.index_box(), axis, ratio)?;
    let offsets = fine_offsets(axis, ratio);
    for n in 0..ncomp {
        for f in faces.iter() {
            let base = f.scale(ratio);
            let s: Real = offsets
                .iter()
                .map(|o| flux.get(&(base + o), src_comp + n))
                .sum();
            reg.add(&f, dest_comp + n, mult * s);
        }
    }
    Ok(())
}

/// As [`fine_add`] with area-weighted summands `flux * area`; `area` has one
/// component and the centering of `flux`.
#[allow(clippy::too_many_arguments)]
pub fn fine_area_add<const D: usize>(
    reg: &mut FArrayBox<D>,
    flux: &FArrayBox<D>,
    area: &FArrayBox<D>,
    dest_comp: usize,
    src_comp: usize,
    ncomp: usize,
    axis: usize,
    ratio: &IntVect<D>,
    mult: Real,
) -> Result<(), FluxRegisterError> {
    check_components(dest_comp, ncomp, reg.n_comp())?;
    check_components(src_comp, ncomp, flux.n_comp())?;
    check_components(0, 1, area.n_comp())?;
    let faces = covered_faces(reg, flux.index_box(), axis, ratio)?;
    covered_faces(reg, area.index_box(), axis, ratio)?;
    let offsets = fine_offsets(axis, ratio);
    for n in 0..ncomp {
        for f in faces.iter() {
            let base = f.scale(ratio);
            let s: Real = offsets
                .iter()
                .map(|o| {
                    let p = base + o;
                    flux.get(&p, src_comp + n) * area.get(&p, 0)
                })
                .sum();
            reg.add(&f, dest_comp + n, mult * s);
        }
    }
    Ok(())
}

/// `reg[F] = mult * flux[F] * area[F]` over `region` (assignment).
#[allow(clippy::too_many_arguments)]
pub fn crse_area_init<const D: usize>(
    reg: &mut FArrayBox<D>,
    flux: &FArrayBox<D>,
    area: &FArrayBox<D>,
    region: &IndexBox<D>,
    dest_comp: usize,
    src_comp: usize,
    ncomp: usize,
    mult: Real,
) -> Result<(), FluxRegisterError> {
    check_components(dest_comp, ncomp, reg.n_comp())?;
    check_components(src_comp, ncomp, flux.n_comp())?;
    check_components(0, 1, area.n_comp())?;
    check_contains(reg.index_box(), region)?;
    check_contains(flux.index_box(), region)?;
    check_contains(area.index_box(), region)?;
    for n in 0..ncomp {
        for f in region.iter() {
            let v = mult * flux.get(&f, src_comp + n) * area.get(&f, 0);
            reg.set(&f, dest_comp + n, v);
        }
    }
    Ok(())
}
