//! Problem geometry: domain box, periodicity and cell size.
//!
//! Besides plain metadata this module answers the one question the reflux
//! engine needs about periodic domains: which lattice translations bring a
//! box back into contact with another one.

use super::index_box::IndexBox;
use super::int_vect::IntVect;
use crate::Real;

/// Coarse-level geometry consumed (read-only) by reflux.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry<const D: usize> {
    domain: IndexBox<D>,
    periodic: [bool; D],
    dx: [Real; D],
}

impl<const D: usize> Geometry<D> {
    pub fn new(domain: IndexBox<D>, periodic: [bool; D], dx: [Real; D]) -> Self {
        Self {
            domain: domain.to_cells(),
            periodic,
            dx,
        }
    }

    /// Non-periodic geometry with unit cells.
    pub fn non_periodic(domain: IndexBox<D>) -> Self {
        Self::new(domain, [false; D], [1.0; D])
    }

    #[inline]
    pub fn domain(&self) -> &IndexBox<D> {
        &self.domain
    }

    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    #[inline]
    pub fn is_any_periodic(&self) -> bool {
        self.periodic.iter().any(|&p| p)
    }

    #[inline]
    pub fn cell_size(&self) -> &[Real; D] {
        &self.dx
    }

    /// Period along `axis` in cells.
    #[inline]
    pub fn period(&self, axis: usize) -> i64 {
        self.domain.length(axis)
    }

    /// Every non-zero periodic translation `s` (each axis shifted by
    /// `-L`, `0` or `+L`, only along periodic axes) such that
    /// `src.shift(s)` intersects `target`. Order is deterministic: axis 0
    /// varies fastest over `-1, 0, +1`.
    pub fn periodic_shifts(&self, target: &IndexBox<D>, src: &IndexBox<D>) -> Vec<IntVect<D>> {
        let mut out = Vec::new();
        if !self.is_any_periodic() {
            return out;
        }
        let lo: IntVect<D> = IntVect(core::array::from_fn(|d| if self.periodic[d] { -1 } else { 0 }));
        let hi: IntVect<D> = IntVect(core::array::from_fn(|d| if self.periodic[d] { 1 } else { 0 }));
        for m in IndexBox::new(lo, hi).iter() {
            if m.is_zero() {
                continue;
            }
            let shift: IntVect<D> = IntVect(core::array::from_fn(|d| m[d] * self.period(d)));
            if src.shift(shift).intersects(target) {
                out.push(shift);
            }
        }
        out
    }
}
