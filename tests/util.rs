#![allow(dead_code)]
use amr_flux_register::prelude::*;

/// Run `f` once per rank of a fresh `n`-rank world, each rank on its own
/// thread; results come back in rank order.
pub fn run_ranks<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&RayonComm) -> T + Sync,
{
    let world = RayonComm::world(n);
    std::thread::scope(|s| {
        let f = &f;
        let handles: Vec<_> = world.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// Two-rank Rayon comms (ranks 0 and 1) on the process-wide mailbox.
pub fn rayons() -> (RayonComm, RayonComm) {
    (RayonComm::new(0, 2), RayonComm::new(1, 2))
}

pub fn cells<const D: usize>(lo: [i64; D], hi: [i64; D]) -> IndexBox<D> {
    IndexBox::from_corners(lo, hi)
}

/// Faces normal to `axis` with the given corners.
pub fn faces<const D: usize>(axis: usize, lo: [i64; D], hi: [i64; D]) -> IndexBox<D> {
    IndexBox::with_type(IntVect(lo), IntVect(hi), IndexType::face(axis))
}

/// Overwrite every value of `fab` with `g(point, component)`.
pub fn fill_with<const D: usize>(fab: &mut FArrayBox<D>, g: impl Fn(IntVect<D>, usize) -> Real) {
    let bx = *fab.index_box();
    for n in 0..fab.n_comp() {
        for p in bx.iter() {
            fab.set(&p, n, g(p, n));
        }
    }
}

/// Single-box coarse level over `domain`, every cell set to `value`.
pub fn coarse_level<const D: usize>(domain: IndexBox<D>, ncomp: usize, value: Real) -> MultiFab<D> {
    FabArray::from_fn(
        BoxArray::new(vec![domain]),
        DistributionMapping::single(1, 0),
        ncomp,
        0,
        |_, f| f.set_val(value),
    )
    .unwrap()
}

/// Bitwise equality of two local patches.
pub fn assert_bitwise_eq<const D: usize>(a: &FArrayBox<D>, b: &FArrayBox<D>) {
    assert_eq!(a.index_box(), b.index_box());
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        assert_eq!(x.to_bits(), y.to_bits(), "{x} vs {y}");
    }
}
