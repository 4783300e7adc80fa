//! A coarse injection computed on one rank for faces owned by another must
//! arrive bit-exactly, with component mapping and scaling applied once.
mod util;

use amr_flux_register::prelude::*;
use util::{cells, faces, run_ranks};

fn fine_boxes() -> BoxArray<2> {
    BoxArray::new(vec![cells([0, 0], [7, 7]), cells([8, 0], [15, 7])])
}

fn coded(p: IntVect<2>, comp: usize) -> Real {
    (1000 * comp as i64 + 100 * p[0] + p[1]) as Real
}

#[test]
fn remote_injection_arrives_bit_exact() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let dm = DistributionMapping::new(vec![0, 1]);
        let mut fr = FluxRegister::with_grids(&fine_boxes(), IntVect::splat(2), 1, 2, &dm, rank).unwrap();
        if rank == 0 {
            // y fluxes over the coarse image of box 1, three components;
            // components 1..3 land in register components 0..2
            let region = faces(1, [4, 0], [7, 4]);
            let flux = FArrayBox::from_fn(region, 3, coded);
            fr.crse_init(&flux, &region, 1, 1, 0, 2, 3.0).unwrap();
            assert_eq!(fr.pending_len(), 2);
            assert_eq!(fr.cycle_state(), CycleState::Accumulating);
        }
        fr.crse_init_finish(comm).unwrap();
        assert_eq!(fr.cycle_state(), CycleState::Idle);

        let mut out = FArrayBox::filled(faces(1, [0, 0], [7, 4]), 2, -1.0);
        fr.copy_to(&mut out, 1, 0, 0, 2).unwrap();
        out
    });

    // rank 0 holds only box 0, which nothing wrote
    let r0 = &results[0];
    for p in faces(1, [0, 0], [3, 4]).iter() {
        let expected = if p[1] == 0 || p[1] == 4 { 0.0 } else { -1.0 };
        assert_eq!(r0.get(&p, 0), expected, "{p}");
    }

    let r1 = &results[1];
    for x in 4..8 {
        for y in [0, 4] {
            let p = IntVect::new([x, y]);
            for n in 0..2 {
                let expected = 3.0 * coded(p, n + 1);
                assert_eq!(r1.get(&p, n).to_bits(), expected.to_bits(), "{p} comp {n}");
            }
        }
        // faces strictly inside the register box are not register faces
        assert_eq!(r1.get(&IntVect::new([x, 1]), 0), -1.0);
    }
}

#[test]
fn both_ranks_inject_into_each_other() {
    let results = run_ranks(2, |comm| {
        let rank = comm.rank();
        let dm = DistributionMapping::new(vec![0, 1]);
        let mut fr = FluxRegister::with_grids(&fine_boxes(), IntVect::splat(2), 1, 1, &dm, rank).unwrap();
        // each rank writes the y-low faces of the other rank's box
        let other = 1 - rank;
        let lo = fr.grids()[other].face_box(Orientation::low(1));
        fr.crse_init(&FArrayBox::filled(lo, 1, (rank + 1) as Real), &lo, 1, 0, 0, 1, 1.0)
            .unwrap();
        fr.crse_init_finish(comm).unwrap();
        fr.face(Orientation::low(1)).unwrap().get(rank).unwrap().clone()
    });
    assert!(results[0].as_slice().iter().all(|&v| v == 2.0));
    assert!(results[1].as_slice().iter().all(|&v| v == 1.0));
}
