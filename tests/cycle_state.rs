mod util;

use amr_flux_register::algs::communicator::Wait;
use amr_flux_register::prelude::*;
use util::{cells, coarse_level, faces};

/// Rank 0 of two whose peer always answers with a truncated header.
struct BrokenComm;

struct Garbled;

impl Wait for Garbled {
    fn wait(self) -> Option<Vec<u8>> {
        Some(vec![0u8; 2])
    }
}

impl Communicator for BrokenComm {
    type SendHandle = ();
    type RecvHandle = Garbled;

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) -> Garbled {
        Garbled
    }

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        2
    }
}

fn register(owners: Vec<usize>) -> FluxRegister<2> {
    let fine = BoxArray::new(vec![cells([8, 8], [15, 23]), cells([16, 8], [23, 23])]);
    FluxRegister::with_grids(&fine, IntVect::splat(2), 1, 1, &DistributionMapping::new(owners), 0).unwrap()
}

fn x_faces() -> IndexBox<2> {
    faces(0, [4, 4], [12, 11])
}

fn open_cycle(fr: &mut FluxRegister<2>) {
    let f = x_faces();
    fr.crse_init(&FArrayBox::filled(f, 1, 1.0), &f, 0, 0, 0, 1, 1.0).unwrap();
}

fn is_cycle_open(err: FluxRegisterError, state: &str) -> bool {
    matches!(err, FluxRegisterError::CycleOpen(s) if s == state)
}

#[test]
fn reads_are_refused_while_accumulating() {
    let mut fr = register(vec![0, 0]);
    assert_eq!(fr.cycle_state(), CycleState::Idle);
    open_cycle(&mut fr);
    assert_eq!(fr.cycle_state(), CycleState::Accumulating);

    let domain = cells([0, 0], [15, 15]);
    let mut state = coarse_level(domain, 1, 0.0);
    let volume = coarse_level(domain, 1, 1.0);
    let geom = Geometry::non_periodic(domain);

    assert!(is_cycle_open(fr.sum_reg(0, &NoComm).unwrap_err(), "accumulating"));
    let mut flx = FArrayBox::new(x_faces(), 1);
    assert!(is_cycle_open(fr.copy_to(&mut flx, 0, 0, 0, 1).unwrap_err(), "accumulating"));
    assert!(is_cycle_open(
        fr.reflux_volume(&mut state, &volume, 1.0, 0, 0, 1, &geom, &NoComm).unwrap_err(),
        "accumulating"
    ));
    assert!(is_cycle_open(
        fr.reflux_cartesian(&mut state, 1.0, 0, 0, 1, &geom, &NoComm).unwrap_err(),
        "accumulating"
    ));
    assert!(is_cycle_open(fr.set_val(0.0).unwrap_err(), "accumulating"));
    // nothing was applied by the refused reflux
    assert!(state.get(0).unwrap().as_slice().iter().all(|&v| v == 0.0));

    // writes stay allowed
    open_cycle(&mut fr);
    let fine_x = cells([8, 8], [15, 23]).surrounding_nodes(0);
    fr.fine_add(&FArrayBox::filled(fine_x, 1, 0.5), 0, 0, 0, 0, 1, -1.0).unwrap();

    fr.crse_init_finish(&NoComm).unwrap();
    assert_eq!(fr.cycle_state(), CycleState::Idle);
    assert!(fr.sum_reg(0, &NoComm).is_ok());
}

#[test]
fn fine_add_alone_does_not_open_a_cycle() {
    let mut fr = register(vec![0, 0]);
    let fine_x = cells([8, 8], [15, 23]).surrounding_nodes(0);
    fr.fine_add(&FArrayBox::filled(fine_x, 1, 1.0), 0, 0, 0, 0, 1, 1.0).unwrap();
    assert_eq!(fr.cycle_state(), CycleState::Idle);
    assert!(fr.sum_reg(0, &NoComm).is_ok());
}

#[test]
fn failed_consolidation_poisons_the_register() {
    let mut fr = register(vec![0, 1]);
    open_cycle(&mut fr);
    assert_eq!(fr.pending_len(), 2);

    let err = fr.crse_init_finish(&BrokenComm).unwrap_err();
    assert!(matches!(err, FluxRegisterError::CommError { neighbor: 1, .. }));
    assert_eq!(fr.cycle_state(), CycleState::Consolidating);

    let f = x_faces();
    let flux = FArrayBox::filled(f, 1, 1.0);
    assert!(is_cycle_open(fr.crse_init(&flux, &f, 0, 0, 0, 1, 1.0).unwrap_err(), "consolidating"));
    let fine_x = cells([8, 8], [15, 23]).surrounding_nodes(0);
    assert!(is_cycle_open(
        fr.fine_add(&FArrayBox::filled(fine_x, 1, 1.0), 0, 0, 0, 0, 1, 1.0).unwrap_err(),
        "consolidating"
    ));
    assert!(is_cycle_open(fr.crse_init_finish(&NoComm).unwrap_err(), "consolidating"));
    assert!(is_cycle_open(fr.sum_reg(0, &NoComm).unwrap_err(), "consolidating"));
}

#[test]
fn orphaned_contributions_fail_on_one_rank() {
    let mut fr = register(vec![0, 1]);
    open_cycle(&mut fr);
    let err = fr.crse_init_finish(&NoComm).unwrap_err();
    assert!(matches!(err, FluxRegisterError::ProtocolViolation { .. }));
}

#[test]
fn finish_checks_the_calling_rank() {
    let mut fr = register(vec![0, 1]);
    let world = RayonComm::world(2);
    let err = fr.crse_init_finish(&world[1]).unwrap_err();
    assert!(matches!(err, FluxRegisterError::ProtocolViolation { neighbor: 1, .. }));
}

#[test]
fn undefined_register_refuses_everything() {
    let mut fr = FluxRegister::<2>::new();
    assert!(!fr.is_defined());
    assert_eq!(fr.sum_reg(0, &NoComm), Err(FluxRegisterError::NotDefined));
    assert_eq!(fr.set_val(1.0), Err(FluxRegisterError::NotDefined));
    assert_eq!(fr.crse_init_finish(&NoComm), Err(FluxRegisterError::NotDefined));
    let f = x_faces();
    assert_eq!(
        fr.crse_init(&FArrayBox::filled(f, 1, 1.0), &f, 0, 0, 0, 1, 1.0),
        Err(FluxRegisterError::NotDefined)
    );
}

#[test]
fn cycle_state_names() {
    assert_eq!(CycleState::default(), CycleState::Idle);
    assert_eq!(CycleState::Consolidating.to_string(), "consolidating");
}
