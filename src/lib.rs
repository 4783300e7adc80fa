#![cfg_attr(docsrs, feature(doc_cfg))]
//! # amr-flux-register
//!
//! amr-flux-register implements the conservative coarse/fine flux correction
//! ("flux register") of block-structured adaptive mesh refinement. Each AMR
//! level computes its own face fluxes; at a coarse/fine interface the coarse
//! flux and the sum of the finer sub-step fluxes disagree, and the register
//! accumulates that disagreement and applies it back to the coarse solution
//! ("reflux") so the composite scheme stays exactly conservative.
//!
//! ## Features
//! - Per-face storage over the coarsened fine boxes, for any dimension `D`
//! - Coarse injection (`crse_init`) with deferred, batched delivery to the
//!   owning rank, and local fine accumulation (`fine_add`)
//! - Volume- and cell-size-weighted reflux, including periodic wraparound
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//! Add `amr-flux-register` as a dependency in your `Cargo.toml` and enable
//! features as needed:
//!
//! ```toml
//! [dependencies]
//! amr-flux-register = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "check-invariants"]
//! ```
//!
//! ## One coarse step
//! ```
//! use amr_flux_register::prelude::*;
//!
//! let fine = BoxArray::new(vec![IndexBox::from_corners([8, 8], [23, 23])]);
//! let dm = DistributionMapping::single(1, 0);
//! let mut fr = FluxRegister::with_grids(&fine, IntVect::splat(2), 1, 1, &dm, 0).unwrap();
//!
//! // the x-low faces of the coarsened fine box [(4,4)-(11,11)]
//! let faces = IndexBox::with_type(IntVect::new([4, 4]), IntVect::new([4, 11]), IndexType::face(0));
//! fr.crse_init(&FArrayBox::filled(faces, 1, 1.0), &faces, 0, 0, 0, 1, 1.0).unwrap();
//! fr.crse_init_finish(&NoComm).unwrap();
//! assert_eq!(fr.sum_reg(0, &NoComm).unwrap(), 8.0);
//! ```
//!
//! ## Determinism
//! Global sums add per-rank contributions in rank order, and every exchange
//! delivers messages in the order they were produced, so results are
//! bitwise reproducible for a fixed distribution.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod flux_error;
pub mod flux_register;
pub mod geometry;
pub mod kernels;

pub use debug_invariants::DebugInvariants;
pub use flux_error::FluxRegisterError;
pub use flux_register::{CycleState, FluxRegister, FluxRegisterTags};

/// Floating-point type of all field data.
pub type Real = f64;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::Real;
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, RayonComm};
    pub use crate::data::distribution::DistributionMapping;
    pub use crate::data::fab::FArrayBox;
    pub use crate::data::fab_array::{FabArray, FabSet, MultiFab};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::flux_error::FluxRegisterError;
    pub use crate::flux_register::{CycleState, FluxRegister, FluxRegisterTags};
    pub use crate::geometry::{BoxArray, Geometry, IndexBox, IndexType, IntVect, Orientation, Side};
}
