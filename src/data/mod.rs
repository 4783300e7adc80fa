//! Data module: patches, ownership maps and distributed patch arrays.

pub mod distribution;
pub mod fab;
pub mod fab_array;

pub use distribution::DistributionMapping;
pub use fab::{FArrayBox, FabView, FabViewMut};
pub use fab_array::{FabArray, FabSet, MultiFab};
