//! Index-space geometry: lattice vectors, boxes, face orientations, box
//! arrays and periodic problem geometry.

pub mod box_array;
pub mod index_box;
pub mod int_vect;
pub mod orientation;
pub mod periodic;

pub use box_array::BoxArray;
pub use index_box::{IndexBox, IndexType};
pub use int_vect::IntVect;
pub use orientation::{Orientation, Side};
pub use periodic::Geometry;
