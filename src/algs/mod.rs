//! Communication and distributed-data algorithms used by the flux register.

pub mod communicator;
pub mod copy_descriptor;
pub mod exchange;
pub mod reduction;
pub mod wire;

pub use copy_descriptor::{CopyDescriptor, FetchId, FetchTags, SourceId};
pub use exchange::{Envelope, describe_then_transfer};
pub use reduction::all_reduce_sum;
