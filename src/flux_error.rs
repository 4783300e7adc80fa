//! FluxRegisterError: unified error type for amr-flux-register public APIs
//!
//! Every variant is fatal from the simulation's point of view: a flux register
//! that reports an error can no longer guarantee conservation, so callers are
//! expected to stop rather than retry.

use thiserror::Error;

/// Unified error type for flux-register operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FluxRegisterError {
    // ----- precondition violations -----
    /// `define` was called on a register that already owns Face Storage.
    #[error("flux register is already defined")]
    AlreadyDefined,
    /// An operation that needs Face Storage ran on an undefined register.
    #[error("flux register has not been defined")]
    NotDefined,
    /// Two boxes of a box array overlap where disjointness is required.
    #[error("boxes {first} and {second} overlap; fine boxes must be disjoint")]
    OverlappingBoxes { first: usize, second: usize },
    /// A component range does not fit the destination or source.
    #[error("component range [{start}, {start}+{count}) exceeds {available} components")]
    ComponentRange {
        start: usize,
        count: usize,
        available: usize,
    },
    /// Axis index outside `[0, D)`.
    #[error("axis {axis} is out of range for a {dim}-dimensional index space")]
    InvalidAxis { axis: usize, dim: usize },
    /// Refinement ratio entries must be positive.
    #[error("refinement ratio must be positive on every axis, got {0}")]
    InvalidRatio(String),
    /// A region was expected to lie inside an enclosing box.
    #[error("region {region} is not contained in {container}")]
    RegionNotContained { region: String, container: String },
    /// Two boxes that must share a centering do not.
    #[error("index type mismatch: expected {expected}, found {found}")]
    IndexTypeMismatch { expected: String, found: String },
    /// Sizes of paired containers disagree (box arrays, distribution maps, ...).
    #[error("size mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    /// Box index does not exist in the box array.
    #[error("box index {index} out of range ({len} boxes)")]
    BoxIndexOutOfRange { index: usize, len: usize },

    // ----- protocol invariant violations -----
    /// A message exchange produced data inconsistent with its descriptor.
    #[error("protocol violation from rank {neighbor}: {reason}")]
    ProtocolViolation { neighbor: usize, reason: String },
    /// Local process tried to touch data it does not own.
    #[error("box {index} is owned by rank {owner}, not by rank {rank}")]
    OwnershipMismatch {
        index: usize,
        owner: usize,
        rank: usize,
    },
    /// Face Storage was read (or re-accumulated) while a cycle was open.
    #[error("accumulation cycle is {0}; call crse_init_finish before reading the register")]
    CycleOpen(&'static str),
    /// A fetch handle that was never registered or not yet collected.
    #[error("unknown or unresolved fetch handle {0}")]
    UnknownFetch(usize),

    // ----- transport failures -----
    /// Communication failed with the named peer.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: CommFailure,
    },
}

/// Cloneable description of a transport failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CommFailure(pub String);

impl From<String> for CommFailure {
    fn from(s: String) -> Self {
        CommFailure(s)
    }
}

impl From<&str> for CommFailure {
    fn from(s: &str) -> Self {
        CommFailure(s.to_owned())
    }
}
