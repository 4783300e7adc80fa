//! Fixed, versioned, little-endian wire types for the register's exchanges.

use bytemuck::{Pod, Zeroable};
use static_assertions::{const_assert, const_assert_eq};
use std::mem::{align_of, size_of};

use crate::flux_error::FluxRegisterError;
use crate::geometry::{IndexBox, IndexType, IntVect};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into records, regardless of its alignment.
pub fn decode_records<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytemuck::pod_collect_to_vec(bytes)
}

pub fn expect_exact_len(actual: usize, expected: usize) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} bytes, got {actual}"))
    }
}

/// Narrow a host-side index or count to its 32-bit wire field.
fn wire_u32(value: usize, what: &str, peer: usize) -> Result<u32, FluxRegisterError> {
    u32::try_from(value).map_err(|_| FluxRegisterError::ProtocolViolation {
        neighbor: peer,
        reason: format!("{what} {value} does not fit in a 32-bit wire field"),
    })
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Largest spatial dimension representable in a [`WireFabRecord`].
pub const WIRE_MAX_DIM: usize = 3;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}

impl WireCount {
    /// Count announced to `peer`; fails if `n` does not fit in 32 bits.
    pub fn new(n: usize, peer: usize) -> Result<Self, FluxRegisterError> {
        Ok(Self {
            n_le: wire_u32(n, "record count", peer)?.to_le(),
        })
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// Descriptor of one patch travelling between ranks: which box, which face
/// (or source), which components, which region, and how many `f64` payload
/// values follow it in the payload phase.
///
/// Field meaning by use:
/// - consolidation: `key` = orientation index, `source` = sending rank,
///   `comp` = destination component;
/// - fetch request/reply: `key` = requester slot, `source` = registered source
///   id, `comp` = source component.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireFabRecord {
    pub version_le: u16,
    pub dim_le: u16,
    pub seq_le: u32,
    pub key_le: u32,
    pub source_le: u32,
    pub box_le: u32,
    pub comp_le: u32,
    pub ncomp_le: u32,
    pub itype_le: u32,
    pub payload_le: u32,
    pub _pad: u32,
    pub lo_le: [i64; WIRE_MAX_DIM],
    pub hi_le: [i64; WIRE_MAX_DIM],
}

impl WireFabRecord {
    pub const SIZE: usize = 88; // 2*2 + 9*4 + 2*3*8

    /// Record addressed to `peer` describing `region`; `payload` is the
    /// number of values that will follow (zero for fetch requests). Indices
    /// and counts that overflow their 32-bit fields are a protocol
    /// violation against `peer`.
    #[allow(clippy::too_many_arguments)]
    pub fn new<const D: usize>(
        peer: usize,
        key: usize,
        source: usize,
        box_index: usize,
        comp: usize,
        ncomp: usize,
        region: &IndexBox<D>,
        payload: usize,
    ) -> Result<Self, FluxRegisterError> {
        if D > WIRE_MAX_DIM {
            return Err(FluxRegisterError::DimensionMismatch {
                expected: WIRE_MAX_DIM,
                found: D,
            });
        }
        let mut lo = [0i64; WIRE_MAX_DIM];
        let mut hi = [0i64; WIRE_MAX_DIM];
        for d in 0..D {
            lo[d] = region.lo()[d].to_le();
            hi[d] = region.hi()[d].to_le();
        }
        Ok(Self {
            version_le: WIRE_VERSION.to_le(),
            dim_le: (D as u16).to_le(),
            seq_le: 0,
            key_le: wire_u32(key, "key", peer)?.to_le(),
            source_le: wire_u32(source, "source", peer)?.to_le(),
            box_le: wire_u32(box_index, "box index", peer)?.to_le(),
            comp_le: wire_u32(comp, "component", peer)?.to_le(),
            ncomp_le: wire_u32(ncomp, "component count", peer)?.to_le(),
            itype_le: region.index_type().bits().to_le(),
            payload_le: wire_u32(payload, "payload length", peer)?.to_le(),
            _pad: 0,
            lo_le: lo,
            hi_le: hi,
        })
    }

    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn seq(&self) -> u32 {
        u32::from_le(self.seq_le)
    }
    pub fn set_seq(&mut self, seq: u32) {
        self.seq_le = seq.to_le();
    }
    pub fn key(&self) -> u32 {
        u32::from_le(self.key_le)
    }
    pub fn source(&self) -> u32 {
        u32::from_le(self.source_le)
    }
    pub fn box_index(&self) -> usize {
        u32::from_le(self.box_le) as usize
    }
    pub fn comp(&self) -> usize {
        u32::from_le(self.comp_le) as usize
    }
    pub fn ncomp(&self) -> usize {
        u32::from_le(self.ncomp_le) as usize
    }
    pub fn payload(&self) -> usize {
        u32::from_le(self.payload_le) as usize
    }

    /// Decode the region; fails if the record was written for another
    /// dimension or wire version.
    pub fn region<const D: usize>(&self) -> Result<IndexBox<D>, String> {
        if self.version() != WIRE_VERSION {
            return Err(format!(
                "wire version {} (expected {WIRE_VERSION})",
                self.version()
            ));
        }
        let dim = u16::from_le(self.dim_le) as usize;
        if dim != D {
            return Err(format!("record is {dim}-dimensional, expected {D}"));
        }
        let lo: IntVect<D> = IntVect(core::array::from_fn(|d| i64::from_le(self.lo_le[d])));
        let hi: IntVect<D> = IntVect(core::array::from_fn(|d| i64::from_le(self.hi_le[d])));
        let itype = IndexType::from_bits(u32::from_le(self.itype_le));
        Ok(IndexBox::with_type(lo, hi, itype))
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireCount>(), 4);
const_assert_eq!(size_of::<WireFabRecord>(), WireFabRecord::SIZE);
const_assert!(align_of::<WireFabRecord>() == 8);
