//! Global reductions over a [`Communicator`].

use crate::Real;
use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::cast_slice;
use crate::flux_error::FluxRegisterError;

/// Sum `value` over all ranks. Every rank receives every contribution and
/// adds them in rank order, so the result is bitwise identical everywhere.
pub fn all_reduce_sum<C>(value: Real, comm: &C, tag: CommTag) -> Result<Real, FluxRegisterError>
where
    C: Communicator,
{
    let me = comm.rank();
    let n = comm.size();
    if n <= 1 {
        return Ok(value);
    }

    let mut recvs = Vec::with_capacity(n - 1);
    for peer in (0..n).filter(|&p| p != me) {
        let mut buf = [0u8; std::mem::size_of::<Real>()];
        recvs.push((peer, comm.irecv(peer, tag.as_u16(), &mut buf)));
    }
    let bytes = cast_slice(std::slice::from_ref(&value)).to_vec();
    let sends: Vec<_> = (0..n)
        .filter(|&p| p != me)
        .map(|p| comm.isend(p, tag.as_u16(), &bytes))
        .collect();

    let mut parts = vec![0.0; n];
    parts[me] = value;
    let mut maybe_err = None;
    for (peer, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<Real>() => {
                let mut raw = [0u8; std::mem::size_of::<Real>()];
                raw.copy_from_slice(&data);
                parts[peer] = Real::from_ne_bytes(raw);
            }
            other => {
                if maybe_err.is_none() {
                    maybe_err = Some(FluxRegisterError::CommError {
                        neighbor: peer,
                        source: format!(
                            "expected {} bytes for reduction, got {:?}",
                            std::mem::size_of::<Real>(),
                            other.map(|d| d.len())
                        )
                        .into(),
                    });
                }
            }
        }
    }
    // send completion carries no data
    for s in sends {
        s.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(parts.iter().sum()),
    }
}
