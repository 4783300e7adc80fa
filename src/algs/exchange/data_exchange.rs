//! Stage 2 of an exchange: move typed records whose counts are already
//! known on both sides.

use std::collections::BTreeMap;

use bytemuck::Pod;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{cast_slice, decode_records, expect_exact_len};
use crate::flux_error::FluxRegisterError;

/// Send `outgoing[p]` to each peer and receive exactly `incoming[p]` records
/// from each peer. Peers with nothing to send or receive exchange no message;
/// both maps must therefore agree with the counts announced in stage 1.
pub fn exchange_records<T, C>(
    outgoing: &BTreeMap<usize, Vec<T>>,
    incoming: &BTreeMap<usize, usize>,
    comm: &C,
    tag: CommTag,
) -> Result<BTreeMap<usize, Vec<T>>, FluxRegisterError>
where
    T: Pod,
    C: Communicator,
{
    let item = std::mem::size_of::<T>();

    // post receives first
    let mut recvs = Vec::new();
    for (&nbr, &n) in incoming.iter().filter(|&(_, &n)| n > 0) {
        let mut buffer = vec![0u8; n * item];
        let h = comm.irecv(nbr, tag.as_u16(), &mut buffer);
        recvs.push((nbr, n, h));
    }

    let mut sends = Vec::new();
    for (&nbr, items) in outgoing.iter().filter(|(_, v)| !v.is_empty()) {
        sends.push(comm.isend(nbr, tag.as_u16(), cast_slice(items)));
    }

    let mut out = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, n, h) in recvs {
        let raw = h.wait();
        if maybe_err.is_some() {
            continue;
        }
        match raw {
            Some(bytes) => match expect_exact_len(bytes.len(), n * item) {
                Ok(()) => {
                    out.insert(nbr, decode_records::<T>(&bytes));
                }
                Err(reason) => {
                    maybe_err = Some(FluxRegisterError::CommError {
                        neighbor: nbr,
                        source: reason.into(),
                    });
                }
            },
            None => {
                maybe_err = Some(FluxRegisterError::CommError {
                    neighbor: nbr,
                    source: format!("failed to receive data from rank {nbr}").into(),
                });
            }
        }
    }

    // send completion carries no data
    for s in sends {
        s.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::RayonComm;

    #[test]
    fn short_message_is_an_error() {
        let world = RayonComm::world(2);
        // rank 0 announces 3 values but only 2 arrive
        let mut out = BTreeMap::new();
        out.insert(1usize, vec![1.0f64, 2.0]);
        exchange_records::<f64, _>(&out, &BTreeMap::new(), &world[0], CommTag::new(9)).unwrap();

        let mut inc = BTreeMap::new();
        inc.insert(0usize, 3usize);
        let err = exchange_records::<f64, _>(&BTreeMap::new(), &inc, &world[1], CommTag::new(9))
            .unwrap_err();
        assert!(matches!(err, FluxRegisterError::CommError { neighbor: 0, .. }));
    }

    #[test]
    fn values_arrive_in_order() {
        let world = RayonComm::world(2);
        let mut out = BTreeMap::new();
        out.insert(1usize, vec![0.5f64, -1.25, 3.0]);
        exchange_records::<f64, _>(&out, &BTreeMap::new(), &world[0], CommTag::new(10)).unwrap();
        let mut inc = BTreeMap::new();
        inc.insert(0usize, 3usize);
        let got = exchange_records::<f64, _>(&BTreeMap::new(), &inc, &world[1], CommTag::new(10))
            .unwrap();
        assert_eq!(got[&0], vec![0.5, -1.25, 3.0]);
    }
}
