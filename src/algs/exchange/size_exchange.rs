//! Stage 1 of an exchange: every rank learns how many records each peer
//! will send it.
//!
//! The count exchange is all-to-all: each rank posts a receive from and a
//! send to every other rank, zero counts included, so that both sides of
//! every pair agree on whether later stages carry messages. All handles are
//! drained before returning, even if an error occurs.

use std::collections::BTreeMap;

use bytemuck::Zeroable;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut, decode_records};
use crate::flux_error::FluxRegisterError;

/// Send `outgoing[p]` (missing = 0) to every peer `p != rank` and return the
/// count each peer announced. Self-entries are ignored.
pub fn exchange_counts<C>(
    outgoing: &BTreeMap<usize, usize>,
    comm: &C,
    tag: CommTag,
) -> Result<BTreeMap<usize, usize>, FluxRegisterError>
where
    C: Communicator,
{
    let me = comm.rank();
    let peers: Vec<usize> = (0..comm.size()).filter(|&p| p != me).collect();
    // every count must fit the wire before any handle is posted
    let counts = peers
        .iter()
        .map(|&nbr| WireCount::new(outgoing.get(&nbr).copied().unwrap_or(0), nbr))
        .collect::<Result<Vec<_>, _>>()?;

    // 1) post all receives
    let mut recv_size: Vec<(usize, C::RecvHandle)> = Vec::with_capacity(peers.len());
    for &nbr in &peers {
        let mut cnt = WireCount::zeroed();
        let h = comm.irecv(
            nbr,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.push((nbr, h));
    }

    // 2) post all sends
    let mut pending_sends = Vec::with_capacity(peers.len());
    for (&nbr, count) in peers.iter().zip(&counts) {
        pending_sends.push(comm.isend(
            nbr,
            tag.as_u16(),
            cast_slice(std::slice::from_ref(count)),
        ));
    }

    // 3) wait for all recvs, collect counts (but do not early-return)
    let mut sizes_in = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recv_size {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                if maybe_err.is_none() {
                    let cnt = decode_records::<WireCount>(&data)[0];
                    sizes_in.insert(nbr, cnt.get());
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(FluxRegisterError::CommError {
                    neighbor: nbr,
                    source: format!(
                        "expected {} bytes for size header, got {}",
                        std::mem::size_of::<WireCount>(),
                        data.len()
                    )
                    .into(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(FluxRegisterError::CommError {
                    neighbor: nbr,
                    source: format!("failed to receive size from rank {nbr}").into(),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        send.wait(); // completion only, no data
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};

    #[test]
    fn single_rank_exchanges_nothing() {
        let mut out = BTreeMap::new();
        out.insert(0, 5);
        let got = exchange_counts(&out, &NoComm, CommTag::new(1)).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn three_ranks_all_to_all() {
        let world = RayonComm::world(3);
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let me = comm.rank();
                        // rank r sends r*10 + p records to peer p
                        let out: BTreeMap<usize, usize> =
                            (0..3).filter(|&p| p != me).map(|p| (p, me * 10 + p)).collect();
                        exchange_counts(&out, comm, CommTag::new(0x20)).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for (me, got) in results.iter().enumerate() {
            for p in (0..3).filter(|&p| p != me) {
                assert_eq!(got[&p], p * 10 + me);
            }
            assert!(!got.contains_key(&me));
        }
    }
}
