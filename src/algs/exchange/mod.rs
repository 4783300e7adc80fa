//! "Describe, then transfer": a batched scatter of variable-size payloads.
//!
//! Every rank hands in, per destination rank, an ordered list of
//! [`Envelope`]s (a fixed-size descriptor plus a payload). The exchange runs
//! in three collective stages:
//!
//! 1. [`size_exchange::exchange_counts`]: all-to-all envelope counts;
//! 2. descriptors, each stamped with its position in the per-destination
//!    list;
//! 3. payloads, packed contiguously per destination in descriptor order, with
//!    receive sizes derived from the descriptors just received.
//!
//! The receiver checks that sequence numbers are contiguous and that the
//! payload volume matches what the descriptors announced, so a producer and
//! consumer that disagree on ordering fail loudly instead of misassigning
//! data. Envelopes addressed to the calling rank are delivered without
//! messaging.

pub mod data_exchange;
pub mod size_exchange;

use std::collections::BTreeMap;

use bytemuck::Pod;

use crate::algs::communicator::{Communicator, ExchangeTags};
use crate::algs::wire::WireFabRecord;
use crate::flux_error::FluxRegisterError;

pub use data_exchange::exchange_records;
pub use size_exchange::exchange_counts;

/// Fixed-size descriptor carried in stage 2.
pub trait Descriptor: Pod {
    fn sequence(&self) -> u32;
    fn set_sequence(&mut self, seq: u32);
    /// Number of payload items that follow this descriptor in stage 3.
    fn payload_len(&self) -> usize;
}

impl Descriptor for WireFabRecord {
    fn sequence(&self) -> u32 {
        self.seq()
    }
    fn set_sequence(&mut self, seq: u32) {
        self.set_seq(seq);
    }
    fn payload_len(&self) -> usize {
        self.payload()
    }
}

/// One descriptor and its payload.
#[derive(Clone, Debug)]
pub struct Envelope<Dsc, P> {
    pub descriptor: Dsc,
    pub payload: Vec<P>,
}

impl<Dsc, P> Envelope<Dsc, P> {
    pub fn new(descriptor: Dsc, payload: Vec<P>) -> Self {
        Self {
            descriptor,
            payload,
        }
    }
}

/// Collective exchange of envelopes; returns, per source rank, the
/// envelopes it sent to this rank in the order it sent them.
pub fn describe_then_transfer<Dsc, P, C>(
    mut outgoing: BTreeMap<usize, Vec<Envelope<Dsc, P>>>,
    comm: &C,
    tags: ExchangeTags,
) -> Result<BTreeMap<usize, Vec<Envelope<Dsc, P>>>, FluxRegisterError>
where
    Dsc: Descriptor,
    P: Pod,
    C: Communicator,
{
    let me = comm.rank();
    let mut received: BTreeMap<usize, Vec<Envelope<Dsc, P>>> = BTreeMap::new();

    if let Some(own) = outgoing.remove(&me) {
        if !own.is_empty() {
            received.insert(me, own);
        }
    }

    let mut counts_out = BTreeMap::new();
    let mut descs_out: BTreeMap<usize, Vec<Dsc>> = BTreeMap::new();
    let mut payload_out: BTreeMap<usize, Vec<P>> = BTreeMap::new();
    for (&dst, envelopes) in outgoing.iter_mut() {
        counts_out.insert(dst, envelopes.len());
        let mut descs = Vec::with_capacity(envelopes.len());
        let mut payload = Vec::new();
        for (seq, env) in envelopes.iter_mut().enumerate() {
            if env.payload.len() != env.descriptor.payload_len() {
                return Err(FluxRegisterError::ProtocolViolation {
                    neighbor: me,
                    reason: format!(
                        "envelope {seq} for rank {dst} declares {} payload items but carries {}",
                        env.descriptor.payload_len(),
                        env.payload.len()
                    ),
                });
            }
            let wire_seq = u32::try_from(seq).map_err(|_| FluxRegisterError::ProtocolViolation {
                neighbor: dst,
                reason: format!("envelope {seq} overflows the sequence number"),
            })?;
            env.descriptor.set_sequence(wire_seq);
            descs.push(env.descriptor);
            payload.extend_from_slice(&env.payload);
        }
        descs_out.insert(dst, descs);
        payload_out.insert(dst, payload);
    }

    // 1) counts
    let counts_in = exchange_counts(&counts_out, comm, tags.sizes)?;
    log::trace!(
        "rank {me}: exchange sends {:?}, receives {:?}",
        counts_out,
        counts_in
    );

    // 2) descriptors
    let descs_in = exchange_records::<Dsc, C>(&descs_out, &counts_in, comm, tags.descriptors)?;

    // 3) payloads, sized from the descriptors just received
    let mut payload_counts = BTreeMap::new();
    for (&src, descs) in &descs_in {
        for (i, d) in descs.iter().enumerate() {
            if d.sequence() as usize != i {
                return Err(FluxRegisterError::ProtocolViolation {
                    neighbor: src,
                    reason: format!("descriptor {i} carries sequence number {}", d.sequence()),
                });
            }
        }
        payload_counts.insert(src, descs.iter().map(|d| d.payload_len()).sum::<usize>());
    }
    let payload_in = exchange_records::<P, C>(&payload_out, &payload_counts, comm, tags.payload)?;

    // 4) split payloads back into envelopes
    for (src, descs) in descs_in {
        let flat = payload_in.get(&src).map_or(&[][..], |v| v.as_slice());
        let mut cursor = 0usize;
        let mut envelopes = Vec::with_capacity(descs.len());
        for d in descs {
            let n = d.payload_len();
            let chunk = flat
                .get(cursor..cursor + n)
                .ok_or_else(|| FluxRegisterError::ProtocolViolation {
                    neighbor: src,
                    reason: format!(
                        "payload of {} items too short for descriptor {}",
                        flat.len(),
                        d.sequence()
                    ),
                })?;
            envelopes.push(Envelope::new(d, chunk.to_vec()));
            cursor += n;
        }
        if cursor != flat.len() {
            return Err(FluxRegisterError::ProtocolViolation {
                neighbor: src,
                reason: format!("{} payload items left over", flat.len() - cursor),
            });
        }
        received.insert(src, envelopes);
    }

    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{CommTag, NoComm, RayonComm};
    use crate::geometry::IndexBox;

    fn record(key: u32, n: usize) -> WireFabRecord {
        let region = IndexBox::from_corners([0], [n as i64 - 1]);
        WireFabRecord::new(0, key as usize, 0, 0, 0, 1, &region, n).unwrap()
    }

    #[test]
    fn loopback_on_a_single_rank() {
        let mut out = BTreeMap::new();
        out.insert(0usize, vec![Envelope::new(record(3, 2), vec![1.0f64, 2.0])]);
        let got = describe_then_transfer(out, &NoComm, ExchangeTags::from_base(CommTag::new(1)))
            .unwrap();
        assert_eq!(got[&0][0].payload, vec![1.0, 2.0]);
    }

    #[test]
    fn declared_length_must_match() {
        let mut out = BTreeMap::new();
        out.insert(1usize, vec![Envelope::new(record(0, 3), vec![1.0f64])]);
        let world = RayonComm::world(2);
        let err = describe_then_transfer(out, &world[0], ExchangeTags::from_base(CommTag::new(1)))
            .unwrap_err();
        assert!(matches!(err, FluxRegisterError::ProtocolViolation { .. }));
    }

    #[test]
    fn variable_payloads_between_two_ranks() {
        let world = RayonComm::world(2);
        let tags = ExchangeTags::from_base(CommTag::new(0x300));
        let got: Vec<_> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut out = BTreeMap::new();
                        if comm.rank() == 0 {
                            out.insert(
                                1usize,
                                vec![
                                    Envelope::new(record(10, 1), vec![7.0f64]),
                                    Envelope::new(record(11, 3), vec![1.0, 2.0, 3.0]),
                                ],
                            );
                        }
                        describe_then_transfer(out, comm, tags).unwrap()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(got[0].is_empty());
        let from0 = &got[1][&0];
        assert_eq!(from0.len(), 2);
        assert_eq!(from0[0].descriptor.key(), 10);
        assert_eq!(from0[0].payload, vec![7.0]);
        assert_eq!(from0[1].descriptor.seq(), 1);
        assert_eq!(from0[1].payload, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn peer_failing_validation_does_not_hang_the_other() {
        let world: Vec<RayonComm> = RayonComm::world(2)
            .into_iter()
            .map(|c| c.with_timeout(std::time::Duration::from_millis(50)))
            .collect();
        let tags = ExchangeTags::from_base(CommTag::new(0x310));
        let errs: Vec<FluxRegisterError> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let mut out = BTreeMap::new();
                        if comm.rank() == 0 {
                            out.insert(1usize, vec![Envelope::new(record(0, 3), vec![1.0f64])]);
                        }
                        describe_then_transfer(out, comm, tags).unwrap_err()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(matches!(errs[0], FluxRegisterError::ProtocolViolation { neighbor: 0, .. }));
        assert!(matches!(errs[1], FluxRegisterError::CommError { neighbor: 0, .. }));
    }
}
