//! CopyDescriptor: batched remote fetch of patch data from distributed
//! arrays.
//!
//! Usage is two-phase and collective:
//! 1. `register` each source [`FabArray`] (every rank in the same order) and
//!    `add_box` one request per (source, box, region, components);
//! 2. `collect` on every rank, which ships requests to owners and replies
//!    back in one batched round; then `fill` (or `take`) each request.
//!
//! Requests for locally owned boxes are resolved without messaging.

use std::collections::BTreeMap;

use crate::Real;
use crate::algs::communicator::{CommTag, Communicator, ExchangeTags};
use crate::algs::exchange::{Envelope, describe_then_transfer};
use crate::algs::wire::WireFabRecord;
use crate::data::fab::{FArrayBox, check_components, check_contains};
use crate::data::fab_array::FabArray;
use crate::flux_error::FluxRegisterError;
use crate::geometry::IndexBox;

/// Handle of a registered source array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceId(usize);

/// Handle of one fetch request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FetchId(usize);

impl FetchId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Tags for the request and reply exchanges of one `collect`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FetchTags {
    pub request: ExchangeTags,
    pub reply: ExchangeTags,
}

impl FetchTags {
    /// Six consecutive tags starting at `base`.
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            request: ExchangeTags::from_base(base),
            reply: ExchangeTags::from_base(base.offset(3)),
        }
    }
}

#[derive(Clone, Debug)]
struct FetchRequest<const D: usize> {
    source: usize,
    box_index: usize,
    region: IndexBox<D>,
    comp: usize,
    ncomp: usize,
}

pub struct CopyDescriptor<'a, const D: usize> {
    sources: Vec<&'a FabArray<D>>,
    requests: Vec<FetchRequest<D>>,
    resolved: Vec<Option<FArrayBox<D>>>,
}

impl<const D: usize> Default for CopyDescriptor<'_, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, const D: usize> CopyDescriptor<'a, D> {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            requests: Vec::new(),
            resolved: Vec::new(),
        }
    }

    pub fn register(&mut self, src: &'a FabArray<D>) -> SourceId {
        self.sources.push(src);
        SourceId(self.sources.len() - 1)
    }

    /// Register interest in components `[comp, comp + ncomp)` of box
    /// `box_index` of `src`, restricted to `region`.
    pub fn add_box(
        &mut self,
        src: SourceId,
        region: IndexBox<D>,
        box_index: usize,
        comp: usize,
        ncomp: usize,
    ) -> Result<FetchId, FluxRegisterError> {
        let fa = self
            .sources
            .get(src.0)
            .ok_or(FluxRegisterError::UnknownFetch(src.0))?;
        check_components(comp, ncomp, fa.n_comp())?;
        check_contains(fa.index_box(box_index)?, &region)?;
        self.requests.push(FetchRequest {
            source: src.0,
            box_index,
            region,
            comp,
            ncomp,
        });
        self.resolved.clear();
        Ok(FetchId(self.requests.len() - 1))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Resolve every registered request. Collective: all ranks must call it,
    /// including ranks with no requests of their own, since they may own
    /// data others asked for.
    pub fn collect<C>(&mut self, comm: &C, tags: FetchTags) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        let me = comm.rank();
        let mut resolved: Vec<Option<FArrayBox<D>>> = (0..self.requests.len()).map(|_| None).collect();
        let mut outgoing: BTreeMap<usize, Vec<Envelope<WireFabRecord, Real>>> = BTreeMap::new();

        for (slot, req) in self.requests.iter().enumerate() {
            let src = self.sources[req.source];
            let owner = src.distribution_map().try_owner(req.box_index)?;
            if owner == me {
                let fab = src.get(req.box_index)?;
                resolved[slot] = Some(fab.sub_box(&req.region, req.comp, req.ncomp)?);
            } else {
                let rec = WireFabRecord::new(
                    owner,
                    slot,
                    req.source,
                    req.box_index,
                    req.comp,
                    req.ncomp,
                    &req.region,
                    0,
                )?;
                outgoing
                    .entry(owner)
                    .or_default()
                    .push(Envelope::new(rec, Vec::new()));
            }
        }
        let remote: usize = outgoing.values().map(Vec::len).sum();
        log::debug!(
            "rank {me}: fetch of {} patches, {remote} remote",
            self.requests.len()
        );

        // requests travel to owners ...
        let requests_in = describe_then_transfer(outgoing, comm, tags.request)?;

        // ... which answer from their local patches ...
        let mut replies: BTreeMap<usize, Vec<Envelope<WireFabRecord, Real>>> = BTreeMap::new();
        for (peer, envelopes) in requests_in {
            for env in envelopes {
                let rec = env.descriptor;
                let region = rec
                    .region::<D>()
                    .map_err(|reason| FluxRegisterError::ProtocolViolation { neighbor: peer, reason })?;
                let src = self.sources.get(rec.source() as usize).ok_or_else(|| {
                    FluxRegisterError::ProtocolViolation {
                        neighbor: peer,
                        reason: format!("request names unregistered source {}", rec.source()),
                    }
                })?;
                let data = src
                    .get(rec.box_index())?
                    .extract(&region, rec.comp(), rec.ncomp())?;
                let reply = WireFabRecord::new(
                    peer,
                    rec.key() as usize,
                    rec.source() as usize,
                    rec.box_index(),
                    rec.comp(),
                    rec.ncomp(),
                    &region,
                    data.len(),
                )?;
                replies
                    .entry(peer)
                    .or_default()
                    .push(Envelope::new(reply, data));
            }
        }

        // ... and replies travel back.
        let answers = describe_then_transfer(replies, comm, tags.reply)?;
        for (peer, envelopes) in answers {
            for env in envelopes {
                let rec = env.descriptor;
                let slot = rec.key() as usize;
                let req = self.requests.get(slot).ok_or_else(|| FluxRegisterError::ProtocolViolation {
                    neighbor: peer,
                    reason: format!("reply for unknown request {slot}"),
                })?;
                let region = rec
                    .region::<D>()
                    .map_err(|reason| FluxRegisterError::ProtocolViolation { neighbor: peer, reason })?;
                if region != req.region
                    || rec.box_index() != req.box_index
                    || rec.source() as usize != req.source
                    || rec.ncomp() != req.ncomp
                {
                    return Err(FluxRegisterError::ProtocolViolation {
                        neighbor: peer,
                        reason: format!(
                            "reply {region} (box {}) does not match request {} (box {})",
                            rec.box_index(),
                            req.region,
                            req.box_index
                        ),
                    });
                }
                if resolved[slot].is_some() {
                    return Err(FluxRegisterError::ProtocolViolation {
                        neighbor: peer,
                        reason: format!("duplicate reply for request {slot}"),
                    });
                }
                resolved[slot] = Some(FArrayBox::from_packed(region, req.ncomp, env.payload)?);
            }
        }

        if let Some(slot) = resolved.iter().position(Option::is_none) {
            let owner = self.sources[self.requests[slot].source]
                .distribution_map()
                .try_owner(self.requests[slot].box_index)?;
            return Err(FluxRegisterError::ProtocolViolation {
                neighbor: owner,
                reason: format!("request {slot} was never answered"),
            });
        }
        self.resolved = resolved;
        Ok(())
    }

    /// Materialize a collected request.
    pub fn fill(&self, id: FetchId) -> Result<&FArrayBox<D>, FluxRegisterError> {
        self.resolved
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(FluxRegisterError::UnknownFetch(id.0))
    }

    /// Move a collected patch out of the descriptor.
    pub fn take(&mut self, id: FetchId) -> Result<FArrayBox<D>, FluxRegisterError> {
        self.resolved
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(FluxRegisterError::UnknownFetch(id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, RayonComm};
    use crate::data::distribution::DistributionMapping;
    use crate::geometry::BoxArray;

    fn line(rank: usize) -> FabArray<1> {
        let ba = BoxArray::new(vec![
            IndexBox::from_corners([0], [3]),
            IndexBox::from_corners([4], [7]),
        ]);
        FabArray::from_fn(ba, DistributionMapping::round_robin(2, 2), 1, rank, |_, fab| {
            let bx = *fab.index_box();
            for p in bx.iter() {
                fab.set(&p, 0, p[0] as Real);
            }
        })
        .unwrap()
    }

    #[test]
    fn fill_before_collect_is_an_error() {
        let fa = line(0);
        let mut cd = CopyDescriptor::new();
        let s = cd.register(&fa);
        let id = cd.add_box(s, IndexBox::from_corners([1], [2]), 0, 0, 1).unwrap();
        assert_eq!(cd.fill(id).unwrap_err(), FluxRegisterError::UnknownFetch(0));
    }

    #[test]
    fn add_box_checks_region() {
        let fa = line(0);
        let mut cd = CopyDescriptor::new();
        let s = cd.register(&fa);
        assert!(cd.add_box(s, IndexBox::from_corners([3], [5]), 0, 0, 1).is_err());
        assert!(cd.add_box(s, IndexBox::from_corners([1], [2]), 0, 0, 2).is_err());
    }

    #[test]
    fn local_fetch_on_one_rank() {
        let ba = BoxArray::new(vec![IndexBox::from_corners([0], [3])]);
        let fa = FabArray::from_fn(ba, DistributionMapping::single(1, 0), 1, 0, |_, fab| fab.set_val(2.0))
            .unwrap();
        let mut cd = CopyDescriptor::new();
        let s = cd.register(&fa);
        let id = cd.add_box(s, IndexBox::from_corners([2], [3]), 0, 0, 1).unwrap();
        cd.collect(&NoComm, FetchTags::from_base(CommTag::new(0x40))).unwrap();
        assert_eq!(cd.fill(id).unwrap().as_slice(), &[2.0, 2.0]);
    }

    #[test]
    fn cross_rank_fetch() {
        let world = RayonComm::world(2);
        let tags = FetchTags::from_base(CommTag::new(0x50));
        let got: Vec<Vec<Real>> = std::thread::scope(|s| {
            let hs: Vec<_> = world
                .iter()
                .map(|comm| {
                    s.spawn(move || {
                        let fa = line(comm.rank());
                        let mut cd = CopyDescriptor::new();
                        let src = cd.register(&fa);
                        // each rank asks for the other rank's box
                        let other = 1 - comm.rank();
                        let region = fa.index_box(other).unwrap().grow(-1);
                        let id = cd.add_box(src, region, other, 0, 1).unwrap();
                        cd.collect(comm, tags).unwrap();
                        let fab = cd.fill(id).unwrap();
                        region.iter().map(|p| fab.get(&p, 0)).collect()
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(got[0], vec![5.0, 6.0]);
        assert_eq!(got[1], vec![1.0, 2.0]);
    }
}
