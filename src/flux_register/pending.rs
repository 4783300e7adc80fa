//! Buffered coarse-flux writes destined for boxes owned by other ranks.

use std::collections::BTreeMap;

use crate::Real;
use crate::algs::exchange::Envelope;
use crate::algs::wire::WireFabRecord;
use crate::flux_error::FluxRegisterError;
use crate::geometry::{IndexBox, Orientation};

/// One deferred write: overwrite `region` of Face Storage `face`, box
/// `box_index`, components `[dest_comp, dest_comp + ncomp)` with `data`
/// (already scaled, component-major).
#[derive(Clone, Debug)]
pub(crate) struct PendingContribution<const D: usize> {
    pub dest: usize,
    pub box_index: usize,
    pub face: Orientation,
    pub region: IndexBox<D>,
    pub dest_comp: usize,
    pub ncomp: usize,
    pub data: Vec<Real>,
}

/// Contributions in insertion order.
#[derive(Clone, Debug, Default)]
pub(crate) struct PendingBuffer<const D: usize> {
    entries: Vec<PendingContribution<D>>,
}

impl<const D: usize> PendingBuffer<D> {
    pub fn push(&mut self, c: PendingContribution<D>) {
        self.entries.push(c);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingContribution<D>> {
        self.entries.iter()
    }

    /// Empty the buffer into per-destination envelope lists. Within a
    /// destination, envelopes keep insertion order; `sender` is stamped into
    /// every record so the owner can check where a write came from.
    pub fn drain_envelopes(
        &mut self,
        sender: usize,
    ) -> Result<BTreeMap<usize, Vec<Envelope<WireFabRecord, Real>>>, FluxRegisterError> {
        let mut out: BTreeMap<usize, Vec<Envelope<WireFabRecord, Real>>> = BTreeMap::new();
        for c in std::mem::take(&mut self.entries) {
            let rec = WireFabRecord::new(
                c.dest,
                c.face.index::<D>(),
                sender,
                c.box_index,
                c.dest_comp,
                c.ncomp,
                &c.region,
                c.data.len(),
            )?;
            out.entry(c.dest)
                .or_default()
                .push(Envelope::new(rec, c.data));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contribution(dest: usize, box_index: usize, v: Real) -> PendingContribution<2> {
        PendingContribution {
            dest,
            box_index,
            face: Orientation::high(1),
            region: IndexBox::from_corners([0, 3], [1, 3]).surrounding_nodes(1),
            dest_comp: 0,
            ncomp: 1,
            data: vec![v; 4],
        }
    }

    #[test]
    fn drain_groups_by_destination_in_insertion_order() {
        let mut buf = PendingBuffer::default();
        buf.push(contribution(2, 5, 1.0));
        buf.push(contribution(1, 0, 2.0));
        buf.push(contribution(2, 3, 3.0));
        let out = buf.drain_envelopes(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(out[&1].len(), 1);
        let to2: Vec<usize> = out[&2].iter().map(|e| e.descriptor.box_index()).collect();
        assert_eq!(to2, vec![5, 3]);
        assert_eq!(out[&2][1].payload, vec![3.0; 4]);
        assert_eq!(out[&2][0].descriptor.key() as usize, Orientation::high(1).index::<2>());
        assert_eq!(out[&2][0].descriptor.source(), 0);
    }
}
