//! Box-to-rank ownership map shared by every rank.

use crate::flux_error::FluxRegisterError;

/// `owners[k]` is the rank that owns (and alone may mutate) box `k`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionMapping {
    owners: Vec<usize>,
}

impl DistributionMapping {
    pub fn new(owners: Vec<usize>) -> Self {
        Self { owners }
    }

    /// Deal `nboxes` boxes to `nprocs` ranks in turn.
    pub fn round_robin(nboxes: usize, nprocs: usize) -> Self {
        let nprocs = nprocs.max(1);
        Self::new((0..nboxes).map(|k| k % nprocs).collect())
    }

    /// Every box on one rank (serial runs).
    pub fn single(nboxes: usize, rank: usize) -> Self {
        Self::new(vec![rank; nboxes])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    #[inline]
    pub fn owner(&self, k: usize) -> Option<usize> {
        self.owners.get(k).copied()
    }

    pub fn try_owner(&self, k: usize) -> Result<usize, FluxRegisterError> {
        self.owner(k).ok_or(FluxRegisterError::BoxIndexOutOfRange {
            index: k,
            len: self.owners.len(),
        })
    }

    /// Box indices owned by `rank`, ascending.
    pub fn local_indices(&self, rank: usize) -> impl Iterator<Item = usize> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(move |&(_, &r)| r == rank)
            .map(|(k, _)| k)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.owners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_deals_in_turn() {
        let dm = DistributionMapping::round_robin(5, 2);
        assert_eq!(dm.as_slice(), &[0, 1, 0, 1, 0]);
        assert_eq!(dm.local_indices(1).collect::<Vec<_>>(), vec![1, 3]);
        assert!(dm.try_owner(5).is_err());
    }
}
