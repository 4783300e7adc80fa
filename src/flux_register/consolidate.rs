//! Consolidation: deliver buffered `crse_init` writes to their owners.
//!
//! The buffered writes travel through
//! [`describe_then_transfer`](crate::algs::exchange::describe_then_transfer):
//! one [`WireFabRecord`] per write (orientation, box, destination
//! components, region, sending rank) followed by its values. The owner
//! re-validates every record against its own Face Storage before writing.

use crate::Real;
use crate::algs::communicator::Communicator;
use crate::algs::exchange::{Envelope, describe_then_transfer};
use crate::algs::wire::WireFabRecord;
use crate::data::fab::{FArrayBox, check_components, check_contains};
use crate::debug_invariants::DebugInvariants;
use crate::flux_error::FluxRegisterError;
use crate::geometry::Orientation;

use super::{CycleState, FluxRegister};

impl<const D: usize> FluxRegister<D> {
    /// Close the accumulation cycle.
    ///
    /// Collective: every rank calls it once per cycle, whether or not it
    /// buffered anything. On one rank there is nothing to move and the call
    /// only closes the cycle. If the exchange fails the register stays in
    /// [`CycleState::Consolidating`] and refuses further accumulation.
    pub fn crse_init_finish<C>(&mut self, comm: &C) -> Result<(), FluxRegisterError>
    where
        C: Communicator,
    {
        self.ensure_defined()?;
        self.ensure_writable()?;

        if comm.size() <= 1 {
            if !self.pending.is_empty() {
                return Err(FluxRegisterError::ProtocolViolation {
                    neighbor: self.rank,
                    reason: format!(
                        "{} contributions for other ranks on a single-rank communicator",
                        self.pending.len()
                    ),
                });
            }
            self.cycle = CycleState::Idle;
            return Ok(());
        }
        if comm.rank() != self.rank {
            return Err(FluxRegisterError::ProtocolViolation {
                neighbor: comm.rank(),
                reason: format!("register defined for rank {}", self.rank),
            });
        }

        self.cycle = CycleState::Consolidating;
        let outgoing = self.pending.drain_envelopes(self.rank)?;
        log::debug!(
            "rank {}: consolidating, sending {:?}",
            self.rank,
            outgoing.iter().map(|(r, v)| (*r, v.len())).collect::<Vec<_>>()
        );

        let incoming = describe_then_transfer(outgoing, comm, self.tags.consolidate)?;
        let mut applied = 0usize;
        for (peer, envelopes) in incoming {
            for env in envelopes {
                self.unpack(peer, env)?;
                applied += 1;
            }
        }
        log::debug!("rank {}: consolidation applied {applied} contributions", self.rank);

        self.cycle = CycleState::Idle;
        self.debug_assert_invariants();
        Ok(())
    }

    /// Write one received contribution into local Face Storage.
    fn unpack(
        &mut self,
        peer: usize,
        env: Envelope<WireFabRecord, Real>,
    ) -> Result<(), FluxRegisterError> {
        let rec = env.descriptor;
        let violation = |reason: String| FluxRegisterError::ProtocolViolation {
            neighbor: peer,
            reason,
        };
        let region = rec.region::<D>().map_err(violation)?;
        let face = Orientation::from_index::<D>(rec.key() as usize)
            .ok_or_else(|| violation(format!("orientation index {} out of range", rec.key())))?;
        if rec.source() as usize != peer {
            return Err(violation(format!(
                "record claims sender {} but came from rank {peer}",
                rec.source()
            )));
        }
        let ncomp = rec.ncomp();
        let expected = region.num_pts() * ncomp;
        if env.payload.len() != expected {
            return Err(violation(format!(
                "{} values for {region} x {ncomp} comps (expected {expected})",
                env.payload.len()
            )));
        }
        check_components(rec.comp(), ncomp, self.ncomp)?;

        let fab = self.bndry[face.index::<D>()].get_mut(rec.box_index())?;
        check_contains(fab.index_box(), &region)?;
        let patch = FArrayBox::from_packed(region, ncomp, env.payload)?;
        fab.copy_from(&patch, &region, 0, rec.comp(), ncomp)?;
        log::trace!(
            "rank {}: unpacked {face} box {} {region} from rank {peer}",
            self.rank,
            rec.box_index()
        );
        Ok(())
    }
}
