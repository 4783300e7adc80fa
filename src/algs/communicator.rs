//! Thin façade over intra-process (threaded ranks) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking: the exchange layer calls
//! `.wait()` before it trusts that a buffer is ready, and always drains every
//! handle it created, even on error.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Non-blocking point-to-point communication.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// Post a send of `buf` to `peer`. The bytes are copied before returning.
    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `buf.len()` bytes from `peer`; the data is
    /// returned by `wait()`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This process's rank in `[0, size)`.
    fn rank(&self) -> usize;
    /// Number of participating ranks (fixed for the communicator's lifetime).
    fn size(&self) -> usize;

    /// Collective synchronisation point. Backends without a global clock may
    /// leave this empty.
    fn barrier(&self) {}
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Message tag. Distinct protocol phases use distinct tags so that messages
/// of consecutive phases can never be confused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }

    /// Tag `n` steps after this one.
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags for one describe-then-transfer exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExchangeTags {
    pub sizes: CommTag,
    pub descriptors: CommTag,
    pub payload: CommTag,
}

impl ExchangeTags {
    /// Three consecutive tags starting at `base`.
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            descriptors: base.offset(1),
            payload: base.offset(2),
        }
    }
}

/// Compile-time no-op comm for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }
}

// --- RayonComm: intra-process ranks on separate threads ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

static MAILBOX: Lazy<Arc<Mailbox>> = Lazy::new(|| Arc::new(DashMap::new()));

/// How long a [`RayonComm`] receive waits before giving up.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// Receive handle of [`RayonComm`]; `wait` spins until the matching message
/// arrives or the timeout expires. Messages between one (src, dst, tag)
/// triple are FIFO.
///
/// `wait` yields `None` on timeout and for a message longer than the posted
/// buffer; the exchange layer reports both as a communication error.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
    timeout: Duration,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let (src, dst, tag) = self.key;
        let deadline = Instant::now() + self.timeout;
        loop {
            let popped = self
                .mailbox
                .get_mut(&self.key)
                .and_then(|mut q| q.pop_front());
            if let Some(bytes) = popped {
                if bytes.len() > self.len {
                    log::warn!(
                        "rank {dst}: message from rank {src} (tag {tag}) is {} bytes, buffer holds {}",
                        bytes.len(),
                        self.len
                    );
                    return None;
                }
                return Some(bytes.to_vec());
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "rank {dst}: no message from rank {src} (tag {tag}) after {:?}",
                    self.timeout
                );
                return None;
            }
            std::thread::yield_now();
        }
    }
}

/// In-process communicator: each rank runs on its own thread and ranks meet
/// in a shared mailbox. Sends never block.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl RayonComm {
    /// Rank `rank` of `size` on the process-wide mailbox. Tests sharing it
    /// must use disjoint tags (or run serially).
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            rank,
            size,
            mailbox: Arc::clone(&MAILBOX),
            timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// A fresh, isolated world of `size` ranks.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox: Arc<Mailbox> = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout: DEFAULT_RECV_TIMEOUT,
            })
            .collect()
    }

    /// Same rank and mailbox, with receives abandoned after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
            timeout: self.timeout,
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::request::StaticScope;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    struct World(SimpleCommunicator);

    // The communicator handle is only driven from the rank's own thread; the
    // wrapper exists so handles can carry it.
    unsafe impl Send for World {}
    unsafe impl Sync for World {}

    #[derive(Clone)]
    pub struct MpiComm {
        world: Arc<World>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Wrap `MPI_COMM_WORLD` of an initialised universe. The universe must
        /// outlive every use of the communicator.
        pub fn new(universe: &Universe) -> Self {
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                world: Arc::new(World(world)),
                rank,
                size,
            }
        }
    }

    /// Pending synchronous-mode send; completes once the peer has matched it.
    pub struct MpiSendHandle(Option<Box<dyn FnOnce()>>);

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(finish) = self.0.take() {
                finish();
            }
            None
        }
    }

    /// Deferred receive; the matching blocking receive runs in `wait`.
    pub struct MpiRecvHandle {
        world: Arc<World>,
        peer: i32,
        tag: i32,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .0
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            if data.len() > self.len {
                log::warn!(
                    "message from rank {} (tag {}) is {} bytes, buffer holds {}",
                    self.peer,
                    self.tag,
                    data.len(),
                    self.len
                );
                return None;
            }
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            // The request needs a buffer that outlives this call; it is
            // reclaimed after the request completes.
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            let data: &'static [u8] = unsafe { &*raw };
            let req = self
                .world
                .0
                .process_at_rank(peer as i32)
                .immediate_synchronous_send_with_tag(StaticScope, data, tag as i32);
            MpiSendHandle(Some(Box::new(move || {
                req.wait();
                drop(unsafe { Box::from_raw(raw) });
            })))
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: tag as i32,
                len: buf.len(),
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) {
            self.world.0.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        let mut recv_buf = [0u8; 4];
        let recv_handle = comm1.irecv(0, 7, &mut recv_buf);
        let send_handle = comm0.isend(1, 7, &[1, 2, 3, 4]);
        send_handle.wait();

        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn worlds_do_not_share_mailboxes() {
        let a = RayonComm::world(2);
        let b = RayonComm::world(2);
        a[0].isend(1, 3, &[1]);
        b[0].isend(1, 3, &[2]);
        let mut buf = [0u8; 1];
        assert_eq!(b[1].irecv(0, 3, &mut buf).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 3, &mut buf).wait(), Some(vec![1]));
    }

    #[test]
    fn no_comm_is_a_single_rank() {
        let c = NoComm;
        assert_eq!((c.rank(), c.size()), (0, 1));
        let mut buf = [0u8; 2];
        assert_eq!(c.irecv(0, 1, &mut buf).wait(), None);
    }

    #[test]
    fn tag_offsets_wrap() {
        let t = ExchangeTags::from_base(CommTag::new(u16::MAX));
        assert_eq!(t.descriptors, CommTag::new(0));
        assert_eq!(t.payload, CommTag::new(1));
    }

    #[test]
    fn silent_peer_times_out() {
        let world: Vec<RayonComm> = RayonComm::world(2)
            .into_iter()
            .map(|c| c.with_timeout(Duration::from_millis(20)))
            .collect();
        let mut buf = [0u8; 4];
        let start = Instant::now();
        assert_eq!(world[1].irecv(0, 11, &mut buf).wait(), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
