//! Thin façade over intra-process (simulated) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**: callers `.wait()` before they trust
//! a receive. Messages between one `(src, dst, tag)` triple are delivered in
//! send order, matching MPI's non-overtaking rule.
//!
//! The two collectives the connect protocol needs (`all_to_all_counts` and
//! `all_to_all_bytes`) have default implementations layered over point-to-point
//! messaging; the MPI backend overrides them with the native calls.

use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshConnectError;
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// A typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `n` steps after this one (wrapping).
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags for each phase of cross-process face resolution, derived from one base.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConnectCommTags {
    pub sizes: CommTag,
    pub faces: CommTag,
    pub return_sizes: CommTag,
    pub return_faces: CommTag,
    pub status: CommTag,
}

impl ConnectCommTags {
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            faces: base.offset(1),
            return_sizes: base.offset(2),
            return_faces: base.offset(3),
            status: base.offset(4),
        }
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Process-group communication interface.
///
/// `rank` and `size` are fixed for the lifetime of a communicator; every
/// component receives the communicator explicitly instead of reading any
/// ambient process state.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Posts a receive. `buf.len()` is the expected message length; the
    /// delivered bytes come back from [`Wait::wait`] and the caller checks them.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Collective: rank `r` receives `send[r]` from every rank.
    ///
    /// Returns the vector of values addressed to this rank, indexed by sender.
    fn all_to_all_counts(&self, send: &[u32], tag: u16) -> Result<Vec<u32>, MeshConnectError> {
        let (me, size) = (self.rank(), self.size());
        if send.len() != size {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "count vector has {} entries for a group of {size}",
                send.len()
            )));
        }
        let mut out = vec![0u32; size];
        out[me] = send[me];

        let mut pending_recvs = Vec::with_capacity(size.saturating_sub(1));
        for peer in (0..size).filter(|&p| p != me) {
            let mut cnt = WireCount::new(0);
            let h = self.irecv(peer, tag, cast_slice_mut(std::slice::from_mut(&mut cnt)));
            pending_recvs.push((peer, h));
        }
        let mut pending_sends = Vec::with_capacity(size.saturating_sub(1));
        for peer in (0..size).filter(|&p| p != me) {
            let cnt = WireCount::new(send[peer] as usize);
            pending_sends.push(self.isend(peer, tag, cast_slice(std::slice::from_ref(&cnt))));
        }

        // wait for everything before reporting the first failure
        let mut maybe_err = None;
        for (peer, h) in pending_recvs {
            match h.wait() {
                Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                    let mut cnt = WireCount::new(0);
                    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                    out[peer] = cnt.get() as u32;
                }
                Some(data) => {
                    maybe_err.get_or_insert_with(|| {
                        MeshConnectError::comm(
                            peer,
                            format!(
                                "expected {} bytes for size header, got {}",
                                std::mem::size_of::<WireCount>(),
                                data.len()
                            ),
                        )
                    });
                }
                None => {
                    maybe_err.get_or_insert_with(|| {
                        MeshConnectError::comm(peer, format!("failed to receive size from rank {peer}"))
                    });
                }
            }
        }
        for s in pending_sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    /// Collective variable-size byte shuffle.
    ///
    /// `send_displs` and `recv_displs` are prefix-sum tables of length
    /// `size + 1`: the bytes for (or from) rank `r` occupy
    /// `displs[r]..displs[r + 1]`. Returns the receive buffer, laid out by
    /// `recv_displs`.
    fn all_to_all_bytes(
        &self,
        send: &[u8],
        send_displs: &[usize],
        recv_displs: &[usize],
        tag: u16,
    ) -> Result<Vec<u8>, MeshConnectError> {
        let (me, size) = (self.rank(), self.size());
        check_displs(send_displs, size, Some(send.len()))?;
        check_displs(recv_displs, size, None)?;
        let mut recv = vec![0u8; recv_displs[size]];
        let own = &send[send_displs[me]..send_displs[me + 1]];
        let own_dst = &mut recv[recv_displs[me]..recv_displs[me + 1]];
        if own.len() != own_dst.len() {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "rank {me} sends itself {} bytes but expects {}",
                own.len(),
                own_dst.len()
            )));
        }
        own_dst.copy_from_slice(own);

        let mut pending_recvs = Vec::new();
        for peer in (0..size).filter(|&p| p != me) {
            let range = recv_displs[peer]..recv_displs[peer + 1];
            if !range.is_empty() {
                let h = self.irecv(peer, tag, &mut recv[range.clone()]);
                pending_recvs.push((peer, range, h));
            }
        }
        let mut pending_sends = Vec::new();
        for peer in (0..size).filter(|&p| p != me) {
            let chunk = &send[send_displs[peer]..send_displs[peer + 1]];
            if !chunk.is_empty() {
                pending_sends.push(self.isend(peer, tag, chunk));
            }
        }

        let mut maybe_err = None;
        for (peer, range, h) in pending_recvs {
            match h.wait() {
                Some(data) if data.len() == range.len() => recv[range].copy_from_slice(&data),
                Some(data) => {
                    maybe_err.get_or_insert_with(|| {
                        MeshConnectError::ProtocolViolation(format!(
                            "rank {peer} declared {} bytes but delivered {}",
                            range.len(),
                            data.len()
                        ))
                    });
                }
                None => {
                    maybe_err.get_or_insert_with(|| {
                        MeshConnectError::comm(peer, "payload never arrived")
                    });
                }
            }
        }
        for s in pending_sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(recv),
        }
    }
}

fn check_displs(
    displs: &[usize],
    size: usize,
    total: Option<usize>,
) -> Result<(), MeshConnectError> {
    if displs.len() != size + 1 || displs[0] != 0 || displs.windows(2).any(|w| w[0] > w[1]) {
        return Err(MeshConnectError::ProtocolViolation(format!(
            "malformed displacement table of length {} for a group of {size}",
            displs.len()
        )));
    }
    if let Some(total) = total {
        if displs[size] != total {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "displacements cover {} bytes but the buffer holds {total}",
                displs[size]
            )));
        }
    }
    Ok(())
}

/// Compile-time no-op comm for pure serial runs: rank 0 of a group of one.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

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

// --- LocalComm: simulated process group inside one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    queues: Mutex<HashMap<Key, VecDeque<Bytes>>>,
    arrived: Condvar,
}

/// One member of an in-process group. All members created by the same
/// [`LocalComm::world`] call share a mailbox; separate worlds never interfere.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    timeout: Option<Duration>,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl LocalComm {
    /// Creates `size` connected communicators, one per simulated rank.
    pub fn world(size: usize) -> Vec<Self> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                timeout: None,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }

    /// Makes receives give up after `timeout` instead of blocking forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    timeout: Option<Duration>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        let mut queues = self.mailbox.queues.lock();
        loop {
            if let Some(bytes) = queues.get_mut(&self.key).and_then(VecDeque::pop_front) {
                return Some(bytes.to_vec());
            }
            match self.timeout {
                Some(t) => {
                    if self.mailbox.arrived.wait_for(&mut queues, t).timed_out() {
                        return None;
                    }
                }
                None => self.mailbox.arrived.wait(&mut queues),
            }
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .queues
            .lock()
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
        self.mailbox.arrived.notify_all();
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
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

/// Runs `f` once per simulated rank, each on its own thread, and returns the
/// results in rank order. A panic on any rank is re-raised here.
pub fn run_group<T, F>(size: usize, f: F) -> Vec<T>
where
    F: Fn(LocalComm) -> T + Sync,
    T: Send,
{
    let comms = LocalComm::world(size);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| s.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::Count;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{
        Communicator as _, CommunicatorCollectives as _, Destination as _, Source as _,
    };

    /// World communicator. Point-to-point calls block: `isend` returns once the
    /// send buffer is reusable, `irecv` completes the receive before returning.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshConnectError> {
            let universe = mpi::initialize().ok_or_else(|| {
                MeshConnectError::InvalidConfig("MPI was already initialized".into())
            })?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world,
                rank,
                size,
                _universe: universe,
            })
        }
    }

    pub struct MpiRecvHandle(Option<Vec<u8>>);

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    fn to_counts(displs: &[usize]) -> Result<(Vec<Count>, Vec<Count>), MeshConnectError> {
        let conv = |v: usize| {
            Count::try_from(v).map_err(|_| {
                MeshConnectError::ProtocolViolation(format!("{v} bytes exceed the MPI count range"))
            })
        };
        let counts = displs
            .windows(2)
            .map(|w| conv(w[1] - w[0]))
            .collect::<Result<Vec<_>, _>>()?;
        let offsets = displs[..displs.len() - 1]
            .iter()
            .map(|&d| conv(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((counts, offsets))
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            MpiRecvHandle(Some(data))
        }

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn all_to_all_counts(&self, send: &[u32], _tag: u16) -> Result<Vec<u32>, MeshConnectError> {
            if send.len() != self.size {
                return Err(MeshConnectError::ProtocolViolation(format!(
                    "count vector has {} entries for a group of {}",
                    send.len(),
                    self.size
                )));
            }
            let mut recv = vec![0u32; self.size];
            self.world.all_to_all_into(send, &mut recv[..]);
            Ok(recv)
        }

        fn all_to_all_bytes(
            &self,
            send: &[u8],
            send_displs: &[usize],
            recv_displs: &[usize],
            _tag: u16,
        ) -> Result<Vec<u8>, MeshConnectError> {
            check_displs(send_displs, self.size, Some(send.len()))?;
            check_displs(recv_displs, self.size, None)?;
            let (sc, sd) = to_counts(send_displs)?;
            let (rc, rd) = to_counts(recv_displs)?;
            let mut recv = vec![0u8; recv_displs[self.size]];
            {
                let send_part = Partition::new(send, &sc[..], &sd[..]);
                let mut recv_part = PartitionMut::new(&mut recv[..], &rc[..], &rd[..]);
                self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
            }
            Ok(recv)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
