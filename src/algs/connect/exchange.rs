//! Exchange engine: size-negotiated all-to-all shuffle of face descriptors.
//!
//! 1. Encode the per-destination buckets back to back and count bytes per
//!    destination (the send-size vector).
//! 2. All-to-all the send sizes so every rank learns its receive sizes.
//! 3. Build prefix-sum displacement tables for both sides, shuffle the bytes,
//!    then decode what arrived.
//!
//! Every rank takes part in both collectives even when it has nothing to
//! send; validation of what arrived happens only after the shuffle so that
//! one bad peer cannot leave the others waiting at a barrier.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{LONELY_FACE_WIRE_SIZE, decode_lonely_faces, put_lonely_face};
use crate::mesh_error::MeshConnectError;
use crate::topology::lonely_face::LonelyFace;
use bytes::BytesMut;
use std::ops::Range;

/// Prefix sums over per-rank byte counts: rank `r` owns `[d[r], d[r + 1])`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Displacements(Vec<usize>);

impl Displacements {
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut displs = vec![0];
        let mut total = 0;
        for c in counts {
            total += c;
            displs.push(total);
        }
        Self(displs)
    }

    #[inline]
    pub fn total(&self) -> usize {
        *self.0.last().unwrap_or(&0)
    }

    #[inline]
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.0[rank]..self.0[rank + 1]
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

/// Encoded descriptors ready for the shuffle.
#[derive(Clone, Debug)]
pub struct OutgoingRecords {
    bytes: BytesMut,
    displs: Displacements,
}

impl OutgoingRecords {
    /// Packs `per_dest[r]` for every rank `r`, in rank order.
    pub fn encode(per_dest: &[Vec<LonelyFace>]) -> Result<Self, MeshConnectError> {
        let total: usize = per_dest.iter().map(Vec::len).sum();
        let mut bytes = BytesMut::with_capacity(total * LONELY_FACE_WIRE_SIZE);
        for bucket in per_dest {
            for face in bucket {
                put_lonely_face(&mut bytes, face)?;
            }
        }
        let displs =
            Displacements::from_counts(per_dest.iter().map(|b| b.len() * LONELY_FACE_WIRE_SIZE));
        Ok(Self { bytes, displs })
    }

    /// Byte count addressed to each rank.
    pub fn send_counts(&self) -> Result<Vec<u32>, MeshConnectError> {
        let n = self.displs.as_slice().len() - 1;
        (0..n)
            .map(|r| {
                let len = self.displs.range(r).len();
                u32::try_from(len).map_err(|_| {
                    MeshConnectError::ProtocolViolation(format!(
                        "{len} bytes for rank {r} exceed the 32-bit size exchange"
                    ))
                })
            })
            .collect()
    }

    pub fn n_records(&self) -> usize {
        self.displs.total() / LONELY_FACE_WIRE_SIZE
    }
}

/// Runs the size exchange and byte shuffle for already-encoded records and
/// returns every descriptor addressed to this rank, grouped by sender rank.
pub fn exchange_encoded<C: Communicator>(
    outgoing: &OutgoingRecords,
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
) -> Result<Vec<LonelyFace>, MeshConnectError> {
    if outgoing.displs.as_slice().len() != comm.size() + 1 {
        return Err(MeshConnectError::ProtocolViolation(format!(
            "records bucketed for {} ranks in a group of {}",
            outgoing.displs.as_slice().len() - 1,
            comm.size()
        )));
    }
    let send_counts = outgoing.send_counts()?;
    let recv_counts = comm.all_to_all_counts(&send_counts, size_tag.as_u16())?;
    let recv_displs = Displacements::from_counts(recv_counts.iter().map(|&c| c as usize));
    log::debug!(
        "rank {}: sending {} bytes, receiving {} bytes",
        comm.rank(),
        outgoing.displs.total(),
        recv_displs.total()
    );

    let recv = comm.all_to_all_bytes(
        &outgoing.bytes,
        outgoing.displs.as_slice(),
        recv_displs.as_slice(),
        data_tag.as_u16(),
    )?;

    for (src, &count) in recv_counts.iter().enumerate() {
        if count as usize % LONELY_FACE_WIRE_SIZE != 0 {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "rank {src} declared {count} bytes, not a whole number of descriptors"
            )));
        }
    }
    decode_lonely_faces(&recv)
}

/// Encodes `per_dest` and delivers it; see [`exchange_encoded`].
pub fn exchange_lonely_faces<C: Communicator>(
    per_dest: &[Vec<LonelyFace>],
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
) -> Result<Vec<LonelyFace>, MeshConnectError> {
    let outgoing = OutgoingRecords::encode(per_dest)?;
    exchange_encoded(&outgoing, comm, size_tag, data_tag)
}

/// Group-wide decision on a per-rank outcome.
///
/// Every rank contributes one flag through a collective; if any rank failed,
/// every rank returns an error: its own error if it had one, otherwise
/// [`MeshConnectError::GroupAbort`] naming the failed ranks.
pub fn agree_on_error<C, T>(
    comm: &C,
    local: Result<T, MeshConnectError>,
    tag: CommTag,
) -> Result<T, MeshConnectError>
where
    C: Communicator,
{
    let flag = u32::from(local.is_err());
    let flags = comm.all_to_all_counts(&vec![flag; comm.size()], tag.as_u16())?;
    let failed: Vec<usize> = flags
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f != 0)
        .map(|(r, _)| r)
        .collect();
    match local {
        Err(err) => Err(err),
        Ok(v) if failed.is_empty() => Ok(v),
        Ok(_) => {
            log::warn!("rank {} aborting: ranks {failed:?} failed", comm.rank());
            Err(MeshConnectError::GroupAbort { ranks: failed })
        }
    }
}
