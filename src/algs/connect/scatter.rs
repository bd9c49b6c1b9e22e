//! Return matched descriptors to the ranks that discovered them, and fold
//! the partners they carry into the local fragment.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::connect::exchange::{OutgoingRecords, exchange_encoded};
use crate::mesh_error::MeshConnectError;
use crate::topology::fragment::MeshFragment;
use crate::topology::lonely_face::LonelyFace;
use crate::topology::triangle::NFACES;

/// Every descriptor must name a rank of this group as its origin.
pub fn check_origins(pool: &[LonelyFace], size: usize) -> Result<(), MeshConnectError> {
    match pool.iter().find(|f| f.rank >= size) {
        Some(f) => Err(MeshConnectError::ProtocolViolation(format!(
            "descriptor claims origin rank {} in a group of {size}",
            f.rank
        ))),
        None => Ok(()),
    }
}

/// Buckets the lonely descriptors of `pool` by origin rank and encodes
/// them for the return shuffle. Closed markers stay with the owner.
pub fn encode_returns(pool: &[LonelyFace], size: usize) -> Result<OutgoingRecords, MeshConnectError> {
    check_origins(pool, size)?;
    let mut per_origin = vec![Vec::new(); size];
    for face in pool.iter().filter(|f| !f.locally_closed) {
        per_origin[face.rank].push(*face);
    }
    OutgoingRecords::encode(&per_origin)
}

/// Sends each lonely descriptor in `pool` back to `descriptor.rank`.
///
/// Collective: every rank must call this, even with an empty pool. The
/// encoding step runs before any message is posted, so callers that need a
/// group-wide decision on it use [`encode_returns`] and
/// [`exchange_encoded`] separately.
pub fn scatter_back<C: Communicator>(
    pool: &[LonelyFace],
    comm: &C,
    size_tag: CommTag,
    data_tag: CommTag,
) -> Result<Vec<LonelyFace>, MeshConnectError> {
    let outgoing = encode_returns(pool, comm.size())?;
    exchange_encoded(&outgoing, comm, size_tag, data_tag)
}

/// Writes the remote partners of `returned` into `fragment`.
///
/// Every record must originate from rank `me` and describe a face that is
/// still open locally with the same vertices. Returns how many faces gained
/// a remote neighbor.
pub fn fold_resolved(
    fragment: &mut MeshFragment,
    returned: &[LonelyFace],
    me: usize,
) -> Result<usize, MeshConnectError> {
    let mut resolved = 0;
    for rec in returned {
        if rec.locally_closed
            || rec.rank != me
            || rec.element >= fragment.n_elements()
            || rec.face >= NFACES
        {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "rank {me} got back a descriptor for rank {} element {} face {}",
                rec.rank, rec.element, rec.face
            )));
        }
        let (v1, v2) = fragment.face_vertices(rec.element, rec.face);
        if (v1, v2) != (rec.v1, rec.v2) {
            return Err(MeshConnectError::ProtocolViolation(format!(
                "descriptor for element {} face {} carries ({}, {}), fragment has ({v1}, {v2})",
                rec.element, rec.face, rec.v1, rec.v2
            )));
        }
        if let Some(nb) = rec.neighbor {
            fragment.set_remote_neighbor(rec.element, rec.face, nb)?;
            resolved += 1;
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::run_group;
    use crate::topology::lonely_face::RemoteNeighbor;

    fn single(e_to_v: [u64; 3]) -> MeshFragment {
        MeshFragment::try_new(vec![0.0; 3], vec![0.0; 3], e_to_v.to_vec(), vec![0; 3]).unwrap()
    }

    #[test]
    fn records_go_home() {
        let back = run_group(2, |comm| {
            // both ranks hold one record from each origin
            let pool = vec![
                LonelyFace::new(comm.rank(), 0, 1, 2, 0),
                LonelyFace::new(comm.rank(), 1, 2, 3, 1),
                LonelyFace::closed_marker(comm.rank(), 2, 3, 4, 0),
            ];
            scatter_back(&pool, &comm, CommTag::new(20), CommTag::new(21)).unwrap()
        });
        assert!(back[0].iter().all(|f| f.rank == 0 && f.face == 0));
        assert!(back[1].iter().all(|f| f.rank == 1 && f.face == 1));
        assert_eq!(back[0].len(), 2);
        assert!(back.iter().flatten().all(|f| !f.locally_closed));
    }

    #[test]
    fn folding_sets_remote_neighbor() {
        let mut frag = single([4, 7, 9]);
        let mut rec = LonelyFace::new(0, 0, 4, 7, 0);
        let nb = RemoteNeighbor { rank: 1, element: 3, face: 2 };
        rec.neighbor = Some(nb);
        let open = LonelyFace::new(0, 1, 7, 9, 0);
        assert_eq!(fold_resolved(&mut frag, &[rec, open], 0).unwrap(), 1);
        assert_eq!(frag.remote_neighbor(0, 0), Some(nb));
        assert_eq!(frag.boundary_faces().count(), 2);
    }

    #[test]
    fn folding_rejects_foreign_or_stale_records() {
        let mut frag = single([4, 7, 9]);
        assert!(fold_resolved(&mut frag, &[LonelyFace::new(0, 0, 4, 7, 1)], 0).is_err());
        assert!(fold_resolved(&mut frag, &[LonelyFace::new(0, 0, 7, 4, 0)], 0).is_err());
        assert!(fold_resolved(&mut frag, &[LonelyFace::new(2, 0, 4, 7, 0)], 0).is_err());
    }

    #[test]
    fn origin_check() {
        assert!(check_origins(&[LonelyFace::new(0, 0, 1, 2, 1)], 2).is_ok());
        assert!(check_origins(&[LonelyFace::new(0, 0, 1, 2, 2)], 2).is_err());
    }
}
