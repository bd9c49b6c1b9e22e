//! Face router: which rank matches a given face.
//!
//! The owner is `min(v1, v2) mod size`. Both elements sharing a face see the
//! same two vertex ids, so whichever rank finds the face lonely sends its
//! descriptor to the same place, with no coordination needed.

use crate::topology::fragment::MeshFragment;
use crate::topology::lonely_face::LonelyFace;
use crate::topology::triangle::{NFACES, VertexId};

/// Matching rank for the face `(v1, v2)`; symmetric in its arguments.
#[inline]
pub fn owner_rank(v1: VertexId, v2: VertexId, size: usize) -> usize {
    debug_assert!(size > 0, "process group cannot be empty");
    (v1.min(v2) % size as u64) as usize
}

/// Buckets every lonely face of `fragment` by its owner rank.
///
/// Entry `r` of the result holds the descriptors destined for rank `r`, in
/// element-major order.
pub fn route_lonely_faces(fragment: &MeshFragment, rank: usize, size: usize) -> Vec<Vec<LonelyFace>> {
    let mut out = vec![Vec::new(); size];
    for (e, f) in fragment.lonely_faces() {
        let (v1, v2) = fragment.face_vertices(e, f);
        out[owner_rank(v1, v2, size)].push(LonelyFace::new(e, f, v1, v2, rank));
    }
    out
}

/// Adds one [`LonelyFace::closed_marker`] per locally paired face to
/// `buckets`, routed like a lonely face with the same key.
///
/// The owner needs these to see every claimant of a key: a face closed
/// here plus a lonely face elsewhere is a non-manifold edge.
pub fn route_closed_markers(
    fragment: &MeshFragment,
    rank: usize,
    buckets: &mut [Vec<LonelyFace>],
) {
    let size = buckets.len();
    for e in 0..fragment.n_elements() {
        for f in 0..NFACES {
            // one marker per pair, from its lower side
            if fragment.local_neighbor(e, f).is_some_and(|other| (e, f) < other) {
                let (v1, v2) = fragment.face_vertices(e, f);
                buckets[owner_rank(v1, v2, size)].push(LonelyFace::closed_marker(e, f, v1, v2, rank));
            }
        }
    }
}
