//! Matching engine: pair descriptors that name the same face.
//!
//! The pool is sorted by `(key, rank, element, face)`. The tie-break makes the
//! result independent of arrival order. After sorting, every run of equal
//! keys is weighed by the claimants it stands for: a lonely face counts one,
//! a face already closed inside its fragment counts two. A total of one is a
//! physical boundary face (left open), two is either an interior face split
//! across fragments (linked both ways) or one closed locally (nothing to do),
//! and more is a non-manifold edge, reported as an error.

use crate::mesh_error::MeshConnectError;
use crate::topology::face_key::FaceKey;
use crate::topology::lonely_face::LonelyFace;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Outcome counts for one matching pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Faces linked to a partner (two descriptors each).
    pub pairs: usize,
    /// Descriptors with no partner.
    pub boundary: usize,
    /// Keys claimed by more than two elements, with their multiplicity.
    pub non_manifold: Vec<(FaceKey, usize)>,
}

#[inline]
fn sort_key(f: &LonelyFace) -> (FaceKey, usize, usize, usize) {
    (f.key(), f.rank, f.element, f.face)
}

/// Deterministic order: face key, then discovering rank, element, face.
pub fn sort_lonely_faces(pool: &mut [LonelyFace]) {
    #[cfg(feature = "rayon")]
    {
        use rayon::slice::ParallelSliceMut;
        pool.par_sort_unstable_by_key(sort_key);
    }
    #[cfg(not(feature = "rayon"))]
    pool.sort_unstable_by_key(sort_key);
}

/// Sorts `pool` and cross-links every pair of lonely descriptors sharing a key.
///
/// Keys claimed more than twice (counting closed markers as two) are left
/// untouched and collected in [`MatchSummary::non_manifold`]; use
/// [`match_lonely_faces`] to turn them into an error.
pub fn pair_lonely_faces(pool: &mut [LonelyFace]) -> MatchSummary {
    sort_lonely_faces(pool);
    let runs: Vec<(usize, FaceKey)> = pool.iter().map(LonelyFace::key).dedup_with_count().collect();

    let mut summary = MatchSummary::default();
    let mut start = 0;
    for (len, key) in runs {
        let run = start..start + len;
        let multiplicity: usize = pool[run.clone()].iter().map(LonelyFace::multiplicity).sum();
        match (multiplicity, len) {
            (1, _) => summary.boundary += 1,
            (2, 2) => {
                let (a, b) = (pool[start], pool[start + 1]);
                pool[start].neighbor = Some(b.as_neighbor());
                pool[start + 1].neighbor = Some(a.as_neighbor());
                summary.pairs += 1;
            }
            (2, _) => {}
            _ => summary.non_manifold.push((key, multiplicity)),
        }
        start = run.end;
    }
    summary
}

/// Like [`pair_lonely_faces`], but fails on the first non-manifold key.
///
/// Valid pairs elsewhere in the pool are still linked when this fails.
pub fn match_lonely_faces(pool: &mut [LonelyFace]) -> Result<MatchSummary, MeshConnectError> {
    let summary = pair_lonely_faces(pool);
    match summary.non_manifold.first() {
        Some(&(key, multiplicity)) => Err(MeshConnectError::NonManifoldFace { key, multiplicity }),
        None => Ok(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::lonely_face::RemoteNeighbor;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use rand::seq::SliceRandom;

    #[test]
    fn links_the_shared_edge() {
        // fragment A (rank 0) face 0 = (4,7); fragment B (rank 1) face 2 = (7,4)
        let mut pool = vec![LonelyFace::new(0, 2, 7, 4, 1), LonelyFace::new(0, 0, 4, 7, 0)];
        let summary = match_lonely_faces(&mut pool).unwrap();
        assert_eq!(summary.pairs, 1);
        assert_eq!(summary.boundary, 0);
        assert_eq!(
            pool[0].neighbor,
            Some(RemoteNeighbor { rank: 1, element: 0, face: 2 })
        );
        assert_eq!(
            pool[1].neighbor,
            Some(RemoteNeighbor { rank: 0, element: 0, face: 0 })
        );
    }

    #[test]
    fn singletons_stay_open() {
        let mut pool = vec![
            LonelyFace::new(0, 0, 1, 2, 0),
            LonelyFace::new(0, 1, 2, 3, 0),
            LonelyFace::new(5, 1, 3, 2, 1),
        ];
        let summary = match_lonely_faces(&mut pool).unwrap();
        assert_eq!((summary.pairs, summary.boundary), (1, 1));
        assert_eq!(pool[0].key(), FaceKey::new(1, 2));
        assert!(!pool[0].is_resolved());
        assert!(pool[1].is_resolved() && pool[2].is_resolved());
    }

    #[test]
    fn three_claimants_are_rejected() {
        let mut pool = vec![
            LonelyFace::new(0, 0, 4, 7, 0),
            LonelyFace::new(1, 1, 7, 4, 1),
            LonelyFace::new(2, 2, 4, 7, 2),
            LonelyFace::new(3, 0, 8, 9, 0),
            LonelyFace::new(4, 0, 9, 8, 2),
        ];
        let err = match_lonely_faces(&mut pool).unwrap_err();
        assert_eq!(
            err,
            MeshConnectError::NonManifoldFace { key: FaceKey::new(4, 7), multiplicity: 3 }
        );
        // the bad key is not partially paired; the good one still is
        assert!(pool.iter().filter(|f| f.key() == FaceKey::new(4, 7)).all(|f| !f.is_resolved()));
        assert!(pool.iter().filter(|f| f.key() == FaceKey::new(8, 9)).all(|f| f.is_resolved()));
    }

    #[test]
    fn closed_marker_counts_twice() {
        let mut pool = vec![
            LonelyFace::closed_marker(0, 1, 0, 1, 0),
            LonelyFace::new(0, 0, 1, 0, 1),
            LonelyFace::closed_marker(4, 2, 5, 6, 1),
        ];
        let err = match_lonely_faces(&mut pool).unwrap_err();
        assert_eq!(
            err,
            MeshConnectError::NonManifoldFace { key: FaceKey::new(0, 1), multiplicity: 3 }
        );
        assert!(pool.iter().all(|f| !f.is_resolved()));

        // a marker alone is a face closed locally: neither a pair nor boundary
        let mut alone = vec![LonelyFace::closed_marker(4, 2, 5, 6, 1)];
        assert_eq!(match_lonely_faces(&mut alone).unwrap(), MatchSummary::default());
    }

    #[test]
    fn two_ranks_closing_the_same_key() {
        let mut pool = vec![
            LonelyFace::closed_marker(0, 0, 2, 3, 0),
            LonelyFace::closed_marker(7, 1, 3, 2, 1),
        ];
        let summary = pair_lonely_faces(&mut pool);
        assert_eq!(summary.non_manifold, vec![(FaceKey::new(2, 3), 4)]);
    }

    #[test]
    fn arrival_order_does_not_matter() {
        let mut pool: Vec<LonelyFace> = (0..200u64)
            .flat_map(|k| {
                let a = LonelyFace::new(k as usize, 0, k, k + 1000, (k % 5) as usize);
                let b = LonelyFace::new(k as usize + 1, 2, k + 1000, k, (k % 3) as usize);
                if k % 7 == 0 { vec![a] } else { vec![a, b] }
            })
            .collect();
        let mut reversed = pool.clone();
        reversed.reverse();
        let mut shuffled = pool.clone();
        shuffled.shuffle(&mut SmallRng::seed_from_u64(7));

        let s1 = match_lonely_faces(&mut pool).unwrap();
        let s2 = match_lonely_faces(&mut reversed).unwrap();
        let s3 = match_lonely_faces(&mut shuffled).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1, s3);
        assert_eq!(pool, reversed);
        assert_eq!(pool, shuffled);
    }

    #[test]
    fn empty_pool() {
        let mut pool: Vec<LonelyFace> = Vec::new();
        assert_eq!(match_lonely_faces(&mut pool).unwrap(), MatchSummary::default());
    }
}
