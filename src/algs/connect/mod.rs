//! Cross-process face resolution for distributed triangle fragments.
//!
//! After local adjacency has closed every face it can, the remaining lonely
//! faces are resolved in lockstep by the whole group:
//!
//! 1. [`route`]: bucket each lonely face by `min(v1, v2) mod size`, along
//!    with a marker for every face closed locally.
//! 2. [`exchange`]: size exchange plus all-to-all byte shuffle.
//! 3. [`matching`]: sort by face key on the owner rank, pair equal keys and
//!    reject keys with more than two claimants.
//! 4. [`scatter`]: send matched records home and fold them into the fragment.
//!
//! Each phase ends in an agreement step: a failure on any rank becomes a
//! group-wide abort, so no rank is left waiting at a collective and every
//! rank returns the same outcome.

pub mod exchange;
pub mod matching;
pub mod route;
pub mod scatter;

use crate::algs::communicator::{CommTag, Communicator, ConnectCommTags};
use crate::algs::distribute::{DistributeConfig, load_and_distribute};
use crate::algs::local_adjacency::LocalAdjacency;
use crate::algs::ordering::ElementOrdering;
use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshConnectError;
use crate::topology::fragment::MeshFragment;
use crate::topology::global_mesh::GlobalMesh;
use serde::{Deserialize, Serialize};

use self::exchange::{OutgoingRecords, agree_on_error, exchange_encoded};
use self::matching::{MatchSummary, match_lonely_faces};
use self::route::{route_closed_markers, route_lonely_faces};
use self::scatter::{check_origins, encode_returns, fold_resolved};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// First of the consecutive tags used by the resolution phases.
    pub base_tag: CommTag,
    /// Validate fragment neighbor tables before and after resolution.
    pub check_invariants: bool,
    /// Also send one marker per locally closed face to its owner, so an edge
    /// claimed twice on one rank and again elsewhere is caught. Without it
    /// only lonely faces travel and such edges go unnoticed.
    pub check_manifold: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            base_tag: CommTag::new(0x4C46),
            check_invariants: cfg!(any(debug_assertions, feature = "strict-invariants")),
            check_manifold: true,
        }
    }
}

/// What one rank saw during resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReport {
    /// Faces left open by local adjacency.
    pub lonely_faces: usize,
    /// Lonely faces that found a partner on another rank.
    pub resolved: usize,
    /// Lonely faces with no partner anywhere: the physical boundary.
    pub boundary: usize,
    /// Pairing done by this rank in its role as owner of routed faces.
    pub matched_here: MatchSummary,
}

/// Resolves local and cross-process adjacency of `fragment`.
///
/// Collective over `comm`: every rank must call it with its own fragment.
/// On success the fragment's local neighbor tables and remote neighbors are
/// filled in. If any rank fails, every rank returns an error.
pub fn connect_fragment<R, C>(
    fragment: &mut MeshFragment,
    resolver: &R,
    comm: &C,
    config: &ConnectConfig,
) -> Result<ConnectReport, MeshConnectError>
where
    R: LocalAdjacency + ?Sized,
    C: Communicator,
{
    let tags = ConnectCommTags::from_base(config.base_tag);
    let (rank, size) = (comm.rank(), comm.size());

    let local = resolver.resolve_local(fragment).and_then(|()| {
        if config.check_invariants {
            fragment.validate_invariants()?;
        }
        Ok(())
    });

    if size == 1 {
        local?;
        let open = fragment.lonely_faces().count();
        log::debug!("single rank: {open} boundary faces, nothing to exchange");
        return Ok(ConnectReport {
            lonely_faces: open,
            boundary: open,
            ..Default::default()
        });
    }

    let prepared = local.and_then(|()| {
        let mut buckets = route_lonely_faces(fragment, rank, size);
        let lonely: usize = buckets.iter().map(Vec::len).sum();
        if config.check_manifold {
            route_closed_markers(fragment, rank, &mut buckets);
        }
        Ok((lonely, OutgoingRecords::encode(&buckets)?))
    });
    let (lonely_faces, outgoing) = agree_on_error(comm, prepared, tags.status)?;

    let matched = exchange_encoded(&outgoing, comm, tags.sizes, tags.faces).and_then(|mut pool| {
        check_origins(&pool, size)?;
        let summary = match_lonely_faces(&mut pool)?;
        Ok((encode_returns(&pool, size)?, summary))
    });
    let (returns, matched_here) = agree_on_error(comm, matched, tags.status)?;
    log::debug!(
        "rank {rank}: matched {} pairs, {} open faces as owner",
        matched_here.pairs,
        matched_here.boundary
    );

    let folded = exchange_encoded(&returns, comm, tags.return_sizes, tags.return_faces)
        .and_then(|returned| {
            if returned.len() != lonely_faces {
                return Err(MeshConnectError::ProtocolViolation(format!(
                    "rank {rank} sent {lonely_faces} descriptors but got {} back",
                    returned.len()
                )));
            }
            let resolved = fold_resolved(fragment, &returned, rank)?;
            if config.check_invariants {
                fragment.validate_invariants()?;
            }
            Ok(resolved)
        });
    let resolved = agree_on_error(comm, folded, tags.status)?;

    let report = ConnectReport {
        lonely_faces,
        resolved,
        boundary: lonely_faces - resolved,
        matched_here,
    };
    log::info!(
        "rank {rank}: {} lonely faces, {} resolved across ranks, {} on the boundary",
        report.lonely_faces,
        report.resolved,
        report.boundary
    );
    Ok(report)
}

/// Startup path: order and scatter the global mesh from the root, then
/// resolve adjacency on every rank.
pub fn distribute_and_connect<O, R, C>(
    global: Option<GlobalMesh>,
    ordering: &O,
    resolver: &R,
    comm: &C,
    distribute: &DistributeConfig,
    connect: &ConnectConfig,
) -> Result<(MeshFragment, ConnectReport), MeshConnectError>
where
    O: ElementOrdering,
    R: LocalAdjacency + ?Sized,
    C: Communicator,
{
    let mut fragment = load_and_distribute(global, ordering, comm, distribute)?;
    let report = connect_fragment(&mut fragment, resolver, comm, connect)?;
    Ok((fragment, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, run_group};
    use crate::algs::local_adjacency::FaceKeyAdjacency;
    use crate::topology::lonely_face::RemoteNeighbor;

    fn triangle(v: [u64; 3]) -> MeshFragment {
        MeshFragment::try_new(vec![0.0; 3], vec![0.0; 3], v.to_vec(), vec![0; 3]).unwrap()
    }

    #[test]
    fn two_fragments_share_edge_four_seven() {
        // A = (4, 7, 1): face 0 is (4, 7). B = (4, 2, 7): face 2 is (7, 4).
        let reports = run_group(2, |comm| {
            let mut frag = if comm.rank() == 0 { triangle([4, 7, 1]) } else { triangle([4, 2, 7]) };
            let report =
                connect_fragment(&mut frag, &FaceKeyAdjacency, &comm, &ConnectConfig::default())
                    .unwrap();
            (frag, report)
        });
        let (a, ra) = &reports[0];
        let (b, rb) = &reports[1];
        assert_eq!(b.face_vertices(0, 2), (7, 4));
        assert_eq!(a.remote_neighbor(0, 0), Some(RemoteNeighbor { rank: 1, element: 0, face: 2 }));
        assert_eq!(b.remote_neighbor(0, 2), Some(RemoteNeighbor { rank: 0, element: 0, face: 0 }));
        assert_eq!((ra.lonely_faces, ra.resolved, ra.boundary), (3, 1, 2));
        assert_eq!((rb.lonely_faces, rb.resolved, rb.boundary), (3, 1, 2));
        // key (4, 7) routes to 4 % 2 = 0
        assert_eq!(ra.matched_here.pairs, 1);
        assert_eq!(rb.matched_here.pairs, 0);
    }

    #[test]
    fn single_rank_short_circuits() {
        let mut frag = triangle([0, 1, 2]);
        let report =
            connect_fragment(&mut frag, &FaceKeyAdjacency, &NoComm, &ConnectConfig::default())
                .unwrap();
        assert_eq!(report.boundary, 3);
        assert_eq!(report.resolved, 0);
    }

    #[test]
    fn local_failure_aborts_the_group() {
        let out = run_group(3, |comm| {
            let mut frag = if comm.rank() == 2 { triangle([5, 5, 6]) } else { triangle([0, 1, 2]) };
            connect_fragment(&mut frag, &FaceKeyAdjacency, &comm, &ConnectConfig::default())
        });
        assert!(matches!(out[2], Err(MeshConnectError::InvalidFragment(_))));
        assert_eq!(out[0], Err(MeshConnectError::GroupAbort { ranks: vec![2] }));
        assert_eq!(out[1], Err(MeshConnectError::GroupAbort { ranks: vec![2] }));
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = ConnectConfig {
            base_tag: CommTag::new(77),
            check_invariants: true,
            check_manifold: false,
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: ConnectConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
        let partial: ConnectConfig = serde_json::from_str(r#"{"check_invariants": false}"#).unwrap();
        assert_eq!(partial.base_tag, ConnectConfig::default().base_tag);
    }
}
