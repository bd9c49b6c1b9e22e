// src/algs/distribute.rs

//! Root-driven distribution of a globally ordered mesh.
//!
//! The root splits the element order into balanced contiguous ranges
//! ([`partition_ranges`]) and ships each rank its slice as five point-to-point
//! messages on one tag, always in this order:
//!
//! 1. [`WireDistHdr`] (status + element count)
//! 2. `EX`, 3. `EY` (f64, `3 * count`)
//! 4. `EToV` (u64, `3 * count`)
//! 5. `EToB` (i32, `3 * count`)
//!
//! Nothing but program order tells the arrays apart, so sender and receiver
//! must agree on this sequence exactly. The root keeps its own slice without
//! serializing it. If the root cannot produce a mesh it sends an abort header
//! to every other rank instead, so nobody is left blocked on a receive.

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::ordering::ElementOrdering;
use crate::algs::partition::{PartitionStats, partition_ranges};
use crate::algs::wire::{
    DistStatus, WireDistHdr, WireScalar, decode_array, encode_array, expect_exact_len,
};
use crate::mesh_error::MeshConnectError;
use crate::topology::fragment::MeshFragment;
use crate::topology::global_mesh::GlobalMesh;
use crate::topology::triangle::{NFACES, NVERTS};
use serde::{Deserialize, Serialize};

/// Which rank distributes, and on which tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributeConfig {
    pub root: usize,
    pub tag: CommTag,
}

impl Default for DistributeConfig {
    fn default() -> Self {
        Self {
            root: 0,
            tag: CommTag::new(999),
        }
    }
}

impl DistributeConfig {
    fn check<C: Communicator>(&self, comm: &C) -> Result<(), MeshConnectError> {
        if self.root >= comm.size() {
            return Err(MeshConnectError::InvalidConfig(format!(
                "root rank {} outside a group of {}",
                self.root,
                comm.size()
            )));
        }
        Ok(())
    }
}

/// Distributes `global` (needed on the root only) and returns this rank's fragment.
///
/// Non-root ranks pass `None` and block until their slice arrives.
pub fn scatter_mesh<C: Communicator>(
    global: Option<&GlobalMesh>,
    comm: &C,
    config: &DistributeConfig,
) -> Result<MeshFragment, MeshConnectError> {
    config.check(comm)?;
    if comm.rank() == config.root {
        let mesh = global.ok_or(MeshConnectError::MissingGlobalMesh(config.root));
        scatter_from_root(mesh, comm, config)
    } else {
        receive_from_root(comm, config)
    }
}

/// Orders the mesh on the root with `ordering`, then scatters it.
pub fn load_and_distribute<O, C>(
    global: Option<GlobalMesh>,
    ordering: &O,
    comm: &C,
    config: &DistributeConfig,
) -> Result<MeshFragment, MeshConnectError>
where
    O: ElementOrdering,
    C: Communicator,
{
    config.check(comm)?;
    if comm.rank() != config.root {
        return receive_from_root(comm, config);
    }
    let ordered = global
        .ok_or(MeshConnectError::MissingGlobalMesh(config.root))
        .and_then(|mesh| ordering.order(mesh));
    scatter_from_root(ordered.as_ref().map_err(|e| e.clone()), comm, config)
}

fn scatter_from_root<C: Communicator>(
    global: Result<&GlobalMesh, MeshConnectError>,
    comm: &C,
    config: &DistributeConfig,
) -> Result<MeshFragment, MeshConnectError> {
    let size = comm.size();
    let tag = config.tag.as_u16();
    let root = config.root;
    let peers = move || (0..size).filter(move |&r| r != root);

    let mesh = match global.and_then(|m| check_count(m).map(|_| m)) {
        Ok(m) => m,
        Err(err) => {
            log::warn!("root {} aborting distribution: {err}", config.root);
            for r in peers() {
                send_abort(comm, r, tag);
            }
            return Err(err);
        }
    };

    let stats = PartitionStats::of(mesh.n_elements(), size);
    log::debug!(
        "distributing {} elements over {size} ranks ({}..={} per rank)",
        stats.n_elements,
        stats.min,
        stats.max
    );

    let mut own = None;
    let ranges = partition_ranges(mesh.n_elements(), size);
    for (r, range) in ranges.into_iter().enumerate() {
        let fragment = match mesh.extract(range) {
            Ok(f) => f,
            Err(err) => {
                for later in peers().filter(|&p| p >= r) {
                    send_abort(comm, later, tag);
                }
                return Err(err);
            }
        };
        if r == config.root {
            own = Some(fragment);
        } else {
            send_fragment(comm, r, tag, &fragment);
            // `fragment` dropped here: temporary send buffers are released per rank
        }
    }
    let own = own.unwrap_or_default();
    log::info!("rank {} got {} elements", config.root, own.n_elements());
    Ok(own)
}

fn check_count(mesh: &GlobalMesh) -> Result<(), MeshConnectError> {
    u32::try_from(mesh.n_elements())
        .map(|_| ())
        .map_err(|_| {
            MeshConnectError::InvalidMesh(format!(
                "{} elements exceed the 32-bit distribution header",
                mesh.n_elements()
            ))
        })
}

fn send_abort<C: Communicator>(comm: &C, peer: usize, tag: u16) {
    let hdr = WireDistHdr::new(DistStatus::Abort, 0);
    let _ = comm.isend(peer, tag, bytemuck::bytes_of(&hdr)).wait();
}

fn send_fragment<C: Communicator>(comm: &C, peer: usize, tag: u16, fragment: &MeshFragment) {
    // count was range-checked against u32 by `check_count`
    let hdr = WireDistHdr::new(DistStatus::Ok, fragment.n_elements() as u32);
    let _ = comm.isend(peer, tag, bytemuck::bytes_of(&hdr)).wait();
    let _ = comm.isend(peer, tag, &encode_array(fragment.ex())).wait();
    let _ = comm.isend(peer, tag, &encode_array(fragment.ey())).wait();
    let _ = comm.isend(peer, tag, &encode_array(fragment.e_to_v())).wait();
    let _ = comm.isend(peer, tag, &encode_array(fragment.e_to_b())).wait();
}

/// Blocking receive of exactly `len` bytes from `peer`.
pub(crate) fn recv_exact<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: u16,
    len: usize,
) -> Result<Vec<u8>, MeshConnectError> {
    let mut buf = vec![0u8; len];
    let data = comm
        .irecv(peer, tag, &mut buf)
        .wait()
        .ok_or_else(|| MeshConnectError::comm(peer, format!("no message on tag {tag}")))?;
    expect_exact_len(data.len(), len)?;
    Ok(data)
}

fn recv_array<C: Communicator, T: WireScalar>(
    comm: &C,
    peer: usize,
    tag: u16,
    n: usize,
) -> Result<Vec<T>, MeshConnectError> {
    let bytes = recv_exact(comm, peer, tag, n * T::WIDTH)?;
    decode_array(&bytes, n)
}

/// Receives one fragment in distribution order: header, EX, EY, EToV, EToB.
fn recv_fragment<C: Communicator>(
    comm: &C,
    peer: usize,
    tag: u16,
) -> Result<MeshFragment, MeshConnectError> {
    let hdr_bytes = recv_exact(comm, peer, tag, std::mem::size_of::<WireDistHdr>())?;
    let hdr = WireDistHdr::decode(&hdr_bytes)?;
    if hdr.status()? == DistStatus::Abort {
        return Err(MeshConnectError::GroupAbort { ranks: vec![peer] });
    }
    let n = hdr.count();
    let ex = recv_array::<_, f64>(comm, peer, tag, n * NVERTS)?;
    let ey = recv_array::<_, f64>(comm, peer, tag, n * NVERTS)?;
    let e_to_v = recv_array::<_, u64>(comm, peer, tag, n * NVERTS)?;
    let e_to_b = recv_array::<_, i32>(comm, peer, tag, n * NFACES)?;
    MeshFragment::try_new(ex, ey, e_to_v, e_to_b)
}

fn receive_from_root<C: Communicator>(
    comm: &C,
    config: &DistributeConfig,
) -> Result<MeshFragment, MeshConnectError> {
    let fragment = recv_fragment(comm, config.root, config.tag.as_u16())?;
    log::info!("rank {} got {} elements", comm.rank(), fragment.n_elements());
    Ok(fragment)
}

/// Inverse of [`scatter_mesh`]: concatenates every rank's element tables on
/// the root in rank order. Returns `Some` on the root, `None` elsewhere.
///
/// Connectivity is not carried; the result is a fresh, unresolved fragment.
pub fn gather_mesh<C: Communicator>(
    fragment: &MeshFragment,
    comm: &C,
    config: &DistributeConfig,
) -> Result<Option<MeshFragment>, MeshConnectError> {
    config.check(comm)?;
    let tag = config.tag.offset(1).as_u16();
    if comm.rank() != config.root {
        if u32::try_from(fragment.n_elements()).is_err() {
            send_abort(comm, config.root, tag);
            return Err(MeshConnectError::InvalidFragment(
                "fragment too large to gather".into(),
            ));
        }
        send_fragment(comm, config.root, tag, fragment);
        return Ok(None);
    }

    let (mut ex, mut ey, mut e_to_v, mut e_to_b) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for r in 0..comm.size() {
        let piece;
        let part = if r == config.root {
            fragment
        } else {
            piece = recv_fragment(comm, r, tag)?;
            &piece
        };
        ex.extend_from_slice(part.ex());
        ey.extend_from_slice(part.ey());
        e_to_v.extend_from_slice(part.e_to_v());
        e_to_b.extend_from_slice(part.e_to_b());
    }
    MeshFragment::try_new(ex, ey, e_to_v, e_to_b).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, run_group};
    use crate::algs::ordering::{IdentityOrdering, MortonOrdering};

    fn strip(n: usize) -> GlobalMesh {
        // a row of n triangles over 2 rows of vertices
        let cols = n / 2 + 2;
        let mut vx = Vec::new();
        let mut vy = Vec::new();
        for row in 0..2 {
            for c in 0..cols {
                vx.push(c as f64);
                vy.push(row as f64);
            }
        }
        let mut e_to_v = Vec::new();
        for e in 0..n {
            let c = (e / 2) as u64;
            let (b0, b1, t0, t1) = (c, c + 1, cols as u64 + c, cols as u64 + c + 1);
            if e % 2 == 0 {
                e_to_v.extend([b0, b1, t0]);
            } else {
                e_to_v.extend([b1, t1, t0]);
            }
        }
        let e_to_b = (0..n * NFACES).map(|i| i as i32).collect();
        GlobalMesh::with_boundary_tags(vx, vy, e_to_v, e_to_b).unwrap()
    }

    #[test]
    fn single_rank_keeps_everything() {
        let mesh = strip(5);
        let frag = scatter_mesh(Some(&mesh), &NoComm, &DistributeConfig::default()).unwrap();
        assert_eq!(frag, mesh.extract(0..5).unwrap());
    }

    #[test]
    fn root_without_mesh_fails_cleanly() {
        let err = scatter_mesh(None, &NoComm, &DistributeConfig::default()).unwrap_err();
        assert_eq!(err, MeshConnectError::MissingGlobalMesh(0));
    }

    #[test]
    fn ranks_receive_balanced_slices() {
        let mesh = strip(10);
        let frags = run_group(4, |comm| {
            let global = (comm.rank() == 0).then(|| mesh.clone());
            scatter_mesh(global.as_ref(), &comm, &DistributeConfig::default()).unwrap()
        });
        let counts: Vec<usize> = frags.iter().map(MeshFragment::n_elements).collect();
        assert_eq!(counts, vec![3, 3, 2, 2]);
        assert_eq!(frags[1].e_to_b(), &mesh.e_to_b()[9..18]);
        assert_eq!(frags[3], mesh.extract(8..10).unwrap());
    }

    #[test]
    fn non_zero_root() {
        let mesh = strip(6);
        let config = DistributeConfig {
            root: 2,
            ..Default::default()
        };
        let frags = run_group(3, |comm| {
            let global = (comm.rank() == 2).then(|| mesh.clone());
            scatter_mesh(global.as_ref(), &comm, &config).unwrap()
        });
        for (r, f) in frags.iter().enumerate() {
            assert_eq!(f, &mesh.extract(2 * r..2 * r + 2).unwrap());
        }
    }

    #[test]
    fn root_failure_reaches_every_rank() {
        let results = run_group(3, |comm| scatter_mesh(None, &comm, &DistributeConfig::default()));
        assert_eq!(results[0], Err(MeshConnectError::MissingGlobalMesh(0)));
        for r in &results[1..] {
            assert_eq!(r, &Err(MeshConnectError::GroupAbort { ranks: vec![0] }));
        }
    }

    #[test]
    fn more_ranks_than_elements() {
        let mesh = strip(2);
        let frags = run_group(4, |comm| {
            let global = (comm.rank() == 0).then(|| mesh.clone());
            scatter_mesh(global.as_ref(), &comm, &DistributeConfig::default()).unwrap()
        });
        let counts: Vec<usize> = frags.iter().map(MeshFragment::n_elements).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
    }

    #[test]
    fn bad_root_is_a_config_error() {
        let config = DistributeConfig {
            root: 1,
            ..Default::default()
        };
        assert!(matches!(
            scatter_mesh(None, &NoComm, &config),
            Err(MeshConnectError::InvalidConfig(_))
        ));
    }

    #[test]
    fn ordering_runs_on_root_only() {
        let mesh = strip(8);
        let frags = run_group(2, |comm| {
            let global = (comm.rank() == 0).then(|| mesh.clone());
            load_and_distribute(global, &MortonOrdering::default(), &comm, &DistributeConfig::default())
                .unwrap()
        });
        let total: usize = frags.iter().map(MeshFragment::n_elements).sum();
        assert_eq!(total, 8);
        let plain = run_group(2, |comm| {
            let global = (comm.rank() == 0).then(|| mesh.clone());
            load_and_distribute(global, &IdentityOrdering, &comm, &DistributeConfig::default())
                .unwrap()
        });
        assert_eq!(plain[0], mesh.extract(0..4).unwrap());
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let cfg: DistributeConfig = serde_json::from_str(r#"{"root": 3}"#).unwrap();
        assert_eq!(cfg.root, 3);
        assert_eq!(cfg.tag, CommTag::new(999));
    }
}
