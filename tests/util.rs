#![allow(dead_code)]
use mesh_connect::{
    algs::local_adjacency::{FaceKeyAdjacency, LocalAdjacency},
    algs::partition::partition_start,
    topology::{GlobalMesh, MeshFragment, NFACES},
};

/// `nx * ny` unit squares, each split into two counter-clockwise triangles.
pub fn structured_grid(nx: usize, ny: usize) -> GlobalMesh {
    let id = |i: usize, j: usize| (j * (nx + 1) + i) as u64;
    let mut vx = Vec::new();
    let mut vy = Vec::new();
    for j in 0..=ny {
        for i in 0..=nx {
            vx.push(i as f64);
            vy.push(j as f64);
        }
    }
    let mut e_to_v = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let (a, b, c, d) = (id(i, j), id(i + 1, j), id(i + 1, j + 1), id(i, j + 1));
            e_to_v.extend_from_slice(&[a, b, c]);
            e_to_v.extend_from_slice(&[a, c, d]);
        }
    }
    GlobalMesh::try_new(vx, vy, e_to_v).unwrap()
}

/// Global neighbor of every (element, face), computed serially.
pub fn serial_neighbors(mesh: &GlobalMesh) -> Vec<Option<(usize, usize)>> {
    let mut whole = mesh.extract(0..mesh.n_elements()).unwrap();
    FaceKeyAdjacency.resolve_local(&mut whole).unwrap();
    (0..mesh.n_elements())
        .flat_map(|e| (0..NFACES).map(move |f| (e, f)))
        .map(|(e, f)| whole.local_neighbor(e, f))
        .collect()
}

/// Maps one rank's resolved fragment back to global neighbors.
pub fn global_neighbors(
    fragment: &MeshFragment,
    rank: usize,
    n_elements: usize,
    n_ranks: usize,
) -> Vec<Option<(usize, usize)>> {
    let start = partition_start(n_elements, n_ranks, rank);
    let mut out = Vec::with_capacity(fragment.n_elements() * NFACES);
    for e in 0..fragment.n_elements() {
        for f in 0..NFACES {
            let nb = match (fragment.local_neighbor(e, f), fragment.remote_neighbor(e, f)) {
                (Some((ne, nf)), None) => Some((start + ne, nf)),
                (None, Some(r)) => Some((partition_start(n_elements, n_ranks, r.rank) + r.element, r.face)),
                (None, None) => None,
                (Some(_), Some(_)) => panic!("face ({e}, {f}) on rank {rank} closed twice"),
            };
            out.push(nb);
        }
    }
    out
}
