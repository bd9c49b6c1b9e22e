//! `MeshFragment`: one rank's slice of the global triangle mesh.
//!
//! Coordinate and topology tables are flat, element-major arrays
//! (`table[e * NVERTS + v]`, `table[e * NFACES + f]`). Neighbor tables are
//! explicit options: `None` in `e_to_e` marks a face with no neighbor inside
//! this fragment, which is exactly what the face router looks for.

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshConnectError;
use crate::topology::lonely_face::RemoteNeighbor;
use crate::topology::triangle::{NFACES, NVERTS, VertexId, face_vertices};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshFragment {
    ex: Vec<f64>,
    ey: Vec<f64>,
    e_to_v: Vec<VertexId>,
    e_to_b: Vec<i32>,
    e_to_e: Vec<Option<usize>>,
    e_to_f: Vec<Option<usize>>,
    remote: Vec<Option<RemoteNeighbor>>,
}

impl MeshFragment {
    /// Builds a fragment from its four distributed arrays.
    ///
    /// Neighbor tables start fully unresolved.
    pub fn try_new(
        ex: Vec<f64>,
        ey: Vec<f64>,
        e_to_v: Vec<VertexId>,
        e_to_b: Vec<i32>,
    ) -> Result<Self, MeshConnectError> {
        if e_to_v.len() % NVERTS != 0 {
            return Err(MeshConnectError::InvalidFragment(format!(
                "EToV length {} is not a multiple of {NVERTS}",
                e_to_v.len()
            )));
        }
        let n = e_to_v.len() / NVERTS;
        for (name, len, want) in [
            ("EX", ex.len(), n * NVERTS),
            ("EY", ey.len(), n * NVERTS),
            ("EToB", e_to_b.len(), n * NFACES),
        ] {
            if len != want {
                return Err(MeshConnectError::InvalidFragment(format!(
                    "{name} has {len} entries, expected {want} for {n} elements"
                )));
            }
        }
        Ok(Self {
            ex,
            ey,
            e_to_v,
            e_to_b,
            e_to_e: vec![None; n * NFACES],
            e_to_f: vec![None; n * NFACES],
            remote: vec![None; n * NFACES],
        })
    }

    /// A fragment with no elements (a rank that received an empty range).
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn n_elements(&self) -> usize {
        self.e_to_v.len() / NVERTS
    }

    #[inline]
    pub fn ex(&self) -> &[f64] {
        &self.ex
    }

    #[inline]
    pub fn ey(&self) -> &[f64] {
        &self.ey
    }

    #[inline]
    pub fn e_to_v(&self) -> &[VertexId] {
        &self.e_to_v
    }

    #[inline]
    pub fn e_to_b(&self) -> &[i32] {
        &self.e_to_b
    }

    /// Global vertex ids of element `e`.
    #[inline]
    pub fn element_vertices(&self, e: usize) -> &[VertexId] {
        &self.e_to_v[e * NVERTS..(e + 1) * NVERTS]
    }

    /// Global vertex ids `(v1, v2)` of face `f` of element `e`, in traversal order.
    #[inline]
    pub fn face_vertices(&self, e: usize, f: usize) -> (VertexId, VertexId) {
        face_vertices(self.element_vertices(e), f)
    }

    /// Neighbor `(element, face)` inside this fragment, if any.
    #[inline]
    pub fn local_neighbor(&self, e: usize, f: usize) -> Option<(usize, usize)> {
        let i = e * NFACES + f;
        self.e_to_e[i].zip(self.e_to_f[i])
    }

    /// Links face `(e, f)` to `(ne, nf)`. Only this side is written.
    pub fn set_local_neighbor(
        &mut self,
        e: usize,
        f: usize,
        ne: usize,
        nf: usize,
    ) -> Result<(), MeshConnectError> {
        let n = self.n_elements();
        if e >= n || f >= NFACES || ne >= n || nf >= NFACES {
            return Err(MeshConnectError::InvalidFragment(format!(
                "local link ({e}, {f}) -> ({ne}, {nf}) out of range for {n} elements"
            )));
        }
        let i = e * NFACES + f;
        self.e_to_e[i] = Some(ne);
        self.e_to_f[i] = Some(nf);
        Ok(())
    }

    /// Forgets all local and remote connectivity.
    pub fn clear_connectivity(&mut self) {
        self.e_to_e.fill(None);
        self.e_to_f.fill(None);
        self.remote.fill(None);
    }

    /// Faces with no neighbor inside this fragment, in element-major order.
    pub fn lonely_faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.e_to_e
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_none())
            .map(|(i, _)| (i / NFACES, i % NFACES))
    }

    /// Neighbor on another rank, once cross-process resolution has run.
    #[inline]
    pub fn remote_neighbor(&self, e: usize, f: usize) -> Option<RemoteNeighbor> {
        self.remote[e * NFACES + f]
    }

    /// Records the remote partner of a lonely face.
    pub fn set_remote_neighbor(
        &mut self,
        e: usize,
        f: usize,
        neighbor: RemoteNeighbor,
    ) -> Result<(), MeshConnectError> {
        if e >= self.n_elements() || f >= NFACES {
            return Err(MeshConnectError::InvalidFragment(format!(
                "face ({e}, {f}) out of range for {} elements",
                self.n_elements()
            )));
        }
        if self.local_neighbor(e, f).is_some() {
            return Err(MeshConnectError::InvalidFragment(format!(
                "face ({e}, {f}) is already closed locally"
            )));
        }
        self.remote[e * NFACES + f] = Some(neighbor);
        Ok(())
    }

    /// Faces with neither a local nor a remote neighbor: the physical boundary.
    pub fn boundary_faces(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.lonely_faces()
            .filter(|&(e, f)| self.remote[e * NFACES + f].is_none())
    }
}

impl DebugInvariants for MeshFragment {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "MeshFragment");
    }

    fn validate_invariants(&self) -> Result<(), MeshConnectError> {
        let n = self.n_elements();
        let slots = n * NFACES;
        if self.e_to_e.len() != slots || self.e_to_f.len() != slots || self.remote.len() != slots
        {
            return Err(MeshConnectError::InvalidFragment(
                "neighbor tables do not match element count".into(),
            ));
        }
        for i in 0..slots {
            let (e, f) = (i / NFACES, i % NFACES);
            match (self.e_to_e[i], self.e_to_f[i]) {
                (None, None) => {}
                (Some(ne), Some(nf)) => {
                    if ne >= n || nf >= NFACES {
                        return Err(MeshConnectError::InvalidFragment(format!(
                            "face ({e}, {f}) points outside the fragment at ({ne}, {nf})"
                        )));
                    }
                    if self.local_neighbor(ne, nf) != Some((e, f)) {
                        return Err(MeshConnectError::InvalidFragment(format!(
                            "face ({e}, {f}) -> ({ne}, {nf}) is not reciprocated"
                        )));
                    }
                    if self.remote[i].is_some() {
                        return Err(MeshConnectError::InvalidFragment(format!(
                            "face ({e}, {f}) has both a local and a remote neighbor"
                        )));
                    }
                }
                _ => {
                    return Err(MeshConnectError::InvalidFragment(format!(
                        "face ({e}, {f}) has a half-filled neighbor entry"
                    )));
                }
            }
        }
        Ok(())
    }
}
