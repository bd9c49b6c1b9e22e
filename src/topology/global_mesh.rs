//! `GlobalMesh`: the complete mesh, held only on the distributing root.

use crate::mesh_error::MeshConnectError;
use crate::topology::fragment::MeshFragment;
use crate::topology::triangle::{NFACES, NVERTS, VertexId};
use std::ops::Range;

/// Vertex coordinate tables plus element-to-vertex (and boundary tag) tables.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMesh {
    vx: Vec<f64>,
    vy: Vec<f64>,
    e_to_v: Vec<VertexId>,
    e_to_b: Vec<i32>,
}

impl GlobalMesh {
    /// Validates vertex references and builds a mesh with all boundary tags zero.
    pub fn try_new(
        vx: Vec<f64>,
        vy: Vec<f64>,
        e_to_v: Vec<VertexId>,
    ) -> Result<Self, MeshConnectError> {
        let n_faces = (e_to_v.len() / NVERTS) * NFACES;
        Self::with_boundary_tags(vx, vy, e_to_v, vec![0; n_faces])
    }

    /// Like [`GlobalMesh::try_new`] with explicit per-(element, face) tags.
    pub fn with_boundary_tags(
        vx: Vec<f64>,
        vy: Vec<f64>,
        e_to_v: Vec<VertexId>,
        e_to_b: Vec<i32>,
    ) -> Result<Self, MeshConnectError> {
        if vx.len() != vy.len() {
            return Err(MeshConnectError::InvalidMesh(format!(
                "VX has {} entries but VY has {}",
                vx.len(),
                vy.len()
            )));
        }
        if e_to_v.len() % NVERTS != 0 {
            return Err(MeshConnectError::InvalidMesh(format!(
                "EToV length {} is not a multiple of {NVERTS}",
                e_to_v.len()
            )));
        }
        let n_elements = e_to_v.len() / NVERTS;
        if e_to_b.len() != n_elements * NFACES {
            return Err(MeshConnectError::InvalidMesh(format!(
                "EToB has {} entries, expected {}",
                e_to_b.len(),
                n_elements * NFACES
            )));
        }
        let n_vertices = vx.len() as u64;
        if let Some((i, &v)) = e_to_v.iter().enumerate().find(|&(_, &v)| v >= n_vertices) {
            return Err(MeshConnectError::InvalidMesh(format!(
                "element {} references vertex {v}, but only {n_vertices} vertices exist",
                i / NVERTS
            )));
        }
        Ok(Self {
            vx,
            vy,
            e_to_v,
            e_to_b,
        })
    }

    #[inline]
    pub fn n_elements(&self) -> usize {
        self.e_to_v.len() / NVERTS
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.vx.len()
    }

    #[inline]
    pub fn vx(&self) -> &[f64] {
        &self.vx
    }

    #[inline]
    pub fn vy(&self) -> &[f64] {
        &self.vy
    }

    #[inline]
    pub fn e_to_v(&self) -> &[VertexId] {
        &self.e_to_v
    }

    #[inline]
    pub fn e_to_b(&self) -> &[i32] {
        &self.e_to_b
    }

    #[inline]
    pub fn element_vertices(&self, e: usize) -> &[VertexId] {
        &self.e_to_v[e * NVERTS..(e + 1) * NVERTS]
    }

    /// Arithmetic mean of the element's three corners.
    pub fn centroid(&self, e: usize) -> (f64, f64) {
        let (mut x, mut y) = (0.0, 0.0);
        for &v in self.element_vertices(e) {
            x += self.vx[v as usize];
            y += self.vy[v as usize];
        }
        (x / NVERTS as f64, y / NVERTS as f64)
    }

    /// Reorders elements so that new element `i` is old element `perm[i]`.
    ///
    /// Vertex ids and coordinates are untouched.
    pub fn permute_elements(&mut self, perm: &[usize]) -> Result<(), MeshConnectError> {
        let n = self.n_elements();
        if perm.len() != n {
            return Err(MeshConnectError::InvalidMesh(format!(
                "permutation has {} entries for {n} elements",
                perm.len()
            )));
        }
        let mut seen = vec![false; n];
        for &p in perm {
            if p >= n || std::mem::replace(&mut seen[p], true) {
                return Err(MeshConnectError::InvalidMesh(format!(
                    "element permutation is not a bijection (entry {p})"
                )));
            }
        }
        let mut e_to_v = Vec::with_capacity(self.e_to_v.len());
        let mut e_to_b = Vec::with_capacity(self.e_to_b.len());
        for &old in perm {
            e_to_v.extend_from_slice(self.element_vertices(old));
            e_to_b.extend_from_slice(&self.e_to_b[old * NFACES..(old + 1) * NFACES]);
        }
        self.e_to_v = e_to_v;
        self.e_to_b = e_to_b;
        Ok(())
    }

    /// Copies elements `range` into a standalone fragment.
    ///
    /// Per-element coordinates are gathered from the vertex tables, so the
    /// fragment no longer needs the global vertex arrays.
    pub fn extract(&self, range: Range<usize>) -> Result<MeshFragment, MeshConnectError> {
        if range.end > self.n_elements() || range.start > range.end {
            return Err(MeshConnectError::InvalidMesh(format!(
                "element range {range:?} outside 0..{}",
                self.n_elements()
            )));
        }
        let n = range.len();
        let mut ex = Vec::with_capacity(n * NVERTS);
        let mut ey = Vec::with_capacity(n * NVERTS);
        let e_to_v = self.e_to_v[range.start * NVERTS..range.end * NVERTS].to_vec();
        for &v in &e_to_v {
            ex.push(self.vx[v as usize]);
            ey.push(self.vy[v as usize]);
        }
        let e_to_b = self.e_to_b[range.start * NFACES..range.end * NFACES].to_vec();
        MeshFragment::try_new(ex, ey, e_to_v, e_to_b)
    }
}
