//! Element orderings applied on the root before distribution.
//!
//! The distributor only consumes the resulting order: contiguous ranges of a
//! spatially coherent ordering give every rank a compact region, which keeps
//! the number of lonely faces (and thus exchange volume) small.

use crate::mesh_error::MeshConnectError;
use crate::topology::global_mesh::GlobalMesh;
use serde::{Deserialize, Serialize};

/// Reorders the elements of a global mesh.
pub trait ElementOrdering {
    fn order(&self, mesh: GlobalMesh) -> Result<GlobalMesh, MeshConnectError>;
}

/// Keeps the input order.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityOrdering;

impl ElementOrdering for IdentityOrdering {
    fn order(&self, mesh: GlobalMesh) -> Result<GlobalMesh, MeshConnectError> {
        Ok(mesh)
    }
}

/// Z-order (Morton) curve over element centroids.
///
/// Centroids are normalized to the mesh bounding box and quantized to a
/// `2^bits x 2^bits` grid; ties keep input order.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct MortonOrdering {
    pub bits: u32,
}

impl Default for MortonOrdering {
    fn default() -> Self {
        Self { bits: 16 }
    }
}

/// Spreads the low 32 bits of `x` into the even bit positions.
fn spread_bits(x: u32) -> u64 {
    let mut v = x as u64;
    v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    v = (v | (v << 1)) & 0x5555_5555_5555_5555;
    v
}

/// Interleaves `x` (even bits) and `y` (odd bits).
pub fn morton_code(x: u32, y: u32) -> u64 {
    spread_bits(x) | (spread_bits(y) << 1)
}

impl MortonOrdering {
    /// The permutation this ordering would apply: new index `i` holds old
    /// element `perm[i]`.
    pub fn permutation(&self, mesh: &GlobalMesh) -> Result<Vec<usize>, MeshConnectError> {
        if self.bits == 0 || self.bits > 32 {
            return Err(MeshConnectError::InvalidConfig(format!(
                "Morton grid needs 1..=32 bits per axis, got {}",
                self.bits
            )));
        }
        let n = mesh.n_elements();
        let centroids: Vec<(f64, f64)> = (0..n).map(|e| mesh.centroid(e)).collect();
        let (mut xmin, mut ymin) = (f64::INFINITY, f64::INFINITY);
        let (mut xmax, mut ymax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &centroids {
            xmin = xmin.min(x);
            xmax = xmax.max(x);
            ymin = ymin.min(y);
            ymax = ymax.max(y);
        }
        let cells = ((1u64 << self.bits) - 1) as f64;
        let quantize = |v: f64, lo: f64, hi: f64| -> u32 {
            if hi > lo {
                (((v - lo) / (hi - lo)) * cells).round().clamp(0.0, cells) as u32
            } else {
                0
            }
        };
        let codes: Vec<u64> = centroids
            .iter()
            .map(|&(x, y)| morton_code(quantize(x, xmin, xmax), quantize(y, ymin, ymax)))
            .collect();
        let mut perm: Vec<usize> = (0..n).collect();
        perm.sort_by_key(|&e| codes[e]);
        Ok(perm)
    }
}

impl ElementOrdering for MortonOrdering {
    fn order(&self, mut mesh: GlobalMesh) -> Result<GlobalMesh, MeshConnectError> {
        let perm = self.permutation(&mesh)?;
        mesh.permute_elements(&perm)?;
        log::debug!("morton ordering applied to {} elements", perm.len());
        Ok(mesh)
    }
}
