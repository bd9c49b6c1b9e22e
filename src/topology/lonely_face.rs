//! Descriptors for faces that could not be closed inside one fragment.

use crate::topology::face_key::FaceKey;
use crate::topology::triangle::VertexId;
use serde::{Deserialize, Serialize};

/// The element/face on another rank that shares a face with a local element.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteNeighbor {
    /// Rank owning the neighbor element.
    pub rank: usize,
    /// Neighbor element index, local to `rank`.
    pub element: usize,
    /// Neighbor face index within that element.
    pub face: usize,
}

/// A "lonely" face: open in its own fragment, waiting for a partner elsewhere.
///
/// `rank` is the rank that discovered the face (and owns `element`), not the
/// rank the descriptor is routed to for matching.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LonelyFace {
    pub element: usize,
    pub face: usize,
    pub v1: VertexId,
    pub v2: VertexId,
    pub rank: usize,
    /// Filled in by matching; `None` means a genuine boundary face.
    pub neighbor: Option<RemoteNeighbor>,
    /// Marker for a face already paired inside its own fragment. It stands
    /// for two claimants when the owner counts multiplicity and is never
    /// matched or sent back.
    #[serde(default)]
    pub locally_closed: bool,
}

impl LonelyFace {
    /// A fresh, unmatched descriptor.
    pub fn new(element: usize, face: usize, v1: VertexId, v2: VertexId, rank: usize) -> Self {
        Self {
            element,
            face,
            v1,
            v2,
            rank,
            neighbor: None,
            locally_closed: false,
        }
    }

    /// Marker for a face that `rank` already closed between two of its own
    /// elements; `(element, face)` is one side of that pair.
    pub fn closed_marker(element: usize, face: usize, v1: VertexId, v2: VertexId, rank: usize) -> Self {
        Self {
            locally_closed: true,
            ..Self::new(element, face, v1, v2, rank)
        }
    }

    /// Claimants this record represents for its key.
    #[inline]
    pub fn multiplicity(&self) -> usize {
        if self.locally_closed { 2 } else { 1 }
    }

    #[inline]
    pub fn key(&self) -> FaceKey {
        FaceKey::new(self.v1, self.v2)
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.neighbor.is_some()
    }

    /// How a partner sees this face once the two are linked.
    #[inline]
    pub fn as_neighbor(&self) -> RemoteNeighbor {
        RemoteNeighbor {
            rank: self.rank,
            element: self.element,
            face: self.face,
        }
    }
}
