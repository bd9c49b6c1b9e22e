//! MeshConnectError: Unified error type for mesh-connect public APIs
//!
//! Every fallible operation in the crate reports through this type, so a
//! failure detected on one rank can be carried across the group-wide error
//! agreement step unchanged.

use crate::topology::face_key::FaceKey;
use thiserror::Error;

/// Unified error type for mesh-connect operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshConnectError {
    /// A point-to-point message from `neighbor` was missing or malformed.
    #[error("communication error with rank {neighbor}: {detail}")]
    CommError { neighbor: usize, detail: String },
    /// Declared sizes and delivered bytes disagree, or a record failed to decode.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// More than two elements claim the same face.
    #[error("topology error: face {key} is shared by {multiplicity} elements (non-manifold)")]
    NonManifoldFace { key: FaceKey, multiplicity: usize },
    /// Another rank failed and the group agreed to abort.
    #[error("group abort: ranks {ranks:?} reported failure")]
    GroupAbort { ranks: Vec<usize> },
    /// The global mesh handed to the distributor is inconsistent.
    #[error("invalid global mesh: {0}")]
    InvalidMesh(String),
    /// A local fragment's tables are inconsistent.
    #[error("invalid mesh fragment: {0}")]
    InvalidFragment(String),
    /// A configuration value cannot be honoured by this process group.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The root rank was asked to distribute without a global mesh.
    #[error("root rank {0} has no global mesh to distribute")]
    MissingGlobalMesh(usize),
}

impl MeshConnectError {
    /// Convenience constructor mirroring the transport's per-peer failures.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        Self::CommError {
            neighbor,
            detail: msg.into(),
        }
    }

    /// `true` for errors that came from a peer rather than from this rank.
    pub fn is_group_abort(&self) -> bool {
        matches!(self, Self::GroupAbort { .. })
    }
}
