#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-connect
//!
//! mesh-connect distributes an unstructured 2-D triangle mesh over a process
//! group and resolves element-to-element adjacency across process boundaries.
//! Each rank ends up with a [`MeshFragment`](topology::MeshFragment) whose
//! faces are either paired with a local element, paired with an element on
//! another rank, or known to lie on the physical boundary.
//!
//! ## Features
//! - Balanced contiguous partitioning and root-to-all mesh scatter
//! - Face routing by `min(v1, v2) mod size`, so the two halves of any shared
//!   face meet on one owner rank without global coordination
//! - Sort-based pairing with non-manifold detection
//! - Group-wide error agreement: one failing rank aborts every rank
//! - Pluggable communication backends (in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-connect = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "rayon", "strict-invariants"]
//! ```
//!
//! ## Determinism
//!
//! Matching sorts each owner's pool by `(face key, rank, element, face)`, so
//! the resulting neighbor tables do not depend on message arrival order.

pub mod algs;
pub mod debug_invariants;
pub mod mesh_error;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use mesh_error::MeshConnectError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{
        CommTag, Communicator, LocalComm, NoComm, Wait, run_group,
    };
    pub use crate::algs::connect::{
        ConnectConfig, ConnectReport, connect_fragment, distribute_and_connect,
    };
    pub use crate::algs::distribute::{
        DistributeConfig, gather_mesh, load_and_distribute, scatter_mesh,
    };
    pub use crate::algs::local_adjacency::{FaceKeyAdjacency, LocalAdjacency};
    pub use crate::algs::ordering::{ElementOrdering, IdentityOrdering, MortonOrdering};
    pub use crate::algs::partition::{partition_counts, partition_ranges};
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::mesh_error::MeshConnectError;
    pub use crate::topology::{FaceKey, GlobalMesh, LonelyFace, MeshFragment, RemoteNeighbor};
}
