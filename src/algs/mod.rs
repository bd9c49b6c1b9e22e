//! Re-export public algorithms.

pub mod communicator;
pub mod connect;
pub mod distribute;
pub mod local_adjacency;
pub mod ordering;
pub mod partition;
pub mod wire;

pub use connect::{ConnectConfig, ConnectReport, connect_fragment, distribute_and_connect};
pub use distribute::{DistributeConfig, gather_mesh, load_and_distribute, scatter_mesh};
pub use local_adjacency::{FaceKeyAdjacency, LocalAdjacency};
