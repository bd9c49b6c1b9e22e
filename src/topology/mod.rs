//! Triangle mesh data model.
//!
//! - [`triangle`]: fixed topology constants and the face-to-vertex rule
//! - [`face_key`]: canonical face identity used for routing and matching
//! - [`fragment`]: one rank's local slice of the mesh
//! - [`global_mesh`]: the root-only complete mesh
//! - [`lonely_face`]: descriptors exchanged during cross-process resolution

pub mod face_key;
pub mod fragment;
pub mod global_mesh;
pub mod lonely_face;
pub mod triangle;

pub use face_key::FaceKey;
pub use fragment::MeshFragment;
pub use global_mesh::GlobalMesh;
pub use lonely_face::{LonelyFace, RemoteNeighbor};
pub use triangle::{NFACES, NVERTS, VertexId};
