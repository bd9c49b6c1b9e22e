//! Local (single-fragment) element-to-element connectivity.
//
// Faces are matched by their canonical `FaceKey` with a first-seen map:
// the first element to present a key parks itself, the second one links
// both sides. Further claimants are counted and reported once the whole
// fragment has been scanned: the fragment itself is non-manifold.

use crate::debug_invariants::DebugInvariants;
use crate::mesh_error::MeshConnectError;
use crate::topology::face_key::FaceKey;
use crate::topology::fragment::MeshFragment;
use crate::topology::triangle::NFACES;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

/// Fills a fragment's local neighbor tables, leaving faces whose partner is
/// not in the fragment unresolved.
pub trait LocalAdjacency {
    fn resolve_local(&self, fragment: &mut MeshFragment) -> Result<(), MeshConnectError>;
}

/// Default resolver: hash faces by [`FaceKey`].
#[derive(Copy, Clone, Debug, Default)]
pub struct FaceKeyAdjacency;

enum Slot {
    Open(usize, usize),
    Claimed(usize),
}

impl LocalAdjacency for FaceKeyAdjacency {
    fn resolve_local(&self, fragment: &mut MeshFragment) -> Result<(), MeshConnectError> {
        fragment.clear_connectivity();
        let n = fragment.n_elements();
        let mut first_owner: HashMap<FaceKey, Slot> = HashMap::with_capacity(n * NFACES / 2 + 1);
        let mut first_overflow: Option<FaceKey> = None;

        for e in 0..n {
            for f in 0..NFACES {
                let (v1, v2) = fragment.face_vertices(e, f);
                if v1 == v2 {
                    return Err(MeshConnectError::InvalidFragment(format!(
                        "element {e} face {f} is degenerate (vertex {v1} twice)"
                    )));
                }
                let key = FaceKey::new(v1, v2);
                match first_owner.entry(key) {
                    Entry::Vacant(slot) => {
                        slot.insert(Slot::Open(e, f));
                    }
                    Entry::Occupied(mut slot) => match *slot.get() {
                        Slot::Open(oe, of) => {
                            fragment.set_local_neighbor(e, f, oe, of)?;
                            fragment.set_local_neighbor(oe, of, e, f)?;
                            slot.insert(Slot::Claimed(2));
                        }
                        Slot::Claimed(m) => {
                            slot.insert(Slot::Claimed(m + 1));
                            first_overflow.get_or_insert(key);
                        }
                    },
                }
            }
        }
        if let Some(key) = first_overflow {
            let multiplicity = match first_owner.get(&key) {
                Some(Slot::Claimed(m)) => *m,
                _ => 3,
            };
            return Err(MeshConnectError::NonManifoldFace { key, multiplicity });
        }
        fragment.debug_assert_invariants();
        log::debug!(
            "local adjacency: {n} elements, {} lonely faces",
            fragment.lonely_faces().count()
        );
        Ok(())
    }
}
