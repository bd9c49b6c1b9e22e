//! Fixed triangle topology shared by every fragment.
//!
//! Face `f` of an element joins its local vertices `f` and `(f + 1) % 3`, so
//! the face opposite local vertex 2 is face 0, and so on around the element.

/// Global vertex identifier, as stored in element-to-vertex tables.
pub type VertexId = u64;

/// Vertices per element.
pub const NVERTS: usize = 3;
/// Faces per element.
pub const NFACES: usize = 3;

/// Local vertex indices `(a, b)` spanned by face `face`.
#[inline]
pub const fn face_local_vertices(face: usize) -> (usize, usize) {
    (face, (face + 1) % NVERTS)
}

/// Global vertex ids of face `face` taken from one element's vertex row.
///
/// `verts` must hold exactly [`NVERTS`] entries.
#[inline]
pub fn face_vertices(verts: &[VertexId], face: usize) -> (VertexId, VertexId) {
    debug_assert_eq!(verts.len(), NVERTS);
    let (a, b) = face_local_vertices(face);
    (verts[a], verts[b])
}
