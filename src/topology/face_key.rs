//! `FaceKey`: canonical identity of a triangle face.
//!
//! Two elements sharing a face walk it in opposite directions, so the key is
//! the unordered pair `(min(v1, v2), max(v1, v2))`. Routing and matching both
//! use it, which is what lets two ranks agree on a face without talking.

use crate::topology::triangle::VertexId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unordered pair of global vertex ids, stored low-then-high.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceKey {
    lo: VertexId,
    hi: VertexId,
}

impl FaceKey {
    /// Builds the key for the face between `v1` and `v2`, in either order.
    #[inline]
    pub fn new(v1: VertexId, v2: VertexId) -> Self {
        if v1 <= v2 {
            Self { lo: v1, hi: v2 }
        } else {
            Self { lo: v2, hi: v1 }
        }
    }

    /// Smaller vertex id; this is the value face routing is computed from.
    #[inline]
    pub const fn lo(self) -> VertexId {
        self.lo
    }

    /// Larger vertex id.
    #[inline]
    pub const fn hi(self) -> VertexId {
        self.hi
    }
}

impl fmt::Debug for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FaceKey").field(&self.lo).field(&self.hi).finish()
    }
}

impl fmt::Display for FaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn order_is_low_then_high() {
        let k = FaceKey::new(7, 4);
        assert_eq!((k.lo(), k.hi()), (4, 7));
        assert_eq!(format!("{k}"), "(4, 7)");
    }

    #[test]
    fn keys_sort_lexicographically() {
        let mut keys = vec![FaceKey::new(3, 1), FaceKey::new(1, 2), FaceKey::new(0, 9)];
        keys.sort();
        assert_eq!(keys, vec![FaceKey::new(0, 9), FaceKey::new(1, 2), FaceKey::new(1, 3)]);
    }

    proptest! {
        #[test]
        fn key_is_symmetric(v1 in any::<u64>(), v2 in any::<u64>()) {
            prop_assert_eq!(FaceKey::new(v1, v2), FaceKey::new(v2, v1));
        }
    }
}
