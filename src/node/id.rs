use std::fmt;
use std::num::NonZero;

use serde::{Deserialize, Serialize};

/// An opaque reference to a node document in a [`NodeStore`](crate::NodeStore).
///
/// Stores mint IDs; the tree only copies, compares and hands them back.
/// IDs are non-zero so that `Option<NodeId>` costs nothing extra.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct NodeId(NonZero<u64>);

impl NodeId {
    /// Largest slot index an ID can be built from.
    pub const MAX: usize = (u64::MAX - 1) as usize;

    /// Builds the ID for slot `index` of an indexed store.
    ///
    /// # Panics
    ///
    /// Panics if `index > NodeId::MAX`.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        assert!(index <= Self::MAX, "`NodeId::from_index()` - `index` > `NodeId::MAX`!");
        match NonZero::new(index as u64 + 1) {
            Some(raw) => Self(raw),
            None => unreachable!(),
        }
    }

    /// Returns the slot index this ID was built from.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use static_assertions::assert_eq_size;

    // Verify our assumptions about `NodeId` and the niche optimization.
    assert_eq_size!(NodeId, Option<NodeId>);
    assert_eq_size!(NodeId, u64);

    #[test]
    #[should_panic(expected = "`NodeId::from_index()` - `index` > `NodeId::MAX`!")]
    fn invalid_id() {
        let _ = NodeId::from_index(NodeId::MAX + 1);
    }

    #[test]
    fn display_is_one_based() {
        assert_eq!(NodeId::from_index(0).to_string(), "#1");
        assert_eq!(NodeId::from_index(41).to_string(), "#42");
    }

    #[test]
    fn serializes_as_plain_number() {
        let id = NodeId::from_index(6);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(serde_json::from_str::<NodeId>("7").unwrap(), id);
        assert!(serde_json::from_str::<NodeId>("0").is_err());
    }

    proptest! {
        #[test]
        fn id_round_trip(index in 0..=(u32::MAX as usize)) {
            let id = NodeId::from_index(index);
            assert_eq!(id.to_index(), index);
        }
    }
}
