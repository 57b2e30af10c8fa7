use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum node size used by [`TreeConfig::default`].
pub const DEFAULT_MAX_NODE_SIZE: usize = 16;

/// Configuration stored in a tree's descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of items per node. Must be even and at least 4 so
    /// that splitting `max + 1` items around the middle one leaves two
    /// halves of exactly `max / 2`.
    pub max_node_size: usize,
    /// Opaque reference to the host's key-extraction callable, used by
    /// integrations that derive keys from application records.
    pub key_extractor: Option<String>,
}

impl TreeConfig {
    #[must_use]
    pub fn new(max_node_size: usize) -> Self {
        Self {
            max_node_size,
            key_extractor: None,
        }
    }

    #[must_use]
    pub fn with_key_extractor(mut self, reference: impl Into<String>) -> Self {
        self.key_extractor = Some(reference.into());
        self
    }

    /// Minimum number of items in every non-root node.
    #[must_use]
    pub const fn min_node_size(&self) -> usize {
        self.max_node_size / 2
    }

    /// Checks the split arithmetic's assumptions about `max_node_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMaxNodeSize`] if the size is odd or below 4.
    pub fn validate(&self) -> Result<()> {
        if self.max_node_size % 2 != 0 || self.max_node_size < 4 {
            return Err(Error::InvalidMaxNodeSize(self.max_node_size));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NODE_SIZE)
    }
}
