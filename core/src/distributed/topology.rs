use crate::error::{Error, Result};

/// A worker's identity within the process group.
///
/// Passed explicitly to every component that needs it; nothing in this crate reads rank
/// or world size from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTopology {
    pub rank: usize,
    pub world_size: usize,
}

impl ProcessTopology {
    pub fn new(rank: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 || rank >= world_size {
            return Err(Error::InvalidRank { rank, world_size });
        }
        Ok(Self { rank, world_size })
    }
}
