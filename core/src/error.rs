use crate::tensor::TensorError;
use shardcache_kernels::KernelError;
use thiserror::Error;

/// Errors raised by the cache, partitioning and dispatch layers.
///
/// Cache misses, evictions and a partially warmed cache are normal operation and never
/// show up here.
#[derive(Error, Debug)]
pub enum Error {
    /// The embedding dimension cannot be split across this many workers.
    #[error(
        "Embedding dimension {embedding_dim} must be at least the world size {world_size} of the process group"
    )]
    Configuration {
        embedding_dim: usize,
        world_size: usize,
    },
    /// A rank outside `[0, world_size)` was requested.
    #[error("Rank {rank} is invalid for world size {world_size}")]
    InvalidRank { rank: usize, world_size: usize },
    /// The cache cannot hold the rows a lookup needs at the same time.
    #[error("Cache capacity {capacity} cannot hold the {requested} distinct rows of this lookup")]
    Capacity { capacity: usize, requested: usize },
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A write was attempted on an embedding built with `freeze = true`.
    #[error("Embedding weights are frozen")]
    Frozen,
    /// A peer hung up or sent an unexpected chunk during a collective.
    #[error("Collective communication failed: {0}")]
    Collective(String),
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

pub type Result<T> = std::result::Result<T, Error>;
