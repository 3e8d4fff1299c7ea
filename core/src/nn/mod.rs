//! # Embedding layers
//!
//! *   [`FreqAwareEmbeddingBag`]: an embedding bag backed by a row cache, on one worker.
//! *   [`ParallelEmbeddingBag`]: the same, with the columns split across a process group
//!     and the output reassembled by a dual all-to-all.
//! *   [`embedding_bag`]: the uncached pooling primitive on a plain table.
//!
//! A forward call goes through `Resolving → Aggregating → Reshaping → Done`
//! ([`ForwardPhase`]). Resolving always completes before the device buffer is read.

pub mod config;
pub mod embedding_bag;
pub mod freq_embedding;
pub mod init;
pub mod module;
pub mod parallel_embedding;

pub use config::EmbeddingBagConfig;
pub use embedding_bag::{PADDING_SLOT, bag_bounds, embedding_bag};
pub use freq_embedding::{BagBatch, ForwardPhase, FreqAwareEmbeddingBag};
pub use init::init_shard;
pub use module::Module;
pub use parallel_embedding::ParallelEmbeddingBag;
pub use shardcache_kernels::PoolingMode;
