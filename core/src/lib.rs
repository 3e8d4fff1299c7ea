//! # shardcache
//!
//! `shardcache` serves embedding tables that are too large for device memory. Each worker
//! of a process group owns a contiguous slice of the embedding **columns**, and keeps the
//! most frequently used **rows** of that slice in a fixed-size device buffer backed by a
//! full host copy.
//!
//! ## Modules
//!
//! - [`mod@tensor`]: dense row-major tensors.
//! - [`cache`]: the frequency-aware row cache.
//! - [`distributed`]: column partitioning and the all-to-all reshape.
//! - [`nn`]: cached and column-parallel embedding bags.
//! - [`checkpoint`]: safetensors save/load of tables.
//!
//! ## Example
//!
//! ```rust
//! use shardcache::cache::CacheConfig;
//! use shardcache::distributed::CpuBackend;
//! use shardcache::nn::{BagBatch, EmbeddingBagConfig, ParallelEmbeddingBag, PoolingMode};
//!
//! let backend = CpuBackend::mesh(1).pop().unwrap();
//! let config = EmbeddingBagConfig::new(1_000, 8)
//!     .with_mode(PoolingMode::Sum)
//!     .with_cache(CacheConfig::new(100));
//! let mut bag = ParallelEmbeddingBag::<f32, _>::new(config, backend).unwrap();
//!
//! let out = bag
//!     .forward(BagBatch::new(&[3, 14, 15, 92]).with_offsets(&[0, 2]))
//!     .unwrap();
//! assert_eq!(out.shape(), &[2, 8]);
//! ```

pub mod cache;
pub mod checkpoint;
pub mod distributed;
pub mod error;
pub mod nn;
pub mod tensor;

pub use error::{Error, Result};
pub use tensor::{Cpu, Device, Storage, Tensor, TensorElem, TensorError};
