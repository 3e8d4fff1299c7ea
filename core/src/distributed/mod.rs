//! # Column-parallel plumbing
//!
//! An embedding table is split along its **columns**: every worker keeps every row, but
//! only its own slice of each row. Lookups therefore run on all workers with the same ids,
//! and each produces a narrow partial result that has to be stitched back together.
//!
//! ## 📦 Module Contents
//!
//! *   [`partition`]: which columns a rank owns.
//! *   [`topology::ProcessTopology`]: rank and world size, passed explicitly.
//! *   [`backend::CollectiveBackend`]: the interface for communication.
//! *   [`cpu_backend::CpuBackend`]: an in-process backend over `crossbeam` channels,
//!     one thread per rank.
//! *   [`all_to_all`]: the two-exchange protocol that turns `[batch, shard_width]` partial
//!     outputs into `[batch, embedding_dim]` on every worker.

pub mod all_to_all;
pub mod backend;
pub mod cpu_backend;
pub mod partition;
pub mod topology;

pub use all_to_all::{OutputLayout, all_to_all_2d, dual_all_to_all, scatter_grad};
pub use backend::CollectiveBackend;
pub use cpu_backend::CpuBackend;
pub use partition::{ColumnShard, partition};
pub use topology::ProcessTopology;
