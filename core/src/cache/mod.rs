//! # Frequency-aware row cache
//!
//! Only a fraction of an embedding table fits in device memory. The [`RowCacheManager`]
//! keeps the rows that are looked up most often in a fixed-size device buffer and leaves
//! the rest in a host store, swapping rows between the two as lookups demand.
//!
//! ## 📦 Module Contents
//!
//! *   [`RowCacheManager`]: residency bookkeeping, eviction, batched swaps, write-back.
//! *   [`CacheConfig`]: capacity, warmup ratio and transfer batch size.
//! *   [`CacheStats`] / [`TransferCostModel`]: hit rate and modelled transfer time.
//! *   [`plan_rounds`]: splits a batch of bags into cache-sized rounds.
//!
//! ## Eviction order
//!
//! When a miss needs a slot and none is free, the resident row with the smallest
//! `(frequency, last access, row id)` is written back and replaced. Rows referenced by
//! the lookup in progress are never candidates.

pub mod config;
pub mod manager;
pub mod rounds;
pub mod row_table;
pub mod stats;

pub use config::CacheConfig;
pub use manager::{ResolvedIds, RowCacheManager};
pub use rounds::plan_rounds;
pub use row_table::{FrequencyRecord, RowState};
pub use stats::{CacheStats, TransferCostModel, TransferDirection};
