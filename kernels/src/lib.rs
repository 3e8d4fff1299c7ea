//! CPU kernels for `shardcache`.
//!
//! Kernels operate on flat row-major slices and know nothing about tensors, caches or
//! workers. The core crate wraps them; keeping them here lets a device backend replace
//! them without touching the cache logic.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_embedding_bag;
pub mod cpu_rows;

pub use cpu_embedding_bag::{PoolingMode, cpu_embedding_bag};
pub use cpu_rows::{cpu_gather_rows, cpu_scatter_rows};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Row index {index} out of bounds for {rows} rows")]
    IndexOutOfBounds { index: usize, rows: usize },
    #[error("Invalid bag offsets: {0}")]
    InvalidOffsets(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for elements that can be processed by kernels.
/// This mirrors `TensorElem` in the main crate to avoid circular dependencies.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}

/// Number of `width`-wide rows in `data`, or a shape error if it is ragged.
pub(crate) fn row_count<T>(data: &[T], width: usize) -> Result<usize> {
    if width == 0 {
        return Ok(0);
    }
    if data.len() % width != 0 {
        return Err(KernelError::ShapeMismatch {
            expected: vec![data.len() / width, width],
            got: vec![data.len()],
        });
    }
    Ok(data.len() / width)
}
