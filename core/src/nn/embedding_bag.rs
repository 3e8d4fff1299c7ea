//! The pooling primitive on tensors.

use crate::error::Result;
use crate::tensor::{Cpu, Tensor, TensorElem};
use shardcache_kernels::{KernelError, PoolingMode, cpu_embedding_bag};

/// Slot id given to padding lookups. It never names a real slot, so pooling skips it.
pub const PADDING_SLOT: usize = usize::MAX;

/// Turns user-facing `offsets` into `num_bags + 1` bag boundaries over `num_indices` ids.
///
/// Without offsets every index is its own bag. With `include_last_offset` the offsets
/// already end with `num_indices`; otherwise it is appended.
///
/// ```rust
/// use shardcache::nn::bag_bounds;
///
/// assert_eq!(bag_bounds(5, Some(&[0, 2]), false).unwrap(), vec![0, 2, 5]);
/// assert_eq!(bag_bounds(5, Some(&[0, 2, 5]), true).unwrap(), vec![0, 2, 5]);
/// assert_eq!(bag_bounds(3, None, false).unwrap(), vec![0, 1, 2, 3]);
/// ```
pub fn bag_bounds(
    num_indices: usize,
    offsets: Option<&[usize]>,
    include_last_offset: bool,
) -> Result<Vec<usize>> {
    let Some(offsets) = offsets else {
        return Ok((0..=num_indices).collect());
    };

    let mut bounds = offsets.to_vec();
    if !include_last_offset {
        bounds.push(num_indices);
    }

    if bounds.first() != Some(&0) {
        return Err(KernelError::InvalidOffsets(format!(
            "offsets must start at 0, got {:?}",
            offsets.first()
        ))
        .into());
    }
    if bounds.windows(2).any(|w| w[0] > w[1]) {
        return Err(KernelError::InvalidOffsets("offsets must be non-decreasing".into()).into());
    }
    if bounds.last() != Some(&num_indices) {
        return Err(KernelError::InvalidOffsets(format!(
            "last offset must equal the {} indices, got {:?}",
            num_indices,
            bounds.last()
        ))
        .into());
    }
    Ok(bounds)
}

/// Pools the rows of `weight` named by `indices` into one row per bag.
///
/// # Arguments
///
/// * `weight` - `[rows, width]` table.
/// * `indices` - Row ids into `weight`, bag after bag.
/// * `offsets` - Start of every bag in `indices`; see [`bag_bounds`].
/// * `include_last_offset` - Whether `offsets` already ends with `indices.len()`.
/// * `mode` - Sum, mean or max pooling.
/// * `per_sample_weights` - One scale per index, `Sum` only.
/// * `padding_idx` - Lookups of this row contribute nothing.
///
/// # Returns
///
/// A `[num_bags, width]` tensor.
pub fn embedding_bag<T: TensorElem>(
    weight: &Tensor<T, 2, Cpu>,
    indices: &[usize],
    offsets: Option<&[usize]>,
    include_last_offset: bool,
    mode: PoolingMode,
    per_sample_weights: Option<&[T]>,
    padding_idx: Option<usize>,
) -> Result<Tensor<T, 2, Cpu>> {
    let bounds = bag_bounds(indices.len(), offsets, include_last_offset)?;
    pool_bags(weight, indices, &bounds, mode, per_sample_weights, padding_idx)
}

pub(crate) fn pool_bags<T: TensorElem>(
    weight: &Tensor<T, 2, Cpu>,
    indices: &[usize],
    bounds: &[usize],
    mode: PoolingMode,
    per_sample_weights: Option<&[T]>,
    padding_idx: Option<usize>,
) -> Result<Tensor<T, 2, Cpu>> {
    let width = weight.shape()[1];
    let out = cpu_embedding_bag(
        weight.data(),
        width,
        indices,
        bounds,
        mode,
        per_sample_weights,
        padding_idx,
    )?;
    Ok(Tensor::new(out, [bounds.len().saturating_sub(1), width])?)
}
