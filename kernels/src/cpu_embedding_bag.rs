use crate::{KernelElem, KernelError, Result, row_count};
use rayon::prelude::*;

/// How the rows of one bag are reduced to a single output row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingMode {
    Sum,
    #[default]
    Mean,
    Max,
}

/// CPU Implementation of Embedding Bag pooling.
///
/// Bag `b` covers `indices[bounds[b]..bounds[b + 1]]`; every referenced row of `weight`
/// is pooled into row `b` of the output.
///
/// # Arguments
///
/// * `weight` - Row-major `[rows, width]` table the indices point into.
/// * `width` - Number of columns per row.
/// * `indices` - Row indices, bag after bag.
/// * `bounds` - `num_bags + 1` boundaries; starts at 0 and ends at `indices.len()`.
/// * `mode` - Reduction applied inside each bag.
/// * `per_sample_weights` - Optional scale per index (only valid with [`PoolingMode::Sum`]).
/// * `padding_idx` - Entries equal to this index are skipped entirely.
///
/// Empty bags (or bags made only of padding) produce a row of zeros. `Mean` divides by the
/// number of non-padding entries.
///
/// # Returns
///
/// A flattened `[num_bags, width]` vector.
pub fn cpu_embedding_bag<T: KernelElem>(
    weight: &[T],
    width: usize,
    indices: &[usize],
    bounds: &[usize],
    mode: PoolingMode,
    per_sample_weights: Option<&[T]>,
    padding_idx: Option<usize>,
) -> Result<Vec<T>> {
    let rows = row_count(weight, width)?;
    validate_bounds(bounds, indices.len())?;

    if let Some(w) = per_sample_weights {
        if mode != PoolingMode::Sum {
            return Err(KernelError::Unsupported(format!(
                "per_sample_weights require Sum pooling, got {:?}",
                mode
            )));
        }
        if w.len() != indices.len() {
            return Err(KernelError::ShapeMismatch {
                expected: vec![indices.len()],
                got: vec![w.len()],
            });
        }
    }

    for &idx in indices {
        if Some(idx) != padding_idx && idx >= rows {
            return Err(KernelError::IndexOutOfBounds { index: idx, rows });
        }
    }

    let num_bags = bounds.len() - 1;
    let mut out = vec![T::zero(); num_bags * width];
    if width == 0 {
        return Ok(out);
    }

    out.par_chunks_mut(width)
        .enumerate()
        .for_each(|(bag, out_row)| {
            let (start, end) = (bounds[bag], bounds[bag + 1]);
            let mut count = 0usize;

            for pos in start..end {
                let idx = indices[pos];
                if Some(idx) == padding_idx {
                    continue;
                }
                let row = &weight[idx * width..(idx + 1) * width];

                match mode {
                    PoolingMode::Sum | PoolingMode::Mean => {
                        let scale = per_sample_weights.map_or(T::one(), |w| w[pos]);
                        for (o, &v) in out_row.iter_mut().zip(row) {
                            *o += v * scale;
                        }
                    }
                    PoolingMode::Max => {
                        if count == 0 {
                            out_row.copy_from_slice(row);
                        } else {
                            for (o, &v) in out_row.iter_mut().zip(row) {
                                if v > *o {
                                    *o = v;
                                }
                            }
                        }
                    }
                }
                count += 1;
            }

            if mode == PoolingMode::Mean && count > 1 {
                // usize -> T only fails for exotic element types; fall back to the sum.
                if let Some(n) = T::from_usize(count) {
                    for o in out_row.iter_mut() {
                        *o = *o / n;
                    }
                }
            }
        });

    Ok(out)
}

fn validate_bounds(bounds: &[usize], len: usize) -> Result<()> {
    match (bounds.first(), bounds.last()) {
        (Some(0), Some(&last)) if last == len => {}
        _ => {
            return Err(KernelError::InvalidOffsets(format!(
                "bounds must start at 0 and end at {}, got {:?}",
                len, bounds
            )));
        }
    }
    if bounds.windows(2).any(|w| w[0] > w[1]) {
        return Err(KernelError::InvalidOffsets(format!(
            "bounds must be non-decreasing, got {:?}",
            bounds
        )));
    }
    Ok(())
}
