//! Random initialization of a table shard.

use crate::distributed::ColumnShard;
use crate::error::Result;
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

fn row_seed(seed: u64, row: usize) -> u64 {
    seed ^ (row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Draws the `shard` columns of a `num_rows`-row table from `U[-1/num_rows, 1/num_rows)`.
///
/// Every row has its own generator and always draws the full row prefix up to
/// `shard.end`, so the value at `(row, col)` depends only on `seed`, never on how the
/// columns are split.
pub fn init_shard<T: TensorElem>(
    num_rows: usize,
    shard: ColumnShard,
    seed: u64,
) -> Result<Tensor<T, 2, Cpu>> {
    let width = shard.width();
    let mut weight = Tensor::zeros([num_rows, width]);
    if width == 0 || num_rows == 0 {
        return Ok(weight);
    }
    let bound = 1.0 / num_rows as f64;

    weight
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .try_for_each(|(row, out)| {
            let mut rng = StdRng::seed_from_u64(row_seed(seed, row));
            for col in 0..shard.end {
                let value: f64 = rng.random_range(-bound..bound);
                if col >= shard.start {
                    out[col - shard.start] = T::from_f64(value).ok_or_else(|| {
                        TensorError::Unsupported(format!("cannot represent {value}"))
                    })?;
                }
            }
            Ok::<(), TensorError>(())
        })?;

    Ok(weight)
}
