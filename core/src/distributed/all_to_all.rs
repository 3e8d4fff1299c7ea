//! Reassembling full-width rows from column shards.
//!
//! After pooling, worker `i` holds `[batch, w_i]`: every bag of the batch, but only its own
//! columns. The full result is recovered in two exchanges:
//!
//! ```text
//!            worker 0          worker 1                 worker 0        worker 1
//!          ┌────┐           ┌────┐                   ┌────┬────┐     ┌────┬────┐
//! batch  0 │ a0 │         0 │ b0 │   all-to-all      │ a0 │ b0 │     │ a1 │ b1 │
//! chunk  1 │ a1 │         1 │ b1 │  ───────────▶     └────┴────┘     └────┴────┘
//!          └────┘           └────┘   (rows→cols)     rows chunk 0    rows chunk 1
//! ```
//!
//! 1. Split the batch into `world_size` row chunks, send chunk `j` to worker `j`, and
//!    concatenate what arrives along the columns: worker `j` now owns full-width rows for
//!    batch chunk `j`.
//! 2. Gather those chunks from every worker and stack them along the rows, so each worker
//!    holds the whole `[batch, embedding_dim]` result in the original batch order.
//!
//! Both steps only move values, so the result is bit-identical to concatenating the
//! partial outputs column-wise.

use super::backend::CollectiveBackend;
use super::partition::{ColumnShard, split_sizes};
use crate::error::{Error, Result};
use crate::tensor::{Cpu, Tensor, TensorElem};
use tracing::trace;

/// Where the reassembled output should end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// Every worker gets the full `[batch, embedding_dim]` output.
    #[default]
    Full,
    /// Worker `j` gets only batch chunk `j`, at full width (first exchange only).
    BatchChunk,
}

/// One all-to-all on a matrix: split along `scatter_dim`, exchange, concatenate the received
/// pieces along `gather_dim`.
///
/// Pieces are sized with [`split_sizes`], so uneven extents are split the same way the
/// column partitioner splits the embedding dimension. Calling it again with the two
/// dimensions swapped undoes the exchange.
pub fn all_to_all_2d<B, T>(
    backend: &B,
    tensor: &Tensor<T, 2, Cpu>,
    scatter_dim: usize,
    gather_dim: usize,
) -> Result<Tensor<T, 2, Cpu>>
where
    B: CollectiveBackend,
    T: TensorElem,
{
    if scatter_dim > 1 || gather_dim > 1 {
        return Err(Error::InvalidConfig(format!(
            "all_to_all_2d dims must be 0 or 1, got scatter={} gather={}",
            scatter_dim, gather_dim
        )));
    }

    let ws = backend.world_size();
    let sizes = split_sizes(tensor.shape()[scatter_dim], ws);
    let chunks = if scatter_dim == 0 {
        tensor.split_rows(&sizes)?
    } else {
        tensor.split_cols(&sizes)?
    };

    trace!(
        rank = backend.rank(),
        scatter_dim,
        gather_dim,
        shape = ?tensor.shape(),
        "all_to_all_2d"
    );
    let received = backend.all_to_all(chunks)?;

    let out = if gather_dim == 0 {
        Tensor::cat_rows(&received)?
    } else {
        Tensor::cat_cols(&received)?
    };
    Ok(out)
}

/// Turns this worker's `[batch, shard_width]` partial output into the full-width result.
///
/// The batch dimension must be identical on every worker; the column shards may differ in
/// width.
pub fn dual_all_to_all<B, T>(
    backend: &B,
    partial: &Tensor<T, 2, Cpu>,
    layout: OutputLayout,
) -> Result<Tensor<T, 2, Cpu>>
where
    B: CollectiveBackend,
    T: TensorElem,
{
    let chunk = all_to_all_2d(backend, partial, 0, 1)?;
    match layout {
        OutputLayout::BatchChunk => Ok(chunk),
        OutputLayout::Full => {
            let chunks = backend.all_gather(&chunk)?;
            Ok(Tensor::cat_rows(&chunks)?)
        }
    }
}

/// Routes an output gradient back to the `[batch, shard_width]` layout of the partial
/// output this worker produced.
///
/// With [`OutputLayout::Full`] every worker already holds the whole gradient and only keeps
/// its own columns. With [`OutputLayout::BatchChunk`] the first exchange is inverted.
pub fn scatter_grad<B, T>(
    backend: &B,
    grad: &Tensor<T, 2, Cpu>,
    layout: OutputLayout,
    shard: ColumnShard,
) -> Result<Tensor<T, 2, Cpu>>
where
    B: CollectiveBackend,
    T: TensorElem,
{
    match layout {
        OutputLayout::Full => Ok(grad.narrow_cols(shard.start, shard.width())?),
        OutputLayout::BatchChunk => all_to_all_2d(backend, grad, 1, 0),
    }
}
