use super::config::EmbeddingBagConfig;
use super::embedding_bag::{PADDING_SLOT, bag_bounds, pool_bags};
use super::init::init_shard;
use super::module::Module;
use crate::cache::{CacheStats, RowCacheManager};
use crate::distributed::partition;
use crate::error::{Error, Result};
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};
use shardcache_kernels::{KernelError, PoolingMode};
use tracing::{debug, trace};

/// Phases of one forward call.
///
/// `Reshaping` only happens in the column-parallel layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPhase {
    Resolving,
    Aggregating,
    Reshaping,
    Done,
}

/// One batch of bags to look up.
#[derive(Debug, Clone, Copy)]
pub struct BagBatch<'a, T> {
    pub indices: &'a [usize],
    /// Start of every bag in `indices`. `None` makes each index its own bag.
    pub offsets: Option<&'a [usize]>,
    /// One scale per index, `Sum` pooling only.
    pub per_sample_weights: Option<&'a [T]>,
}

impl<'a, T> BagBatch<'a, T> {
    pub fn new(indices: &'a [usize]) -> Self {
        Self {
            indices,
            offsets: None,
            per_sample_weights: None,
        }
    }

    pub fn with_offsets(mut self, offsets: &'a [usize]) -> Self {
        self.offsets = Some(offsets);
        self
    }

    pub fn with_per_sample_weights(mut self, weights: &'a [T]) -> Self {
        self.per_sample_weights = Some(weights);
        self
    }
}

/// An embedding bag whose table lives behind a [`RowCacheManager`].
///
/// Pooling only ever reads the device buffer. A batch whose distinct rows do not fit in
/// the cache is processed in rounds: each round resolves its rows, pools its bags, and
/// the per-round outputs are stacked in bag order.
#[derive(Debug)]
pub struct FreqAwareEmbeddingBag<T: TensorElem> {
    cache: RowCacheManager<T>,
    mode: PoolingMode,
    padding_idx: Option<usize>,
    include_last_offset: bool,
    frozen: bool,
}

impl<T: TensorElem> FreqAwareEmbeddingBag<T> {
    /// A randomly initialized, full-width table.
    pub fn new(config: EmbeddingBagConfig) -> Result<Self> {
        let shard = partition(config.embedding_dim, 0, 1)?;
        let weight = init_shard(config.num_embeddings, shard, config.seed)?;
        Self::from_weight(weight, &config, false)
    }

    /// Wraps an existing `[num_embeddings, width]` table.
    ///
    /// `width` may be a column shard of `config.embedding_dim`.
    pub fn from_weight(
        weight: Tensor<T, 2, Cpu>,
        config: &EmbeddingBagConfig,
        freeze: bool,
    ) -> Result<Self> {
        config.validate()?;
        if weight.shape()[0] != config.num_embeddings {
            return Err(TensorError::ShapeMismatch {
                expected: vec![config.num_embeddings, weight.shape()[1]],
                got: weight.shape().to_vec(),
            }
            .into());
        }

        let cache = RowCacheManager::new(
            weight,
            config.cache.clone(),
            config.frequency_ranking.as_deref(),
        )?;
        Ok(Self {
            cache,
            mode: config.mode,
            padding_idx: config.padding_idx,
            include_last_offset: config.include_last_offset,
            frozen: freeze,
        })
    }

    /// Pools every bag of `batch` into a `[num_bags, width]` tensor.
    ///
    /// A bag split across rounds is pooled piece by piece and merged, so the result is the
    /// same as pooling the whole table in one go.
    ///
    /// # Errors
    ///
    /// * [`Error::Capacity`] if the cache has no slots and some id needs one.
    /// * [`Error::Kernel`] for malformed offsets or per-sample weights.
    /// * [`Error::Tensor`] for ids outside the table.
    pub fn forward(&mut self, batch: BagBatch<'_, T>) -> Result<Tensor<T, 2, Cpu>> {
        let indices = batch.indices;
        let bounds = bag_bounds(indices.len(), batch.offsets, self.include_last_offset)?;
        if let Some(weights) = batch.per_sample_weights {
            if self.mode != PoolingMode::Sum {
                return Err(KernelError::Unsupported(format!(
                    "per_sample_weights require Sum pooling, got {:?}",
                    self.mode
                ))
                .into());
            }
            if weights.len() != indices.len() {
                return Err(KernelError::ShapeMismatch {
                    expected: vec![indices.len()],
                    got: vec![weights.len()],
                }
                .into());
            }
        }

        let rounds = self.cache.plan_rounds(indices, &bounds, self.padding_idx)?;
        let num_bags = bounds.len() - 1;
        let width = self.width();
        debug!(
            bags = num_bags,
            indices = indices.len(),
            rounds = rounds.len(),
            "embedding bag forward"
        );

        // Mean is pooled as a sum and divided once every piece of the bag is in.
        let piece_mode = match self.mode {
            PoolingMode::Max => PoolingMode::Max,
            PoolingMode::Sum | PoolingMode::Mean => PoolingMode::Sum,
        };
        let mut pooled = vec![T::zero(); num_bags * width];
        let mut seen = vec![0usize; num_bags];

        for round in rounds {
            let (lo, hi) = (round.start, round.end);
            let ids = &indices[lo..hi];

            trace!(phase = ?ForwardPhase::Resolving, ids = ?round);
            let lookups: Vec<usize> = ids
                .iter()
                .copied()
                .filter(|&id| Some(id) != self.padding_idx)
                .collect();
            let resolved = self.cache.resolve(&lookups)?;

            let mut resolved_slots = resolved.slots.into_iter();
            let slots: Vec<usize> = ids
                .iter()
                .map(|&id| {
                    if Some(id) == self.padding_idx {
                        Some(PADDING_SLOT)
                    } else {
                        resolved_slots.next()
                    }
                })
                .collect::<Option<_>>()
                .ok_or_else(|| Error::InvalidConfig("resolve returned too few slots".into()))?;

            // Pieces of the bags overlapping this round, starting with the bag holding `lo`.
            let first_bag = bounds.partition_point(|&b| b <= lo) - 1;
            let mut piece_bounds = vec![0];
            let mut last_bag = first_bag;
            while bounds[last_bag + 1] < hi {
                piece_bounds.push(bounds[last_bag + 1] - lo);
                last_bag += 1;
            }
            piece_bounds.push(hi - lo);

            trace!(phase = ?ForwardPhase::Aggregating, bags = ?(first_bag..=last_bag));
            let partial = pool_bags(
                self.cache.cached_weight(),
                &slots,
                &piece_bounds,
                piece_mode,
                batch.per_sample_weights.map(|w| &w[lo..hi]),
                Some(PADDING_SLOT),
            )?;

            for (piece, bag) in (first_bag..=last_bag).enumerate() {
                let count = slots[piece_bounds[piece]..piece_bounds[piece + 1]]
                    .iter()
                    .filter(|&&slot| slot != PADDING_SLOT)
                    .count();
                if count == 0 {
                    continue;
                }
                let src = &partial.data()[piece * width..(piece + 1) * width];
                let dst = &mut pooled[bag * width..(bag + 1) * width];
                match piece_mode {
                    PoolingMode::Max if seen[bag] == 0 => dst.copy_from_slice(src),
                    PoolingMode::Max => {
                        for (d, &v) in dst.iter_mut().zip(src) {
                            if v > *d {
                                *d = v;
                            }
                        }
                    }
                    _ => {
                        for (d, &v) in dst.iter_mut().zip(src) {
                            *d += v;
                        }
                    }
                }
                seen[bag] += count;
            }
        }

        if self.mode == PoolingMode::Mean {
            for (row, &count) in pooled.chunks_mut(width.max(1)).zip(&seen) {
                if count > 1 {
                    let n = T::from_usize(count).ok_or_else(|| {
                        Error::InvalidConfig(format!(
                            "bag size {} does not fit element type",
                            count
                        ))
                    })?;
                    for v in row.iter_mut() {
                        *v = *v / n;
                    }
                }
            }
        }

        trace!(phase = ?ForwardPhase::Done);
        Ok(Tensor::new(pooled, [num_bags, width])?)
    }

    /// Writes every cached row back to the host table.
    pub fn flush_all(&mut self) -> Result<()> {
        self.cache.flush_all()
    }

    /// Flushes, then copies out the full `[num_embeddings, width]` table.
    pub fn export_weight(&mut self) -> Result<Tensor<T, 2, Cpu>> {
        self.cache.export_weight()
    }

    /// The device buffer, for training-time updates of resident rows.
    ///
    /// # Errors
    ///
    /// [`Error::Frozen`] if the layer was built frozen.
    pub fn cached_weight_mut(&mut self) -> Result<&mut Tensor<T, 2, Cpu>> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        Ok(self.cache.cached_weight_mut())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn cache(&self) -> &RowCacheManager<T> {
        &self.cache
    }

    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    pub fn mode(&self) -> PoolingMode {
        self.mode
    }

    pub fn padding_idx(&self) -> Option<usize> {
        self.padding_idx
    }

    pub fn num_embeddings(&self) -> usize {
        self.cache.num_rows()
    }

    /// Columns held by this layer.
    pub fn width(&self) -> usize {
        self.cache.width()
    }
}

impl<T: TensorElem> Module<T> for FreqAwareEmbeddingBag<T> {
    fn num_parameters(&self) -> usize {
        self.num_embeddings() * self.width()
    }

    fn is_trainable(&self) -> bool {
        !self.frozen
    }
}
