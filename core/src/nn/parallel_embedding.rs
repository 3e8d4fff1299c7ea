use super::config::EmbeddingBagConfig;
use super::freq_embedding::{BagBatch, ForwardPhase, FreqAwareEmbeddingBag};
use super::init::init_shard;
use super::module::Module;
use crate::cache::{CacheStats, RowCacheManager};
use crate::distributed::all_to_all::scatter_grad;
use crate::distributed::{
    CollectiveBackend, ColumnShard, OutputLayout, ProcessTopology, dual_all_to_all, partition,
};
use crate::error::Result;
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};
use std::fmt;
use tracing::{debug, trace};

/// A cached embedding bag whose columns are split across the workers of a process group.
///
/// Every worker builds one with its own backend, feeds it the **same** batch, and gets
/// back the full `[num_bags, embedding_dim]` output (or its batch chunk, see
/// [`OutputLayout`]). Each worker caches only its own column shard; the shards never
/// need to agree on what is resident.
///
/// `forward` runs a collective, so every worker must call it the same number of times,
/// in the same order.
pub struct ParallelEmbeddingBag<T: TensorElem, B: CollectiveBackend> {
    inner: FreqAwareEmbeddingBag<T>,
    backend: B,
    topology: ProcessTopology,
    shard: ColumnShard,
    embedding_dim: usize,
    layout: OutputLayout,
}

impl<T: TensorElem, B: CollectiveBackend> ParallelEmbeddingBag<T, B> {
    /// Randomly initializes this worker's shard.
    ///
    /// The initialization does not depend on the world size: the shards of any group
    /// size concatenate to the same table for the same seed.
    pub fn new(config: EmbeddingBagConfig, backend: B) -> Result<Self> {
        let topology = backend.topology()?;
        let shard = partition(config.embedding_dim, topology.rank, topology.world_size)?;
        let weight = init_shard(config.num_embeddings, shard, config.seed)?;
        Self::build(weight, &config, false, backend, topology, shard)
    }

    /// Shards a full `[num_rows, embedding_dim]` table.
    ///
    /// `num_embeddings` and `embedding_dim` are taken from the table; the rest of `config`
    /// applies as given. With `freeze` the layer is not trainable and
    /// [`cached_weight_mut`](Self::cached_weight_mut) fails.
    pub fn from_pretrained(
        table: &Tensor<T, 2, Cpu>,
        freeze: bool,
        mut config: EmbeddingBagConfig,
        backend: B,
    ) -> Result<Self> {
        let [num_rows, embedding_dim] = *table.shape();
        config.num_embeddings = num_rows;
        config.embedding_dim = embedding_dim;

        let topology = backend.topology()?;
        let shard = partition(embedding_dim, topology.rank, topology.world_size)?;
        let weight = table.narrow_cols(shard.start, shard.width())?;
        Self::build(weight, &config, freeze, backend, topology, shard)
    }

    fn build(
        weight: Tensor<T, 2, Cpu>,
        config: &EmbeddingBagConfig,
        freeze: bool,
        backend: B,
        topology: ProcessTopology,
        shard: ColumnShard,
    ) -> Result<Self> {
        let inner = FreqAwareEmbeddingBag::from_weight(weight, config, freeze)?;
        debug!(
            rank = topology.rank,
            world_size = topology.world_size,
            start = shard.start,
            end = shard.end,
            capacity = inner.cache().capacity(),
            "built parallel embedding bag shard"
        );
        Ok(Self {
            inner,
            backend,
            topology,
            shard,
            embedding_dim: config.embedding_dim,
            layout: OutputLayout::default(),
        })
    }

    pub fn with_output_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Looks up `batch` on this worker's shard and reassembles the full-width output.
    pub fn forward(&mut self, batch: BagBatch<'_, T>) -> Result<Tensor<T, 2, Cpu>> {
        self.forward_with_hook(batch, Ok)
    }

    /// Like [`forward`](Self::forward), with `hook` applied once to the partial
    /// `[num_bags, shard_width]` output before it is exchanged.
    ///
    /// The hook must keep the element count; otherwise a shape error is returned before
    /// any communication.
    pub fn forward_with_hook<F>(
        &mut self,
        batch: BagBatch<'_, T>,
        hook: F,
    ) -> Result<Tensor<T, 2, Cpu>>
    where
        F: FnOnce(Tensor<T, 2, Cpu>) -> Result<Tensor<T, 2, Cpu>>,
    {
        let partial = self.inner.forward(batch)?;

        trace!(phase = ?ForwardPhase::Reshaping, rank = self.backend.rank());
        let before = *partial.shape();
        let adjusted = hook(partial)?;
        if adjusted.size() != before.iter().product::<usize>() {
            return Err(TensorError::ShapeMismatch {
                expected: before.to_vec(),
                got: adjusted.shape().to_vec(),
            }
            .into());
        }

        let out = dual_all_to_all(&self.backend, &adjusted, self.layout)?;
        trace!(phase = ?ForwardPhase::Done, rank = self.backend.rank(), shape = ?out.shape());
        Ok(out)
    }

    /// Routes the gradient of a forward output back to this worker's
    /// `[num_bags, shard_width]` partial layout.
    ///
    /// Collective when the layout is [`OutputLayout::BatchChunk`].
    pub fn shard_grad(&self, grad: &Tensor<T, 2, Cpu>) -> Result<Tensor<T, 2, Cpu>> {
        scatter_grad(&self.backend, grad, self.layout, self.shard)
    }

    pub fn flush_all(&mut self) -> Result<()> {
        self.inner.flush_all()
    }

    /// This worker's `[num_embeddings, shard_width]` table, flushed.
    pub fn export_shard(&mut self) -> Result<Tensor<T, 2, Cpu>> {
        self.inner.export_weight()
    }

    /// The whole `[num_embeddings, embedding_dim]` table, gathered from every worker.
    ///
    /// Collective: every worker must call it.
    pub fn export_full(&mut self) -> Result<Tensor<T, 2, Cpu>> {
        let shard = self.export_shard()?;
        let shards = self.backend.all_gather(&shard)?;
        Ok(Tensor::cat_cols(&shards)?)
    }

    pub fn cached_weight_mut(&mut self) -> Result<&mut Tensor<T, 2, Cpu>> {
        self.inner.cached_weight_mut()
    }

    pub fn shard(&self) -> ColumnShard {
        self.shard
    }

    pub fn topology(&self) -> ProcessTopology {
        self.topology
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn output_layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn cache(&self) -> &RowCacheManager<T> {
        self.inner.cache()
    }

    pub fn stats(&self) -> &CacheStats {
        self.inner.stats()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<T: TensorElem, B: CollectiveBackend> fmt::Debug for ParallelEmbeddingBag<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelEmbeddingBag")
            .field("topology", &self.topology)
            .field("shard", &self.shard)
            .field("embedding_dim", &self.embedding_dim)
            .field("layout", &self.layout)
            .field("inner", &self.inner)
            .finish()
    }
}

impl<T: TensorElem, B: CollectiveBackend> Module<T> for ParallelEmbeddingBag<T, B> {
    fn num_parameters(&self) -> usize {
        self.inner.num_parameters()
    }

    fn is_trainable(&self) -> bool {
        self.inner.is_trainable()
    }
}
