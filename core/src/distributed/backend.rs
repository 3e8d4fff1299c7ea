use super::topology::ProcessTopology;
use crate::error::Result;
use crate::tensor::{Cpu, Tensor, TensorElem};

/// Abstraction for a distributed communication backend.
///
/// Collectives are blocking and must be entered by every rank in the same order with the
/// same number of chunks; a rank that skips one leaves its peers waiting forever.
pub trait CollectiveBackend: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of processes/threads.
    fn world_size(&self) -> usize;

    /// Returns rank and world size as one value.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRank`](crate::error::Error::InvalidRank) if the backend reports a
    /// rank outside its own group.
    fn topology(&self) -> Result<ProcessTopology> {
        ProcessTopology::new(self.rank(), self.world_size())
    }

    /// Sends `chunks[j]` to rank `j` and returns the chunk received from every rank,
    /// indexed by source rank.
    ///
    /// `chunks.len()` must equal `world_size()`. The chunk addressed to this rank is
    /// returned unchanged at position `rank()`.
    fn all_to_all<T: TensorElem>(
        &self,
        chunks: Vec<Tensor<T, 2, Cpu>>,
    ) -> Result<Vec<Tensor<T, 2, Cpu>>>;

    /// Collects one tensor from every rank, indexed by source rank.
    fn all_gather<T: TensorElem>(
        &self,
        tensor: &Tensor<T, 2, Cpu>,
    ) -> Result<Vec<Tensor<T, 2, Cpu>>> {
        self.all_to_all(vec![tensor.clone(); self.world_size()])
    }
}
