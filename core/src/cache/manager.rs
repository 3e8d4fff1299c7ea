//! The row cache manager: residency, eviction and batched swaps.

use super::config::CacheConfig;
use super::rounds;
use super::row_table::{FrequencyRecord, RowState, RowTable};
use super::stats::{CacheStats, TransferDirection};
use crate::error::{Error, Result};
use crate::tensor::{Cpu, Tensor, TensorElem, TensorError};
use shardcache_kernels::{cpu_gather_rows, cpu_scatter_rows};
use std::cmp::Reverse;
use std::ops::Range;
use tracing::{debug, info, trace};

/// The outcome of [`RowCacheManager::resolve`].
///
/// `unique_rows` is the sorted set of distinct ids of the batch and `unique_slots[k]` the
/// slot now holding `unique_rows[k]`. `inverse` maps every input position back into that
/// set, so `slots[i] == unique_slots[inverse[i]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIds {
    /// Cache slot of every input id, in input order.
    pub slots: Vec<usize>,
    pub unique_rows: Vec<usize>,
    pub unique_slots: Vec<usize>,
    pub inverse: Vec<usize>,
}

/// Keeps the most useful rows of one column shard in a fixed-size device buffer.
///
/// The manager owns two matrices:
///
/// * the host store, `[num_rows, width]`, authoritative for every row that is not
///   resident;
/// * the device buffer, `[capacity, width]`, authoritative for every resident row.
///
/// A row is never authoritative in both places. Evicting a row writes its slot back to
/// the host first, so updates made through [`cached_weight_mut`](Self::cached_weight_mut)
/// survive any number of evictions.
///
/// # Examples
///
/// ```rust
/// use shardcache::cache::{CacheConfig, RowCacheManager, RowState};
/// use shardcache::tensor::Tensor;
///
/// let host = Tensor::<f32, 2>::zeros([10, 4]);
/// let mut cache = RowCacheManager::new(host, CacheConfig::new(2), None).unwrap();
///
/// let resolved = cache.resolve(&[7, 3, 7]).unwrap();
/// assert_eq!(resolved.unique_rows, vec![3, 7]);
/// assert_eq!(cache.row_state(7), Some(RowState::Resident(resolved.slots[0])));
/// ```
#[derive(Debug)]
pub struct RowCacheManager<T: TensorElem> {
    host: Tensor<T, 2, Cpu>,
    cache: Tensor<T, 2, Cpu>,
    rows: RowTable,
    slot_owner: Vec<Option<usize>>,
    // Popped from the back, so the lowest free slot is handed out first.
    free_slots: Vec<usize>,
    clock: u64,
    config: CacheConfig,
    stats: CacheStats,
}

impl<T: TensorElem> RowCacheManager<T> {
    /// Binds `host_weight` as the backing store and allocates the device buffer.
    ///
    /// A capacity larger than the table is clamped to the number of rows. With a
    /// `frequency_ranking` (one count per row) the highest-ranked
    /// [`CacheConfig::warmup_rows`] rows are admitted immediately, ties going to the lower
    /// row id; without one the cache starts empty.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the config does not validate or the ranking length
    /// differs from the number of rows.
    pub fn new(
        host_weight: Tensor<T, 2, Cpu>,
        mut config: CacheConfig,
        frequency_ranking: Option<&[u64]>,
    ) -> Result<Self> {
        config.validate()?;
        let [num_rows, width] = *host_weight.shape();

        if let Some(ranking) = frequency_ranking {
            if ranking.len() != num_rows {
                return Err(Error::InvalidConfig(format!(
                    "frequency ranking has {} entries for {} rows",
                    ranking.len(),
                    num_rows
                )));
            }
        }
        if config.capacity > num_rows {
            debug!(
                requested = config.capacity,
                num_rows, "cache capacity clamped to table size"
            );
            config.capacity = num_rows;
        }
        let capacity = config.capacity;

        let mut manager = Self {
            host: host_weight,
            cache: Tensor::zeros([capacity, width]),
            rows: RowTable::new(num_rows, frequency_ranking),
            slot_owner: vec![None; capacity],
            free_slots: (0..capacity).rev().collect(),
            clock: 0,
            config,
            stats: CacheStats::default(),
        };

        if let Some(ranking) = frequency_ranking {
            let warm = manager.config.warmup_rows(num_rows);
            let mut order: Vec<usize> = (0..num_rows).collect();
            order.sort_unstable_by_key(|&row| (Reverse(ranking[row]), row));
            order.truncate(warm);

            for batch in order.chunks(manager.config.transfer_batch_size) {
                manager.admit(batch, 0)?;
            }
            info!(
                rows = warm,
                capacity,
                num_rows,
                transfers = manager.stats.transfers,
                "row cache warmed up"
            );
        }

        Ok(manager)
    }

    /// Makes every id of `ids` resident and returns where each one lives.
    ///
    /// Misses go to free slots first, then replace the resident rows with the lowest
    /// frequency (ties: oldest last access, then lowest row id). Rows referenced by this
    /// call are never evicted by it. Misses are moved in sub-batches of at most
    /// `transfer_batch_size` rows; all of them complete before this returns.
    ///
    /// Each occurrence of an id bumps its frequency once. Hits and misses are counted per
    /// distinct id.
    ///
    /// # Errors
    ///
    /// * [`Error::Capacity`] if the batch has more distinct ids than the cache has slots,
    ///   which includes any non-empty batch on a zero-capacity cache.
    /// * [`Error::Tensor`] if an id is not a row of the table.
    pub fn resolve(&mut self, ids: &[usize]) -> Result<ResolvedIds> {
        if ids.is_empty() {
            return Ok(ResolvedIds::default());
        }
        let num_rows = self.num_rows();
        if let Some(&bad) = ids.iter().find(|&&id| id >= num_rows) {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![bad],
                shape: vec![num_rows, self.width()],
            }
            .into());
        }

        let mut unique_rows = ids.to_vec();
        unique_rows.sort_unstable();
        unique_rows.dedup();

        let capacity = self.capacity();
        if unique_rows.len() > capacity {
            return Err(Error::Capacity {
                capacity,
                requested: unique_rows.len(),
            });
        }

        self.clock += 1;
        let tick = self.clock;
        for &id in ids {
            self.rows.touch(id, tick);
        }

        let mut unique_slots = vec![0; unique_rows.len()];
        let mut misses = Vec::new();
        for (k, &row) in unique_rows.iter().enumerate() {
            match self.rows.slot(row) {
                Some(slot) => unique_slots[k] = slot,
                None => misses.push(k),
            }
        }
        self.stats.hits += (unique_rows.len() - misses.len()) as u64;
        self.stats.misses += misses.len() as u64;

        for batch in misses.chunks(self.config.transfer_batch_size) {
            let rows: Vec<usize> = batch.iter().map(|&k| unique_rows[k]).collect();
            let slots = self.admit(&rows, tick)?;
            for (&k, slot) in batch.iter().zip(slots) {
                unique_slots[k] = slot;
            }
        }

        let inverse: Vec<usize> = ids
            .iter()
            .map(|id| unique_rows.partition_point(|row| row < id))
            .collect();
        let slots = inverse.iter().map(|&k| unique_slots[k]).collect();

        trace!(
            tick,
            ids = ids.len(),
            unique = unique_rows.len(),
            misses = misses.len(),
            "resolved batch"
        );
        Ok(ResolvedIds {
            slots,
            unique_rows,
            unique_slots,
            inverse,
        })
    }

    /// Loads `rows` (none of them resident) into the cache as one batched transfer and
    /// returns their slots in the same order.
    fn admit(&mut self, rows: &[usize], tick: u64) -> Result<Vec<usize>> {
        let width = self.width();
        let reuse = rows.len().min(self.free_slots.len());
        let mut slots: Vec<usize> = (0..reuse).filter_map(|_| self.free_slots.pop()).collect();

        let needed = rows.len() - slots.len();
        if needed > 0 {
            let victims = self.select_victims(needed, tick)?;
            let victim_slots: Vec<usize> = victims.iter().map(|&(slot, _)| slot).collect();
            let victim_rows: Vec<usize> = victims.iter().map(|&(_, row)| row).collect();

            let packed = cpu_gather_rows(self.cache.data(), width, &victim_slots)?;
            cpu_scatter_rows(self.host.data_mut(), width, &victim_rows, &packed)?;
            self.stats.record_transfer(
                TransferDirection::DeviceToHost,
                victims.len(),
                packed.len() * std::mem::size_of::<T>(),
                &self.config.cost_model,
            );
            self.stats.evictions += victims.len() as u64;
            self.stats.write_back_rows += victims.len() as u64;

            for &(slot, row) in &victims {
                self.rows.unbind(row);
                self.slot_owner[slot] = None;
            }
            slots.extend(victim_slots);
        }

        let packed = cpu_gather_rows(self.host.data(), width, rows)?;
        cpu_scatter_rows(self.cache.data_mut(), width, &slots, &packed)?;
        self.stats.record_transfer(
            TransferDirection::HostToDevice,
            rows.len(),
            packed.len() * std::mem::size_of::<T>(),
            &self.config.cost_model,
        );

        for (&row, &slot) in rows.iter().zip(&slots) {
            self.rows.bind(row, slot);
            self.slot_owner[slot] = Some(row);
        }

        debug!(
            admitted = rows.len(),
            evicted = needed,
            resident = self.num_resident(),
            "swapped rows into cache"
        );
        Ok(slots)
    }

    /// Picks `count` resident rows not touched at `tick`, as `(slot, row)` sorted by slot.
    fn select_victims(&self, count: usize, tick: u64) -> Result<Vec<(usize, usize)>> {
        let mut candidates: Vec<(u64, u64, usize)> = self
            .slot_owner
            .iter()
            .flatten()
            .filter(|&&row| {
                self.rows
                    .frequency(row)
                    .is_some_and(|f| f.last_access != tick)
            })
            .map(|&row| self.rows.eviction_key(row))
            .collect();

        if candidates.len() < count {
            return Err(Error::Capacity {
                capacity: self.capacity(),
                requested: self.num_resident() - candidates.len() + count,
            });
        }
        if count < candidates.len() {
            candidates.select_nth_unstable(count);
            candidates.truncate(count);
        }

        let mut victims: Vec<(usize, usize)> = candidates
            .into_iter()
            .filter_map(|(_, _, row)| self.rows.slot(row).map(|slot| (slot, row)))
            .collect();
        victims.sort_unstable();
        Ok(victims)
    }

    /// Writes every resident row back to the host store.
    ///
    /// Rows stay resident. Call this before reading the host store as the source of truth,
    /// e.g. before a checkpoint.
    pub fn flush_all(&mut self) -> Result<()> {
        let width = self.width();
        let resident: Vec<(usize, usize)> = self
            .slot_owner
            .iter()
            .enumerate()
            .filter_map(|(slot, owner)| owner.map(|row| (slot, row)))
            .collect();

        for batch in resident.chunks(self.config.transfer_batch_size) {
            let slots: Vec<usize> = batch.iter().map(|&(slot, _)| slot).collect();
            let rows: Vec<usize> = batch.iter().map(|&(_, row)| row).collect();
            let packed = cpu_gather_rows(self.cache.data(), width, &slots)?;
            cpu_scatter_rows(self.host.data_mut(), width, &rows, &packed)?;
            self.stats.record_transfer(
                TransferDirection::DeviceToHost,
                batch.len(),
                packed.len() * std::mem::size_of::<T>(),
                &self.config.cost_model,
            );
            self.stats.write_back_rows += batch.len() as u64;
        }

        debug!(rows = resident.len(), "flushed row cache");
        Ok(())
    }

    /// Splits a batch of bags into rounds that each fit in this cache.
    ///
    /// See [`plan_rounds`](super::plan_rounds).
    pub fn plan_rounds(
        &self,
        ids: &[usize],
        bounds: &[usize],
        padding_idx: Option<usize>,
    ) -> Result<Vec<Range<usize>>> {
        rounds::plan_rounds(ids, bounds, self.capacity(), padding_idx)
    }

    /// The authoritative value of `row`, wherever it currently lives.
    pub fn read_row(&self, row: usize) -> Result<&[T]> {
        match self.rows.state(row) {
            Some(RowState::Resident(slot)) => Ok(self.cache.row(slot)?),
            _ => Ok(self.host.row(row)?),
        }
    }

    /// `None` if `row` is not a row of the table.
    pub fn row_state(&self, row: usize) -> Option<RowState> {
        self.rows.state(row)
    }

    pub fn frequency(&self, row: usize) -> Option<FrequencyRecord> {
        self.rows.frequency(row)
    }

    /// Resident row ids, in ascending order.
    pub fn resident_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.slot_owner.iter().flatten().copied().collect();
        rows.sort_unstable();
        rows
    }

    pub fn num_resident(&self) -> usize {
        self.slot_owner.len() - self.free_slots.len()
    }

    /// The row held by `slot`, if any.
    pub fn slot_owner(&self, slot: usize) -> Option<usize> {
        self.slot_owner.get(slot).copied().flatten()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.host.shape()[0]
    }

    /// Columns per row (the width of this worker's shard).
    pub fn width(&self) -> usize {
        self.host.shape()[1]
    }

    /// The device buffer, `[capacity, width]`; slot `s` is row `s`.
    pub fn cached_weight(&self) -> &Tensor<T, 2, Cpu> {
        &self.cache
    }

    /// Mutable access to the device buffer, the write path for training updates.
    pub fn cached_weight_mut(&mut self) -> &mut Tensor<T, 2, Cpu> {
        &mut self.cache
    }

    /// The host store. Stale for resident rows until [`flush_all`](Self::flush_all).
    pub fn host_weight(&self) -> &Tensor<T, 2, Cpu> {
        &self.host
    }

    /// Flushes, then returns a copy of the full `[num_rows, width]` table.
    pub fn export_weight(&mut self) -> Result<Tensor<T, 2, Cpu>> {
        self.flush_all()?;
        Ok(self.host.clone())
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
