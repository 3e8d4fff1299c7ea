//! Hit/miss accounting and the transfer cost model.
//!
//! Host↔device copies are plain memory copies in this crate. The cost model attaches the
//! time a real interconnect would have spent on them, so different batch sizes and cache
//! capacities can be compared by the transfer time they would cost.

use crate::error::{Error, Result};

/// Latency/bandwidth model of one host↔device transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferCostModel {
    /// Fixed cost of starting a transfer, in microseconds.
    pub latency_us: f64,
    /// Sustained bandwidth, in bytes per microsecond.
    pub bandwidth_bytes_per_us: f64,
}

impl Default for TransferCostModel {
    /// Roughly a PCIe 3.0 x16 link.
    fn default() -> Self {
        Self {
            latency_us: 10.0,
            bandwidth_bytes_per_us: 12_000.0,
        }
    }
}

impl TransferCostModel {
    /// Modelled duration of moving `bytes` in one transfer.
    pub fn cost_us(&self, bytes: usize) -> f64 {
        self.latency_us + bytes as f64 / self.bandwidth_bytes_per_us
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.latency_us < 0.0 || self.bandwidth_bytes_per_us <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "transfer cost model needs latency >= 0 and bandwidth > 0, got {:?}",
                self
            )));
        }
        Ok(())
    }
}

/// Direction of a batched row transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

/// Counters kept by a row cache since construction or the last reset.
///
/// Hits and misses count distinct rows per lookup, not individual occurrences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Rows copied back to the host store, on eviction or flush.
    pub write_back_rows: u64,
    pub host_to_device_rows: u64,
    pub device_to_host_rows: u64,
    /// Number of batched transfers issued.
    pub transfers: u64,
    /// Modelled time spent in transfers, in microseconds.
    pub transfer_time_us: f64,
}

impl CacheStats {
    /// Fraction of looked-up rows that were already resident; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub(crate) fn record_transfer(
        &mut self,
        direction: TransferDirection,
        rows: usize,
        bytes: usize,
        model: &TransferCostModel,
    ) {
        if rows == 0 {
            return;
        }
        match direction {
            TransferDirection::HostToDevice => self.host_to_device_rows += rows as u64,
            TransferDirection::DeviceToHost => self.device_to_host_rows += rows as u64,
        }
        self.transfers += 1;
        self.transfer_time_us += model.cost_us(bytes);
    }
}
