use super::stats::TransferCostModel;
use crate::error::{Error, Result};

/// Sizing and warmup policy of a row cache.
///
/// ```rust
/// use shardcache::cache::CacheConfig;
///
/// let config = CacheConfig::new(1024)
///     .with_warmup_ratio(0.5)
///     .with_transfer_batch_size(256);
/// assert_eq!(config.warmup_rows(10_000), 1024);
/// assert_eq!(config.warmup_rows(100), 50);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Number of rows the device buffer can hold.
    pub capacity: usize,
    /// Fraction of the table admitted up front when a frequency ranking is available.
    pub warmup_ratio: f64,
    /// Maximum number of rows moved by one batched transfer.
    pub transfer_batch_size: usize,
    pub cost_model: TransferCostModel,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            warmup_ratio: 0.7,
            transfer_batch_size: 50_000,
            cost_model: TransferCostModel::default(),
        }
    }
}

impl CacheConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_warmup_ratio(mut self, warmup_ratio: f64) -> Self {
        self.warmup_ratio = warmup_ratio;
        self
    }

    pub fn with_transfer_batch_size(mut self, transfer_batch_size: usize) -> Self {
        self.transfer_batch_size = transfer_batch_size;
        self
    }

    pub fn with_cost_model(mut self, cost_model: TransferCostModel) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Rows admitted during warmup for a table of `num_rows` rows:
    /// `min(capacity, floor(warmup_ratio * num_rows))`.
    pub fn warmup_rows(&self, num_rows: usize) -> usize {
        let wanted = (self.warmup_ratio * num_rows as f64).floor() as usize;
        wanted.min(self.capacity)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.warmup_ratio) {
            return Err(Error::InvalidConfig(format!(
                "warmup_ratio must be in [0, 1], got {}",
                self.warmup_ratio
            )));
        }
        if self.transfer_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "transfer_batch_size must be positive".into(),
            ));
        }
        self.cost_model.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.warmup_ratio, 0.7);
        assert_eq!(config.transfer_batch_size, 50_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_warmup_rows_is_capped_by_capacity() {
        let config = CacheConfig::new(10).with_warmup_ratio(0.5);
        assert_eq!(config.warmup_rows(100), 10);
        assert_eq!(config.warmup_rows(7), 3);
        assert_eq!(CacheConfig::new(10).with_warmup_ratio(0.0).warmup_rows(100), 0);
    }

    #[test]
    fn test_validate() {
        assert!(CacheConfig::new(1).with_warmup_ratio(1.5).validate().is_err());
        assert!(CacheConfig::new(1).with_warmup_ratio(-0.1).validate().is_err());
        assert!(CacheConfig::new(1).with_transfer_batch_size(0).validate().is_err());
    }
}
