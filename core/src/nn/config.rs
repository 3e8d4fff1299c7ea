use crate::cache::CacheConfig;
use crate::error::{Error, Result};
use shardcache_kernels::PoolingMode;

/// Construction options of an embedding bag layer.
///
/// ```rust
/// use shardcache::cache::CacheConfig;
/// use shardcache::nn::{EmbeddingBagConfig, PoolingMode};
///
/// let config = EmbeddingBagConfig::new(1_000, 8)
///     .with_mode(PoolingMode::Sum)
///     .with_padding_idx(0)
///     .with_cache(CacheConfig::new(100));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBagConfig {
    pub num_embeddings: usize,
    /// Full embedding width, before column sharding.
    pub embedding_dim: usize,
    /// Lookups of this row are skipped by pooling.
    pub padding_idx: Option<usize>,
    pub mode: PoolingMode,
    /// `offsets` carries a final entry equal to the number of indices.
    pub include_last_offset: bool,
    /// Per-row access counts used to warm up the cache and seed eviction priority.
    pub frequency_ranking: Option<Vec<u64>>,
    /// Seed of the random initialization.
    pub seed: u64,
    pub cache: CacheConfig,
}

impl EmbeddingBagConfig {
    pub fn new(num_embeddings: usize, embedding_dim: usize) -> Self {
        Self {
            num_embeddings,
            embedding_dim,
            padding_idx: None,
            mode: PoolingMode::default(),
            include_last_offset: false,
            frequency_ranking: None,
            seed: 0,
            cache: CacheConfig::default(),
        }
    }

    pub fn with_padding_idx(mut self, padding_idx: usize) -> Self {
        self.padding_idx = Some(padding_idx);
        self
    }

    pub fn with_mode(mut self, mode: PoolingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_include_last_offset(mut self, include_last_offset: bool) -> Self {
        self.include_last_offset = include_last_offset;
        self
    }

    pub fn with_frequency_ranking(mut self, ranking: Vec<u64>) -> Self {
        self.frequency_ranking = Some(ranking);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        if let Some(padding_idx) = self.padding_idx {
            if padding_idx >= self.num_embeddings {
                return Err(Error::InvalidConfig(format!(
                    "padding_idx {} out of range for {} embeddings",
                    padding_idx, self.num_embeddings
                )));
            }
        }
        if let Some(ranking) = &self.frequency_ranking {
            if ranking.len() != self.num_embeddings {
                return Err(Error::InvalidConfig(format!(
                    "frequency ranking has {} entries for {} embeddings",
                    ranking.len(),
                    self.num_embeddings
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmbeddingBagConfig::new(10, 4);
        assert_eq!(config.mode, PoolingMode::Mean);
        assert_eq!(config.padding_idx, None);
        assert!(!config.include_last_offset);
        assert_eq!(config.cache, CacheConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(
            EmbeddingBagConfig::new(10, 4)
                .with_padding_idx(10)
                .validate()
                .is_err()
        );
        assert!(
            EmbeddingBagConfig::new(10, 4)
                .with_frequency_ranking(vec![1; 9])
                .validate()
                .is_err()
        );
        assert!(
            EmbeddingBagConfig::new(10, 4)
                .with_cache(CacheConfig::new(5).with_warmup_ratio(2.0))
                .validate()
                .is_err()
        );
    }
}
