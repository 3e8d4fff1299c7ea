//! Column partitioning of the embedding dimension.
//!
//! Every worker owns one contiguous slice of columns. The split must be identical on
//! every worker and for every run, otherwise two jobs with different worker counts would
//! write incompatible checkpoints.

use crate::error::{Error, Result};

/// The contiguous column range owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnShard {
    pub start: usize,
    pub end: usize,
    /// `true` when the embedding dimension divides evenly by the world size.
    pub is_balanced: bool,
}

impl ColumnShard {
    /// Number of columns in the shard.
    pub fn width(&self) -> usize {
        self.end - self.start
    }
}

/// Sizes of `parts` contiguous pieces of `len`, the first `len % parts` one larger.
///
/// This is the same convention as `tensor_split`: `split_sizes(10, 3) == [4, 3, 3]`.
/// Pieces may be empty when `len < parts`.
pub fn split_sizes(len: usize, parts: usize) -> Vec<usize> {
    if parts == 0 {
        return Vec::new();
    }
    let chunk = len / parts;
    let remainder = len % parts;
    (0..parts)
        .map(|i| if i < remainder { chunk + 1 } else { chunk })
        .collect()
}

/// Computes the column shard owned by `rank` out of `world_size` workers.
///
/// # Errors
///
/// * [`Error::Configuration`] if `embedding_dim < world_size`.
/// * [`Error::InvalidRank`] if `world_size == 0` or `rank >= world_size`.
///
/// # Examples
///
/// ```rust
/// use shardcache::distributed::partition::partition;
///
/// let widths: Vec<_> = (0..3)
///     .map(|r| partition(10, r, 3).unwrap())
///     .map(|s| (s.start, s.end))
///     .collect();
/// assert_eq!(widths, vec![(0, 4), (4, 7), (7, 10)]);
/// ```
pub fn partition(embedding_dim: usize, rank: usize, world_size: usize) -> Result<ColumnShard> {
    if world_size == 0 || rank >= world_size {
        return Err(Error::InvalidRank { rank, world_size });
    }
    if world_size == 1 {
        return Ok(ColumnShard {
            start: 0,
            end: embedding_dim,
            is_balanced: true,
        });
    }
    if embedding_dim < world_size {
        return Err(Error::Configuration {
            embedding_dim,
            world_size,
        });
    }

    let chunk = embedding_dim / world_size;
    if embedding_dim % world_size == 0 {
        return Ok(ColumnShard {
            start: rank * chunk,
            end: (rank + 1) * chunk,
            is_balanced: true,
        });
    }

    let sizes = split_sizes(embedding_dim, world_size);
    let start: usize = sizes[..rank].iter().sum();
    Ok(ColumnShard {
        start,
        end: start + sizes[rank],
        is_balanced: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_worker_owns_everything() {
        for dim in [0, 1, 7, 128] {
            let shard = partition(dim, 0, 1).unwrap();
            assert_eq!(
                shard,
                ColumnShard {
                    start: 0,
                    end: dim,
                    is_balanced: true
                }
            );
        }
    }

    #[test]
    fn test_even_split() {
        let shard = partition(16, 2, 4).unwrap();
        assert_eq!((shard.start, shard.end, shard.is_balanced), (8, 12, true));
        assert_eq!(shard.width(), 4);
    }

    #[test]
    fn test_uneven_split_front_loads_remainder() {
        let shards: Vec<_> = (0..3).map(|r| partition(10, r, 3).unwrap()).collect();
        let ranges: Vec<_> = shards.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 7), (7, 10)]);
        assert!(shards.iter().all(|s| !s.is_balanced));
    }

    #[test]
    fn test_coverage_no_gap_no_overlap() {
        for dim in 1..40 {
            for ws in 1..=dim.min(9) {
                let mut next = 0;
                for rank in 0..ws {
                    let s = partition(dim, rank, ws).unwrap();
                    assert_eq!(s.start, next, "gap or overlap at dim={dim} ws={ws}");
                    assert!(s.end > s.start);
                    next = s.end;
                }
                assert_eq!(next, dim);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(partition(37, 5, 8).unwrap(), partition(37, 5, 8).unwrap());
    }

    #[test]
    fn test_dimension_smaller_than_world() {
        let err = partition(3, 0, 4);
        assert!(matches!(
            err,
            Err(Error::Configuration {
                embedding_dim: 3,
                world_size: 4
            })
        ));
    }

    #[test]
    fn test_invalid_rank() {
        assert!(matches!(partition(8, 4, 4), Err(Error::InvalidRank { .. })));
        assert!(matches!(partition(8, 0, 0), Err(Error::InvalidRank { .. })));
    }

    #[test]
    fn test_split_sizes() {
        assert_eq!(split_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(split_sizes(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_sizes(8, 4), vec![2, 2, 2, 2]);
        assert!(split_sizes(5, 0).is_empty());
    }
}
