use shardcache::Error;
use shardcache::distributed::partition;

#[test]
fn test_partition_covers_dimension_without_overlap() {
    for embedding_dim in 1..=64 {
        for world_size in 1..=embedding_dim.min(16) {
            let mut covered = vec![0u32; embedding_dim];
            for rank in 0..world_size {
                let shard = partition(embedding_dim, rank, world_size).unwrap();
                for col in shard.start..shard.end {
                    covered[col] += 1;
                }
            }
            assert!(
                covered.iter().all(|&c| c == 1),
                "dim={embedding_dim} ws={world_size}: {covered:?}"
            );
        }
    }
}

#[test]
fn test_partition_example_ten_over_three() {
    let shards: Vec<_> = (0..3).map(|r| partition(10, r, 3).unwrap()).collect();
    let widths: Vec<_> = shards.iter().map(|s| s.width()).collect();
    assert_eq!(widths, vec![4, 3, 3]);
    assert_eq!((shards[1].start, shards[1].end), (4, 7));
    assert!(!shards[0].is_balanced);
}

#[test]
fn test_partition_is_deterministic() {
    for _ in 0..3 {
        assert_eq!(partition(37, 2, 5).unwrap(), partition(37, 2, 5).unwrap());
    }
    let single = partition(123, 0, 1).unwrap();
    assert_eq!((single.start, single.end, single.is_balanced), (0, 123, true));
}

#[test]
fn test_partition_rejects_narrow_tables() {
    let err = partition(2, 0, 3).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(
        err,
        Error::Configuration {
            embedding_dim: 2,
            world_size: 3
        }
    ));
    assert!(msg.contains('2') && msg.contains('3'));
}
