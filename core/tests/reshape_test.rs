use shardcache::distributed::all_to_all::scatter_grad;
use shardcache::distributed::partition::split_sizes;
use shardcache::distributed::{CollectiveBackend, OutputLayout, dual_all_to_all, partition};
use shardcache::nn::{
    BagBatch, EmbeddingBagConfig, FreqAwareEmbeddingBag, ParallelEmbeddingBag, PoolingMode,
};
use shardcache::tensor::Tensor;

mod common;
use common::{ramp_table, run_ranks};

const INDICES: [usize; 20] = [3, 7, 7, 1, 0, 12, 5, 9, 2, 2, 14, 8, 6, 11, 4, 10, 13, 1, 3, 0];
const OFFSETS: [usize; 8] = [0, 3, 4, 6, 9, 12, 15, 17];

#[test]
fn test_dual_all_to_all_matches_column_concat() {
    let world_size = 4;
    let table = ramp_table(16, 16);

    let results = run_ranks(world_size, |backend| {
        let shard = partition(16, backend.rank(), world_size).unwrap();
        let config = EmbeddingBagConfig::new(16, 16).with_mode(PoolingMode::Sum);
        let weight = table.narrow_cols(shard.start, shard.width()).unwrap();
        let mut bag = FreqAwareEmbeddingBag::from_weight(weight, &config, false).unwrap();

        let partial = bag
            .forward(BagBatch::new(&INDICES).with_offsets(&OFFSETS))
            .unwrap();
        assert_eq!(partial.shape(), &[8, 4]);
        let full = dual_all_to_all(&backend, &partial, OutputLayout::Full).unwrap();
        (partial, full)
    });

    let partials: Vec<_> = results.iter().map(|(p, _)| p.clone()).collect();
    let expected = Tensor::cat_cols(&partials).unwrap();
    for (rank, (_, full)) in results.iter().enumerate() {
        assert_eq!(full.shape(), &[8, 16], "rank {rank}");
        assert_eq!(full.data(), expected.data(), "rank {rank}");
    }
}

#[test]
fn test_batch_chunk_layout_and_gradient_inverse() {
    // Uneven on both axes: widths 4/3/3, batch chunks 3/2/2.
    let world_size = 3;
    let table = ramp_table(16, 10);
    let offsets = [0, 3, 4, 6, 9, 12, 15];

    let results = run_ranks(world_size, |backend| {
        let config = EmbeddingBagConfig::new(0, 0).with_mode(PoolingMode::Max);
        let mut bag = ParallelEmbeddingBag::from_pretrained(&table, false, config, backend)
            .unwrap()
            .with_output_layout(OutputLayout::BatchChunk);

        let chunk = bag
            .forward(BagBatch::new(&INDICES[..17]).with_offsets(&offsets))
            .unwrap();
        let grad = bag.shard_grad(&chunk).unwrap();
        (bag.shard(), chunk, grad)
    });

    let full = shardcache::nn::embedding_bag(
        &table,
        &INDICES[..17],
        Some(&offsets),
        false,
        PoolingMode::Max,
        None,
        None,
    )
    .unwrap();
    let expected_chunks = full.split_rows(&split_sizes(7, world_size)).unwrap();

    for (rank, (shard, chunk, grad)) in results.iter().enumerate() {
        assert_eq!(chunk.data(), expected_chunks[rank].data(), "rank {rank}");
        // Routing the output back yields this rank's own columns for the whole batch.
        let own = full.narrow_cols(shard.start, shard.width()).unwrap();
        assert_eq!(grad.shape(), &[7, shard.width()]);
        assert_eq!(grad.data(), own.data(), "rank {rank}");
    }
}

#[test]
fn test_full_layout_gradient_keeps_own_columns() {
    let world_size = 2;
    let results = run_ranks(world_size, |backend| {
        let grad = ramp_table(5, 6);
        let shard = partition(6, backend.rank(), world_size).unwrap();
        scatter_grad(&backend, &grad, OutputLayout::Full, shard).unwrap()
    });
    assert_eq!(results[0].shape(), &[5, 3]);
    let joined = Tensor::cat_cols(&results).unwrap();
    assert_eq!(joined.data(), ramp_table(5, 6).data());
}
