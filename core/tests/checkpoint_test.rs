use shardcache::cache::{CacheConfig, RowState};
use shardcache::checkpoint::{load_table, save_checkpoint};
use shardcache::nn::{BagBatch, EmbeddingBagConfig, ParallelEmbeddingBag, PoolingMode};
use std::collections::HashMap;

mod common;
use common::{ramp_table, run_ranks};

#[test]
fn test_export_save_reload_under_another_world_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.safetensors");
    let original = ramp_table(40, 6);
    let config = EmbeddingBagConfig::new(0, 0)
        .with_mode(PoolingMode::Sum)
        .with_cache(CacheConfig::new(8));

    // Train-like update on two ranks: bump row 5 in every shard, then export.
    let exported = run_ranks(2, |backend| {
        let mut bag =
            ParallelEmbeddingBag::from_pretrained(&original, false, config.clone(), backend)
                .unwrap();
        bag.forward(BagBatch::new(&[5, 6, 7])).unwrap();
        let Some(RowState::Resident(slot)) = bag.cache().row_state(5) else {
            panic!("row 5 should be resident after the lookup");
        };
        for v in bag.cached_weight_mut().unwrap().row_mut(slot).unwrap() {
            *v += 100.0;
        }
        bag.export_full().unwrap()
    });
    assert_eq!(exported[0].data(), exported[1].data());

    let mut tables = HashMap::new();
    tables.insert("embedding".to_string(), exported[0].clone());
    save_checkpoint(&path, &tables).unwrap();

    let reloaded = load_table(&path, "embedding").unwrap();
    assert_eq!(reloaded.shape(), &[40, 6]);
    for (col, v) in reloaded.row(5).unwrap().iter().enumerate() {
        assert_eq!(*v, original.row(5).unwrap()[col] + 100.0);
    }
    assert_eq!(reloaded.row(4).unwrap(), original.row(4).unwrap());

    let outputs = run_ranks(3, |backend| {
        let mut bag =
            ParallelEmbeddingBag::from_pretrained(&reloaded, true, config.clone(), backend)
                .unwrap();
        bag.forward(BagBatch::new(&[5, 4]).with_offsets(&[0])).unwrap()
    });
    let expected: Vec<f32> = (0..6)
        .map(|c| reloaded.row(5).unwrap()[c] + reloaded.row(4).unwrap()[c])
        .collect();
    for out in outputs {
        assert_eq!(out.data(), expected.as_slice());
    }
}
