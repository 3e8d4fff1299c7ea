use criterion::{Criterion, criterion_group, criterion_main};
use shardcache_kernels::{PoolingMode, cpu_embedding_bag, cpu_gather_rows};
use std::hint::black_box;

fn benchmark_embedding_bag(c: &mut Criterion) {
    let mut group = c.benchmark_group("embedding_bag");
    let rows = 4096;
    let width = 64;
    let weight = vec![1.0f32; rows * width];

    for &bag_size in &[1usize, 8, 32] {
        let num_bags = 256;
        let indices: Vec<usize> = (0..num_bags * bag_size).map(|i| (i * 31) % rows).collect();
        let bounds: Vec<usize> = (0..=num_bags).map(|b| b * bag_size).collect();

        group.bench_function(format!("mean_bag{}", bag_size), |b| {
            b.iter(|| {
                cpu_embedding_bag(
                    black_box(&weight),
                    width,
                    black_box(&indices),
                    black_box(&bounds),
                    PoolingMode::Mean,
                    None,
                    None,
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn benchmark_gather_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("gather_rows");
    let rows = 65536;
    let width = 32;
    let src = vec![1.0f32; rows * width];

    for &count in &[128usize, 1024, 8192] {
        let selected: Vec<usize> = (0..count).map(|i| (i * 7919) % rows).collect();
        group.bench_function(format!("{}_rows", count), |b| {
            b.iter(|| cpu_gather_rows(black_box(&src), width, black_box(&selected)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_embedding_bag, benchmark_gather_rows);
criterion_main!(benches);
