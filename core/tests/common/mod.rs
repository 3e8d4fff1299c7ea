use shardcache::distributed::CpuBackend;
use shardcache::tensor::Tensor;
use std::thread;

/// Runs `f` once per rank of a fresh in-process mesh, one thread each, and returns the
/// results in rank order.
#[allow(dead_code)]
pub fn run_ranks<R, F>(world_size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(CpuBackend) -> R + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = CpuBackend::mesh(world_size)
            .into_iter()
            .map(|backend| {
                let f = &f;
                s.spawn(move || f(backend))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// A `[rows, width]` table whose values are all distinct.
#[allow(dead_code)]
pub fn ramp_table(rows: usize, width: usize) -> Tensor<f32, 2> {
    let data = (0..rows * width).map(|v| v as f32 * 0.5 - 3.0).collect();
    Tensor::new(data, [rows, width]).unwrap()
}
