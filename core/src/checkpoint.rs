//! Saving and loading embedding tables.
//!
//! Tables are stored as 2-D little-endian `F32` tensors in the `safetensors` format, so a
//! table exported by [`ParallelEmbeddingBag::export_full`](crate::nn::ParallelEmbeddingBag::export_full)
//! can be loaded back with [`load_table`] and handed to `from_pretrained` under any world
//! size.

use crate::error::{Error, Result};
use crate::tensor::{Cpu, Tensor};
use memmap2::Mmap;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

fn to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn to_table(name: &str, view: &TensorView<'_>) -> Result<Tensor<f32, 2, Cpu>> {
    if view.dtype() != Dtype::F32 {
        return Err(Error::Checkpoint(format!(
            "tensor {} has dtype {:?}, expected F32",
            name,
            view.dtype()
        )));
    }
    let shape: [usize; 2] = view.shape().try_into().map_err(|_| {
        Error::Checkpoint(format!(
            "tensor {} has shape {:?}, expected 2 dimensions",
            name,
            view.shape()
        ))
    })?;

    let data = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Tensor::new(data, shape)?)
}

/// Writes `tables` to a safetensors file at `path`.
pub fn save_checkpoint<P: AsRef<Path>>(
    path: P,
    tables: &HashMap<String, Tensor<f32, 2, Cpu>>,
) -> Result<()> {
    let bytes: HashMap<&String, Vec<u8>> = tables
        .iter()
        .map(|(name, table)| (name, to_bytes(table.data())))
        .collect();

    let mut views = HashMap::new();
    for (name, table) in tables {
        let view = TensorView::new(Dtype::F32, table.shape().to_vec(), &bytes[name])
            .map_err(|e| Error::Checkpoint(format!("tensor {}: {}", name, e)))?;
        views.insert(name.clone(), view);
    }

    let metadata: Option<HashMap<String, String>> = None;
    safetensors::serialize_to_file(&views, metadata, path.as_ref())
        .map_err(|e| Error::Checkpoint(format!("failed to save checkpoint: {}", e)))?;

    debug!(path = %path.as_ref().display(), tables = tables.len(), "saved checkpoint");
    Ok(())
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)
        .map_err(|e| Error::Checkpoint(format!("cannot open {}: {}", path.display(), e)))?;
    // SAFETY: the file is only read, and is not expected to change while mapped.
    unsafe { Mmap::map(&file) }
        .map_err(|e| Error::Checkpoint(format!("cannot map {}: {}", path.display(), e)))
}

/// Reads every table of a safetensors file.
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<HashMap<String, Tensor<f32, 2, Cpu>>> {
    let mmap = map_file(path.as_ref())?;
    let tensors = SafeTensors::deserialize(&mmap)
        .map_err(|e| Error::Checkpoint(format!("failed to deserialize: {}", e)))?;

    tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            let table = to_table(&name, &view)?;
            Ok((name, table))
        })
        .collect()
}

/// Reads the table called `name`.
pub fn load_table<P: AsRef<Path>>(path: P, name: &str) -> Result<Tensor<f32, 2, Cpu>> {
    let mmap = map_file(path.as_ref())?;
    let tensors = SafeTensors::deserialize(&mmap)
        .map_err(|e| Error::Checkpoint(format!("failed to deserialize: {}", e)))?;
    let view = tensors
        .tensor(name)
        .map_err(|e| Error::Checkpoint(format!("missing tensor {}: {}", name, e)))?;
    to_table(name, &view)
}
