//! Matrix slicing and concatenation.
//!
//! Everything the column-parallel layer does to a tensor is one of four moves:
//! take a column range (sharding a table), split along rows (chunking a batch), split
//! along columns, or concatenate along either axis (reassembling a result).
//!
//! ```rust
//! use shardcache::tensor::Tensor;
//!
//! let t = Tensor::<f32, 2>::new(vec![1.0, 2.0, 3.0, 4.0], [2, 2]).unwrap();
//! let left = t.narrow_cols(0, 1).unwrap();
//! assert_eq!(left.data(), &[1.0, 3.0]);
//! ```

use super::{Cpu, Result, Tensor, TensorElem, TensorError};
use rayon::prelude::*;

impl<T: TensorElem> Tensor<T, 2, Cpu> {
    /// Returns row `i` as a slice.
    pub fn row(&self, i: usize) -> Result<&[T]> {
        let [rows, cols] = self.shape;
        if i >= rows {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![i],
                shape: vec![rows, cols],
            });
        }
        Ok(&self.data[i * cols..(i + 1) * cols])
    }

    /// Returns row `i` as a mutable slice.
    pub fn row_mut(&mut self, i: usize) -> Result<&mut [T]> {
        let [rows, cols] = self.shape;
        if i >= rows {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![i],
                shape: vec![rows, cols],
            });
        }
        Ok(&mut self.data[i * cols..(i + 1) * cols])
    }

    /// Copies the columns `[start, start + len)` of every row into a new tensor.
    pub fn narrow_cols(&self, start: usize, len: usize) -> Result<Tensor<T, 2, Cpu>> {
        let [rows, cols] = self.shape;
        if start + len > cols {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![start + len],
                shape: vec![rows, cols],
            });
        }

        let mut out = Tensor::zeros([rows, len]);
        if len == 0 {
            return Ok(out);
        }
        out.data
            .par_chunks_mut(len)
            .zip(self.data.par_chunks(cols))
            .for_each(|(dst, src)| dst.copy_from_slice(&src[start..start + len]));
        Ok(out)
    }

    /// Splits the tensor into consecutive row blocks of the given sizes.
    pub fn split_rows(&self, sizes: &[usize]) -> Result<Vec<Tensor<T, 2, Cpu>>> {
        let [rows, cols] = self.shape;
        let total: usize = sizes.iter().sum();
        if total != rows {
            return Err(TensorError::ShapeMismatch {
                expected: vec![rows],
                got: vec![total],
            });
        }

        let mut parts = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &n in sizes {
            let data = self.data[start * cols..(start + n) * cols].to_vec();
            parts.push(Tensor::new(data, [n, cols])?);
            start += n;
        }
        Ok(parts)
    }

    /// Splits the tensor into consecutive column blocks of the given widths.
    pub fn split_cols(&self, sizes: &[usize]) -> Result<Vec<Tensor<T, 2, Cpu>>> {
        let cols = self.shape[1];
        let total: usize = sizes.iter().sum();
        if total != cols {
            return Err(TensorError::ShapeMismatch {
                expected: vec![cols],
                got: vec![total],
            });
        }

        let mut parts = Vec::with_capacity(sizes.len());
        let mut start = 0;
        for &n in sizes {
            parts.push(self.narrow_cols(start, n)?);
            start += n;
        }
        Ok(parts)
    }

    /// Stacks tensors with the same column count on top of each other.
    pub fn cat_rows(parts: &[Tensor<T, 2, Cpu>]) -> Result<Tensor<T, 2, Cpu>> {
        let cols = parts.first().map_or(0, |p| p.shape[1]);
        let mut rows = 0;
        for p in parts {
            if p.shape[1] != cols {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![p.shape[0], cols],
                    got: p.shape.to_vec(),
                });
            }
            rows += p.shape[0];
        }

        let mut data = Vec::with_capacity(rows * cols);
        for p in parts {
            data.extend_from_slice(&p.data);
        }
        Tensor::new(data, [rows, cols])
    }

    /// Places tensors with the same row count side by side.
    pub fn cat_cols(parts: &[Tensor<T, 2, Cpu>]) -> Result<Tensor<T, 2, Cpu>> {
        let rows = parts.first().map_or(0, |p| p.shape[0]);
        for p in parts {
            if p.shape[0] != rows {
                return Err(TensorError::ShapeMismatch {
                    expected: vec![rows, p.shape[1]],
                    got: p.shape.to_vec(),
                });
            }
        }
        let cols: usize = parts.iter().map(|p| p.shape[1]).sum();

        let mut out = Tensor::zeros([rows, cols]);
        if cols == 0 {
            return Ok(out);
        }
        out.data
            .par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, dst)| {
                let mut offset = 0;
                for p in parts {
                    let w = p.shape[1];
                    dst[offset..offset + w].copy_from_slice(&p.data[r * w..(r + 1) * w]);
                    offset += w;
                }
            });
        Ok(out)
    }
}
