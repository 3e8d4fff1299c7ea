//! Storage abstraction for Tensors.
//!
//! A `Tensor` holds shape metadata; its `Storage` holds the elements. Storage must expose
//! the elements as one contiguous slice so rows can be copied with a single
//! `copy_from_slice`.

use crate::tensor::TensorElem;
use std::fmt::Debug;

/// A trait for the underlying data storage.
pub trait Storage<T>: Clone + Debug + Send + Sync {
    /// Returns the data as an immutable slice.
    fn as_slice(&self) -> &[T];

    /// Returns the data as a mutable slice.
    fn as_mut_slice(&mut self) -> &mut [T];

    /// Returns the number of elements in the storage.
    fn len(&self) -> usize;

    /// Returns `true` if the storage contains no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Standard heap storage for CPU tensors.
impl<T: TensorElem> Storage<T> for Vec<T> {
    fn as_slice(&self) -> &[T] {
        self
    }
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
    fn len(&self) -> usize {
        self.len()
    }
}
