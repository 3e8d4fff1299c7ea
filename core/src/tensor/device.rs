//! Device abstraction for Tensor storage.
//!
//! The row cache distinguishes two memories: the large, slow **host** store that holds
//! every row, and the small, fast **device** buffer that holds the resident rows. This
//! crate runs both on the CPU, but tensors stay generic over `Device` so an accelerator
//! buffer can replace the device side without changing the cache bookkeeping.

use crate::tensor::{Storage, TensorElem};
use std::fmt::Debug;

/// A trait representing the underlying storage device for a Tensor.
///
/// The `Storage` associated type lets each device define its own memory container
/// (e.g., `Vec<T>` for CPU).
pub trait Device: Clone + Debug + PartialEq + Send + Sync {
    /// The type of storage used by this device.
    type Storage<T>: Storage<T>
    where
        T: TensorElem;

    /// Returns the name of the device.
    ///
    /// ```rust
    /// use shardcache::tensor::{Cpu, Device};
    /// assert_eq!(Cpu.name(), "CPU");
    /// ```
    fn name(&self) -> &'static str;
}

/// A CPU Device.
///
/// Data is stored in system RAM using `Vec<T>`. This is the default device for all tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct Cpu;

impl Device for Cpu {
    type Storage<T>
        = Vec<T>
    where
        T: TensorElem;

    fn name(&self) -> &'static str {
        "CPU"
    }
}
