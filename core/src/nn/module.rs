use crate::tensor::TensorElem;
use std::fmt::Debug;

/// Common interface of the embedding layers.
///
/// Layers are `Send + Sync` so a worker thread can own one, and `Debug` so their
/// configuration can be logged.
pub trait Module<T: TensorElem>: Debug + Send + Sync {
    /// Number of values this worker stores for the layer.
    fn num_parameters(&self) -> usize;

    /// `false` once the weights are frozen.
    fn is_trainable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct MockModule;

    impl Module<f32> for MockModule {
        fn num_parameters(&self) -> usize {
            3
        }
    }

    #[test]
    fn test_module_implementation() {
        let module = MockModule;
        assert_eq!(module.num_parameters(), 3);
        assert!(module.is_trainable());
    }
}
