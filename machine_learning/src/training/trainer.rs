use rand::RngCore;

use crate::{Result, dataset::Dataset};

/// Anything that can train a flat parameter buffer over a dataset.
pub trait Trainer {
    /// Trains `params` in place over `dataset`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `dataset` - The training data, it gets shuffled along the way.
    /// * `rng` - The source of randomness for shuffling.
    ///
    /// # Returns
    /// The loss of every epoch that was run.
    fn train(
        &mut self,
        params: &mut [f32],
        dataset: &mut Dataset,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>>;
}
