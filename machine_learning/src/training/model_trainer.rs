use std::num::NonZeroUsize;

use rand::RngCore;

use super::Trainer;
use crate::{
    Result,
    arch::{Model, loss::LossFn},
    dataset::Dataset,
    optimization::Optimizer,
};

/// A model `Trainer`. Contains the relevant components needed for training a model,
/// including the model itself.
pub struct ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    model: M,
    optimizer: O,
    loss_fn: L,

    epochs: NonZeroUsize,
    batch_size: NonZeroUsize,
    steps_per_epoch: Option<NonZeroUsize>,
}

impl<M, O, L> ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Returns a new `ModelTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer applied after every batch.
    /// * `loss_fn` - The loss function used to measure the difference between a model's output and the expected one.
    /// * `epochs` - The amount of passes over the dataset per `train` call.
    /// * `batch_size` - The amount of samples per batch.
    /// * `steps_per_epoch` - An optional cap on the amount of batches per epoch.
    pub fn new(
        model: M,
        optimizer: O,
        loss_fn: L,
        epochs: NonZeroUsize,
        batch_size: NonZeroUsize,
        steps_per_epoch: Option<NonZeroUsize>,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss_fn,
            epochs,
            batch_size,
            steps_per_epoch,
        }
    }
}

impl<M, O, L> Trainer for ModelTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Performs `epochs` epochs of training its model, using its optimizer, loss function and
    /// batch size. Stops early as soon as an epoch loss isn't finite.
    fn train(
        &mut self,
        params: &mut [f32],
        dataset: &mut Dataset,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f32>> {
        let epochs = self.epochs.get();
        let steps = self.steps_per_epoch.map_or(usize::MAX, NonZeroUsize::get);
        let mut grad = vec![0.; self.model.size()];
        let mut losses = Vec::with_capacity(epochs);

        for _ in 0..epochs {
            dataset.shuffle(rng);
            let batches = dataset.batches(self.batch_size)?.take(steps);

            let loss = self.model.backprop(
                params,
                &mut grad,
                &self.loss_fn,
                &mut self.optimizer,
                batches,
            )?;

            losses.push(loss);

            if !loss.is_finite() {
                break;
            }
        }

        Ok(losses)
    }
}
