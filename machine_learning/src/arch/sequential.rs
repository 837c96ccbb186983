use ndarray::{Array2, ArrayView2};

use super::{Model, layers::Layer, loss::LossFn};
use crate::{MlErr, Result, optimization::Optimizer};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    offsets: Vec<usize>,
    size: usize,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let mut offsets = Vec::with_capacity(layers.len());
        let mut size = 0;

        for layer in &layers {
            offsets.push(size);
            size += layer.size();
        }

        Self {
            layers,
            offsets,
            size,
        }
    }

    /// Returns the layers of this model.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.size
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("model parameters", params.len())?;

        let mut out = x.to_owned();

        for (layer, &offset) in self.layers.iter_mut().zip(&self.offsets) {
            let params = &params[offset..offset + layer.size()];
            out = layer.forward(params, out.view())?;
        }

        Ok(out)
    }

    // NOTE: since getting the actual loss would require forwarding over all batches again at
    // the end of the backprop iterations, we are approximating it by averaging the loss at
    // each batch. A non finite batch loss ends the pass right away, the caller decides what
    // to do with a diverged model.
    fn backprop<'a, L, O, I>(
        &mut self,
        params: &mut [f32],
        grad: &mut [f32],
        loss_fn: &L,
        optimizer: &mut O,
        batches: I,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer,
        I: Iterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
    {
        self.check_len("gradient", grad.len())?;

        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for (x, y) in batches {
            let y_pred = self.forward(params, x)?;
            let loss = loss_fn.loss(y_pred.view(), y);

            if !loss.is_finite() {
                return Ok(loss);
            }

            total_loss += loss;
            num_batches += 1;

            let mut d = loss_fn.loss_prime(y_pred.view(), y);

            for (layer, &offset) in self.layers.iter_mut().zip(&self.offsets).rev() {
                let size = layer.size();
                let range = offset..offset + size;
                d = layer.backward(&params[range.clone()], &mut grad[range], d)?;
            }

            optimizer.update_params(params, grad)?;
        }

        if num_batches == 0 {
            return Err(MlErr::EmptyDataset);
        }

        Ok(total_loss / num_batches as f32)
    }
}
