use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

/// Softmax cross-entropy over raw logits, averaged over the batch.
///
/// The expected output `y` holds one-hot rows.
#[derive(Default, Clone, Copy, Debug)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    /// Row-wise softmax, shifted by the row maximum for stability.
    pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut out = logits.to_owned();

        for mut row in out.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            row.mapv_inplace(|x| (x - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|x| x / sum);
        }

        out
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let rows = y_pred.nrows().max(1) as f32;
        let mut total = 0.0;

        for (logits, target) in y_pred.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            let max = logits.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
            let log_sum = logits.mapv(|x| (x - max).exp()).sum().ln() + max;

            total += logits
                .iter()
                .zip(target)
                .map(|(&z, &t)| t * (log_sum - z))
                .sum::<f32>();
        }

        total / rows
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let rows = y_pred.nrows().max(1) as f32;
        (Self::softmax(y_pred) - &y) / rows
    }
}
