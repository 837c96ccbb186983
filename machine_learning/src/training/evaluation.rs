use ndarray::Axis;

use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    dataset::Dataset,
};

const EVAL_BATCH: usize = 256;

/// The quality of a model over some dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// Evaluates a classifier, counting a hit whenever the largest output matches the largest
/// expected output.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `params` - The model's parameters.
/// * `dataset` - The evaluation data.
/// * `loss_fn` - The loss function to report.
///
/// # Returns
/// The sample-weighted loss and the accuracy, or an error if the dataset is empty.
pub fn evaluate<M, L>(
    model: &mut M,
    params: &[f32],
    dataset: &Dataset,
    loss_fn: &L,
) -> Result<Evaluation>
where
    M: Model,
    L: LossFn,
{
    if dataset.is_empty() {
        return Err(MlErr::EmptyDataset);
    }

    let (x, y) = dataset.view()?;
    let mut loss = 0.0;
    let mut hits = 0;

    for (x, y) in x
        .axis_chunks_iter(Axis(0), EVAL_BATCH)
        .zip(y.axis_chunks_iter(Axis(0), EVAL_BATCH))
    {
        let y_pred = model.forward(params, x)?;
        loss += loss_fn.loss(y_pred.view(), y) * x.nrows() as f32;

        hits += y_pred
            .axis_iter(Axis(0))
            .zip(y.axis_iter(Axis(0)))
            .filter(|(pred, target)| argmax(pred.iter()) == argmax(target.iter()))
            .count();
    }

    let len = dataset.len() as f32;
    Ok(Evaluation {
        loss: loss / len,
        accuracy: hits as f32 / len,
    })
}

fn argmax<'a, I: Iterator<Item = &'a f32>>(values: I) -> usize {
    values
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}
