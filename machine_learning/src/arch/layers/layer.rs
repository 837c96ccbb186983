use ndarray::{Array2, ArrayView2};

use super::{Dense, Scale};
use crate::{Result, arch::activations::ActFn};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
    Scale(Scale),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn scale(factor: f32) -> Self {
        Self::Scale(Scale::new(factor))
    }

    /// Returns the amount of parameters this layer reads from the flat buffer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            Scale(_) => 0,
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(params, x),
            Scale(l) => Ok(l.forward(x)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
            Scale(l) => Ok(l.backward(d)),
        }
    }
}
