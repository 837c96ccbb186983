use ndarray::{Array2, ArrayView2};

/// A parameter-free layer that multiplies its input by a constant factor.
#[derive(Clone, Copy, Debug)]
pub struct Scale {
    factor: f32,
}

impl Scale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let factor = self.factor;
        x.mapv(|x| x * factor)
    }

    pub fn backward(&self, d: Array2<f32>) -> Array2<f32> {
        let factor = self.factor;
        d.mapv_into(|d| d * factor)
    }
}
