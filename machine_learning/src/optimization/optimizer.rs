use crate::Result;

pub trait Optimizer {
    /// Updates `params` in place following the gradient `grad`.
    ///
    /// # Returns
    /// An error if `params` and `grad` differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}
