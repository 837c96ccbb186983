mod dense;
mod layer;
mod scale;

pub use dense::Dense;
pub use layer::Layer;
pub use scale::Scale;
