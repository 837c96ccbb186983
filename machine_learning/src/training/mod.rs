mod evaluation;
mod model_trainer;
mod trainer;

pub use evaluation::{Evaluation, evaluate};
pub use model_trainer::ModelTrainer;
pub use trainer::Trainer;
