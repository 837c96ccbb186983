mod adapter;
mod experiment;
mod tiers;

pub use adapter::{Adapter, PartitionScheme, RunPlan, TrainingPlan};
pub use experiment::{
    AllocationPolicy, DatasetName, ExperimentConfig, Framework, TierAssignment, WeightInit,
};
pub use tiers::{Tier, TierTable};
