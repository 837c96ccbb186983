mod partition;
mod synthetic;

pub use partition::{DirichletPartitioner, IidPartitioner, Partitioner, shard_range};
pub use synthetic::SyntheticSource;

use log::info;
use machine_learning::dataset::Dataset;

use crate::{
    configs::{PartitionScheme, RunPlan},
    error::{FlError, Result},
    seed::SeedTree,
};

/// The local shard of every client plus the shared test set.
#[derive(Debug, Clone)]
pub struct FederatedData {
    shards: Vec<Dataset>,
    test: Dataset,
}

impl FederatedData {
    /// Creates a new `FederatedData`.
    ///
    /// # Returns
    /// An error if the shards and the test set don't share the same shape.
    pub fn new(shards: Vec<Dataset>, test: Dataset) -> Result<Self> {
        let mismatch = shards
            .iter()
            .any(|s| s.x_size() != test.x_size() || s.y_size() != test.y_size());

        if mismatch {
            return Err(FlError::InvalidConfig(
                "client shards and test set have different shapes".into(),
            ));
        }

        Ok(Self { shards, test })
    }

    /// Generates synthetic data shaped like the plan's dataset and partitions it among its
    /// clients.
    ///
    /// # Arguments
    /// * `plan` - The resolved run.
    /// * `seeds` - The root of the run's seed tree.
    pub fn synthetic(plan: &RunPlan, seeds: &SeedTree) -> Result<Self> {
        let arch = &plan.architecture;
        let source = SyntheticSource::new(arch.input, arch.classes);
        let (train, test) = source.generate(
            plan.config.train_samples,
            plan.config.test_samples,
            &mut seeds.child("data").rng(),
        )?;

        let mut rng = seeds.child("partition").rng();
        let labels = train.labels();
        let parts = match plan.partition {
            PartitionScheme::Iid => IidPartitioner.partition(&labels, plan.clients, &mut rng)?,
            PartitionScheme::Dirichlet { alpha } => {
                DirichletPartitioner::new(alpha).partition(&labels, plan.clients, &mut rng)?
            }
        };

        let shards = parts
            .iter()
            .map(|indices| train.select(indices))
            .collect::<machine_learning::Result<Vec<_>>>()?;

        info!(
            "partitioned {} samples among {} clients ({:?})",
            train.len(),
            plan.clients,
            plan.partition
        );

        Self::new(shards, test)
    }

    pub fn shard(&self, client: usize) -> Option<&Dataset> {
        self.shards.get(client)
    }

    pub fn shards(&self) -> &[Dataset] {
        &self.shards
    }

    pub fn test(&self) -> &Dataset {
        &self.test
    }

    pub fn clients(&self) -> usize {
        self.shards.len()
    }
}
