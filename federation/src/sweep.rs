use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::{
    configs::{AllocationPolicy, DatasetName, ExperimentConfig, Framework},
    metrics::RunRecord,
};

/// The cross product of run tuples to execute, on top of a base configuration.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub base: ExperimentConfig,
    pub frameworks: Vec<Framework>,
    pub datasets: Vec<DatasetName>,
    pub allocations: Vec<AllocationPolicy>,
    pub seeds: Vec<u64>,
}

impl SweepPlan {
    /// Every compatible tuple of the cross product, as a ready to run configuration.
    ///
    /// Framework and allocation pairs that can't go together are left out.
    pub fn configs(&self) -> Vec<ExperimentConfig> {
        let mut configs = Vec::new();

        for &framework in &self.frameworks {
            for &allocation in &self.allocations {
                if !framework.accepts(allocation) {
                    info!("skipping {framework} with {allocation} allocation");
                    continue;
                }

                for &dataset in &self.datasets {
                    for &seed in &self.seeds {
                        configs.push(ExperimentConfig {
                            framework,
                            allocation,
                            dataset,
                            seed,
                            ..self.base.clone()
                        });
                    }
                }
            }
        }

        configs
    }
}

/// A tuple of the sweep that ended with an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub tuple: String,
    pub error: String,
}

/// The outcome of every tuple of a sweep.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub completed: Vec<RunRecord>,
    pub failed: Vec<FailedRun>,
}

impl SweepSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs every tuple of `plan` with `runner`. A failing tuple is recorded and the sweep moves
/// on to the next one.
pub fn run_sweep<F>(plan: &SweepPlan, mut runner: F) -> SweepSummary
where
    F: FnMut(&ExperimentConfig) -> crate::Result<RunRecord>,
{
    let configs = plan.configs();
    let mut summary = SweepSummary::default();

    for (i, config) in configs.iter().enumerate() {
        let tuple = config.tuple_key();
        info!("sweep tuple {}/{}: {tuple}", i + 1, configs.len());

        match runner(config) {
            Ok(record) => summary.completed.push(record),
            Err(e) => {
                error!("{tuple} failed: {e}");
                summary.failed.push(FailedRun {
                    tuple,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "sweep finished, {} completed and {} failed",
        summary.completed.len(),
        summary.failed.len()
    );

    summary
}
