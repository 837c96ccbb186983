use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use machine_learning::training::Evaluation;
use serde::{Deserialize, Serialize};

use crate::{
    configs::{AllocationPolicy, DatasetName, ExperimentConfig, Framework},
    error::Result,
};

/// Loss and accuracy over the test set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub loss: f32,
    pub accuracy: f32,
}

impl From<Evaluation> for EvalSummary {
    fn from(e: Evaluation) -> Self {
        Self {
            loss: e.loss,
            accuracy: e.accuracy,
        }
    }
}

/// What happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub round: usize,
    pub participants: Vec<usize>,
    pub diverged: Vec<usize>,
    pub skipped: Vec<usize>,
    /// Mean local loss of the clients that trained, weighted by their samples.
    pub train_loss: Option<f32>,
    pub test: EvalSummary,
    /// Global parameters no update covered.
    pub uncovered_coordinates: usize,
    /// Global units no participant received.
    pub uncovered_units: usize,
}

/// Mean and standard deviation of a set of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub mean: f32,
    pub std: f32,
}

impl Spread {
    /// The population mean and standard deviation, zero for no values.
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self { mean: 0., std: 0. };
        }

        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        Self {
            mean: mean as f32,
            std: var.sqrt() as f32,
        }
    }
}

/// The result of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub framework: Framework,
    pub dataset: DatasetName,
    pub allocation: AllocationPolicy,
    pub seed: u64,
    pub clients: usize,
    pub rounds: Vec<RoundMetrics>,
    /// Test accuracy of every client's own submodel of the final model.
    pub analytics: Spread,
    /// The final model over the test set.
    pub evaluation: EvalSummary,
}

impl RunRecord {
    pub fn new(config: &ExperimentConfig, clients: usize) -> Self {
        Self {
            framework: config.framework,
            dataset: config.dataset,
            allocation: config.allocation,
            seed: config.seed,
            clients,
            rounds: Vec::new(),
            analytics: Spread::of(&[]),
            evaluation: EvalSummary {
                loss: f32::NAN,
                accuracy: 0.,
            },
        }
    }
}

/// Writes `record` as pretty JSON into `dir`, named after the run's tuple.
///
/// # Returns
/// The path of the written file.
pub fn write_record(dir: &Path, config: &ExperimentConfig, record: &RunRecord) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(format!("{}.json", config.tuple_key()));
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, record)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spread_of_values() {
        let spread = Spread::of(&[0.5, 1.0, 0.0, 0.5]);

        assert_eq!(spread.mean, 0.5);
        assert!((spread.std - 0.125f32.sqrt()).abs() < 1e-6);
        assert_eq!(Spread::of(&[]), Spread { mean: 0., std: 0. });
    }

    #[test]
    fn records_are_written_under_their_tuple_key() {
        let dir = std::env::temp_dir().join(format!("records-{}", std::process::id()));
        let config = ExperimentConfig::default();
        let mut record = RunRecord::new(&config, 10);
        record.evaluation = EvalSummary {
            loss: 0.25,
            accuracy: 0.75,
        };

        let path = write_record(&dir, &config, &record).unwrap();
        assert!(path.ends_with(format!("{}.json", config.tuple_key())));

        let read: RunRecord = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(read, record);

        fs::remove_dir_all(dir).unwrap();
    }
}
