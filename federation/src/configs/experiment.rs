use std::{fmt, path::PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::TierTable;

/// The federated learning framework being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Pdhfl,
    Heterofl,
    Fjord,
    Feddrop,
    Local,
    Fedavg,
}

impl Framework {
    pub const ALL: [Framework; 6] = [
        Self::Pdhfl,
        Self::Heterofl,
        Self::Fjord,
        Self::Feddrop,
        Self::Local,
        Self::Fedavg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pdhfl => "pdhfl",
            Self::Heterofl => "heterofl",
            Self::Fjord => "fjord",
            Self::Feddrop => "feddrop",
            Self::Local => "local",
            Self::Fedavg => "fedavg",
        }
    }

    /// Baselines train the whole model on every client.
    pub fn is_baseline(self) -> bool {
        matches!(self, Self::Local | Self::Fedavg)
    }

    /// Whether the framework can drop trailing hidden layers for weaker tiers.
    pub fn supports_depth(self) -> bool {
        matches!(self, Self::Pdhfl | Self::Heterofl)
    }

    /// Whether `allocation` can be paired with this framework.
    pub fn accepts(self, allocation: AllocationPolicy) -> bool {
        match allocation {
            AllocationPolicy::Full => self.is_baseline(),
            AllocationPolicy::Cyclic | AllocationPolicy::Sim => !self.is_baseline(),
        }
    }
}

/// How submodels are chosen over the rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationPolicy {
    Cyclic,
    Sim,
    Full,
}

impl AllocationPolicy {
    pub fn name(self) -> &'static str {
        match self {
            Self::Cyclic => "cyclic",
            Self::Sim => "sim",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetName {
    Mnist,
    Har,
    Nbaiot,
    #[value(name = "cifar10")]
    Cifar10,
    #[value(name = "cifar100")]
    Cifar100,
}

impl DatasetName {
    pub fn name(self) -> &'static str {
        match self {
            Self::Mnist => "mnist",
            Self::Har => "har",
            Self::Nbaiot => "nbaiot",
            Self::Cifar10 => "cifar10",
            Self::Cifar100 => "cifar100",
        }
    }

    /// Returns the `(features, classes)` shape of a sample.
    pub fn shape(self) -> (usize, usize) {
        match self {
            Self::Mnist => (784, 10),
            Self::Har => (561, 6),
            Self::Nbaiot => (115, 11),
            Self::Cifar10 => (3072, 10),
            Self::Cifar100 => (3072, 100),
        }
    }

    /// Har and N-BaIoT are split by their natural subject/device ids, which are close to iid.
    pub fn naturally_iid(self) -> bool {
        matches!(self, Self::Har | Self::Nbaiot)
    }
}

/// How clients are mapped to capacity tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierAssignment {
    /// Client `i` gets tier `i mod T`.
    #[default]
    RoundRobin,
    /// Each client draws its tier following the table's weights.
    Sampled,
}

/// The initial weight distribution of the global model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightInit {
    #[default]
    Kaiming,
    Xavier,
    Lecun,
}

macro_rules! display_by_name {
    ($($t:ty),*) => {
        $(
            impl fmt::Display for $t {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.name())
                }
            }
        )*
    };
}

display_by_name!(Framework, AllocationPolicy, DatasetName);

/// Every parameter of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub rounds: usize,
    pub dataset: DatasetName,
    pub framework: Framework,
    pub allocation: AllocationPolicy,
    pub seed: u64,
    pub batch_size: usize,
    /// Defaults to the amount of classes of the dataset.
    pub clients: Option<usize>,
    pub epochs: usize,
    pub steps_per_epoch: Option<usize>,
    /// Fraction of the clients taking part in each round.
    pub proportion_clients: f32,
    pub learning_rate: f32,
    pub hidden: Vec<usize>,
    /// Fraction of a layer's width the cyclic window advances per round.
    pub stride_fraction: f32,
    pub tier_assignment: TierAssignment,
    pub tiers: Option<TierTable>,
    pub tiers_file: Option<PathBuf>,
    pub init: WeightInit,
    pub train_samples: usize,
    pub test_samples: usize,
    pub iid: bool,
    pub alpha: f32,
    pub sequential: bool,
    pub results_dir: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            rounds: 10,
            dataset: DatasetName::Mnist,
            framework: Framework::Fedavg,
            allocation: AllocationPolicy::Full,
            seed: 42,
            batch_size: 32,
            clients: None,
            epochs: 1,
            steps_per_epoch: None,
            proportion_clients: 1.0,
            learning_rate: 0.1,
            hidden: vec![100, 100],
            stride_fraction: 0.1,
            tier_assignment: TierAssignment::RoundRobin,
            tiers: None,
            tiers_file: None,
            init: WeightInit::Kaiming,
            train_samples: 2000,
            test_samples: 500,
            iid: false,
            alpha: 0.5,
            sequential: false,
            results_dir: None,
        }
    }
}

impl ExperimentConfig {
    /// The `key=value` identifier of the run's tuple, used to name its results.
    pub fn tuple_key(&self) -> String {
        format!(
            "framework={}_dataset={}_allocation={}_seed={}_rounds={}",
            self.framework, self.dataset, self.allocation, self.seed, self.rounds
        )
    }
}
