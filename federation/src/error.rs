use std::{fmt, io};

use machine_learning::MlErr;

use crate::configs::{AllocationPolicy, Framework};

/// The result type used across the federation crate.
pub type Result<T> = std::result::Result<T, FlError>;

/// All errors that can end a federated run.
///
/// A client whose local loss stops being finite is not an error: it is reported as a
/// `Divergence` and the round goes on without it.
#[derive(Debug)]
pub enum FlError {
    /// Invalid configuration, caught before round 0.
    InvalidConfig(String),
    /// A tier fraction outside of `(0, 1]`.
    InvalidCapacity { what: &'static str, fraction: f32 },
    /// The allocation policy is not available for the framework.
    UnsupportedAllocation {
        framework: Framework,
        allocation: AllocationPolicy,
    },
    /// The global model held a non finite value after aggregating a round.
    FatalNumeric { round: usize, layer: usize },
    /// The learning backend failed.
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl FlError {
    /// Whether the error was raised while validating the run, before any round executed.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::InvalidCapacity { .. } | Self::UnsupportedAllocation { .. }
        )
    }
}

impl fmt::Display for FlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::InvalidCapacity { what, fraction } => {
                write!(f, "invalid capacity: {what} fraction {fraction} is not in (0, 1]")
            }
            Self::UnsupportedAllocation {
                framework,
                allocation,
            } => write!(
                f,
                "allocation policy {allocation} is not supported by framework {framework}"
            ),
            Self::FatalNumeric { round, layer } => {
                write!(f, "global model layer {layer} is not finite after round {round}")
            }
            Self::Ml(e) => write!(f, "learning backend error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl std::error::Error for FlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Ml(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for FlError {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<io::Error> for FlError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for FlError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_flagged() {
        let unsupported = FlError::UnsupportedAllocation {
            framework: Framework::Fedavg,
            allocation: AllocationPolicy::Cyclic,
        };

        assert!(unsupported.is_config());
        assert!(!FlError::FatalNumeric { round: 3, layer: 1 }.is_config());
        assert_eq!(
            unsupported.to_string(),
            "allocation policy cyclic is not supported by framework fedavg"
        );
    }
}
