use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use super::Framework;
use crate::error::{FlError, Result};

const DEFAULT_FRACTIONS: [f32; 3] = [0.3, 0.5, 1.0];

/// The capacity of a tier: the fraction of every hidden layer's width it can hold and the
/// fraction of the hidden layers it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub width: f32,
    pub depth: f32,
}

impl Tier {
    pub const FULL: Tier = Tier {
        width: 1.0,
        depth: 1.0,
    };
}

/// The capacity tiers of a run, one column per tier.
///
/// Missing `depths` mean full depth and missing `weights` mean equally likely tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub widths: Vec<f32>,
    #[serde(default)]
    pub depths: Vec<f32>,
    #[serde(default)]
    pub weights: Vec<f32>,
}

impl TierTable {
    /// Returns the default table of `framework`.
    pub fn default_for(framework: Framework) -> Self {
        if framework.is_baseline() {
            return Self::full();
        }

        Self {
            widths: DEFAULT_FRACTIONS.to_vec(),
            depths: DEFAULT_FRACTIONS.to_vec(),
            weights: Vec::new(),
        }
        .for_framework(framework)
    }

    /// The single tier holding the whole model.
    pub fn full() -> Self {
        Self {
            widths: vec![1.0],
            depths: vec![1.0],
            weights: Vec::new(),
        }
    }

    /// Reads the table of `framework` out of a JSON file keyed by framework name.
    pub fn load(path: &Path, framework: Framework) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut tables: HashMap<String, TierTable> = serde_json::from_reader(reader)?;

        tables.remove(framework.name()).ok_or_else(|| {
            FlError::InvalidConfig(format!(
                "{} has no tier table for {framework}",
                path.display()
            ))
        })
    }

    /// Adapts the table to the framework's constraints: only frameworks that support depth
    /// heterogeneity keep partial depths.
    pub fn for_framework(mut self, framework: Framework) -> Self {
        if self.depths.is_empty() || !framework.supports_depth() {
            self.depths = vec![1.0; self.widths.len()];
        }

        self
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    pub fn tier(&self, i: usize) -> Option<Tier> {
        Some(Tier {
            width: *self.widths.get(i)?,
            depth: self.depths.get(i).copied().unwrap_or(1.0),
        })
    }

    /// The sampling weight of every tier.
    pub fn weights(&self) -> Vec<f32> {
        if self.weights.is_empty() {
            vec![1.0; self.len()]
        } else {
            self.weights.clone()
        }
    }

    /// Whether some tier drops hidden layers.
    pub fn has_partial_depth(&self) -> bool {
        self.depths.iter().any(|&d| d < 1.0)
    }

    /// Checks that every fraction lies in `(0, 1]` and that the columns line up.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(FlError::InvalidConfig(
                "tier table must have at least one tier".into(),
            ));
        }

        for (what, column) in [("depths", &self.depths), ("weights", &self.weights)] {
            if !column.is_empty() && column.len() != self.len() {
                return Err(FlError::InvalidConfig(format!(
                    "tier table has {} widths but {} {what}",
                    self.len(),
                    column.len()
                )));
            }
        }

        for (what, column) in [("width", &self.widths), ("depth", &self.depths)] {
            if let Some(&fraction) = column.iter().find(|&&f| !(f > 0.0 && f <= 1.0)) {
                return Err(FlError::InvalidCapacity { what, fraction });
            }
        }

        let weights = self.weights();
        let usable = weights.iter().all(|&w| w >= 0.0 && w.is_finite());
        if !usable || weights.iter().sum::<f32>() <= 0.0 {
            return Err(FlError::InvalidConfig(
                "tier weights must be non negative with a positive sum".into(),
            ));
        }

        Ok(())
    }
}
