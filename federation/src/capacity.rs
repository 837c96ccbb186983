use rand::distr::{Distribution, weighted::WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::{
    configs::{Tier, TierAssignment, TierTable},
    error::{FlError, Result},
    seed::SeedTree,
};

/// The fixed capacity of one client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientCapacity {
    pub client: usize,
    pub tier: usize,
    pub width: f32,
    pub depth: f32,
}

/// The capacity of every client of a run, assigned once before round 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityProfile {
    clients: Vec<ClientCapacity>,
}

impl CapacityProfile {
    /// Assigns a tier of `tiers` to each of `n` clients.
    ///
    /// # Arguments
    /// * `n` - The amount of clients.
    /// * `tiers` - The available tiers.
    /// * `assignment` - How tiers are handed out.
    /// * `seeds` - The `capacity` stream, only used when sampling.
    ///
    /// # Returns
    /// The profile or a configuration error if the table is invalid.
    pub fn generate(
        n: usize,
        tiers: &TierTable,
        assignment: TierAssignment,
        seeds: &SeedTree,
    ) -> Result<Self> {
        tiers.validate()?;

        let indices: Vec<usize> = match assignment {
            TierAssignment::RoundRobin => (0..n).map(|i| i % tiers.len()).collect(),
            TierAssignment::Sampled => {
                let dist = WeightedIndex::new(tiers.weights())
                    .map_err(|e| FlError::InvalidConfig(format!("tier weights: {e}")))?;
                let mut rng = seeds.rng();
                (0..n).map(|_| dist.sample(&mut rng)).collect()
            }
        };

        let clients = indices
            .into_iter()
            .enumerate()
            .map(|(client, tier)| {
                let Tier { width, depth } = tiers.tier(tier).unwrap_or(Tier::FULL);
                ClientCapacity {
                    client,
                    tier,
                    width,
                    depth,
                }
            })
            .collect();

        Ok(Self { clients })
    }

    /// Every client holds the whole model, whatever its nominal capacity.
    pub fn full(n: usize) -> Self {
        let clients = (0..n)
            .map(|client| ClientCapacity {
                client,
                tier: 0,
                width: 1.0,
                depth: 1.0,
            })
            .collect();

        Self { clients }
    }

    pub fn get(&self, client: usize) -> Option<&ClientCapacity> {
        self.clients.get(client)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientCapacity> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
