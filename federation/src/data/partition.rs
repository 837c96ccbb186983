use std::ops::Range;

use rand::{Rng, seq::SliceRandom};
use rand_distr::{Distribution, Gamma};

use crate::error::{FlError, Result};

/// Splits the samples of a dataset among clients.
pub trait Partitioner {
    /// Returns the sample indices of every client.
    ///
    /// # Arguments
    /// * `labels` - The class of every sample.
    /// * `clients` - The amount of clients.
    /// * `rng` - The `partition` stream of the run.
    fn partition(
        &self,
        labels: &[usize],
        clients: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<Vec<usize>>>;
}

/// Splits `total` samples among `shards` and returns the range of `shard`.
///
/// Ranges are contiguous, disjoint and cover `[0..total)`, their sizes differ by at most 1.
pub fn shard_range(total: usize, shard: usize, shards: usize) -> Range<usize> {
    let base = total / shards.max(1);
    let rem = total % shards.max(1);

    let start = shard * base + shard.min(rem);
    let extra = usize::from(shard < rem);
    start..start + base + extra
}

/// Shuffles the samples and deals balanced contiguous ranges.
#[derive(Debug, Clone, Copy, Default)]
pub struct IidPartitioner;

impl Partitioner for IidPartitioner {
    fn partition(
        &self,
        labels: &[usize],
        clients: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.shuffle(rng);

        Ok((0..clients)
            .map(|c| order[shard_range(order.len(), c, clients)].to_vec())
            .collect())
    }
}

/// Latent Dirichlet allocation: the samples of every class are split among clients following
/// proportions drawn from a symmetric Dirichlet of concentration `alpha`. The smaller `alpha`,
/// the more skewed every client's label distribution.
#[derive(Debug, Clone, Copy)]
pub struct DirichletPartitioner {
    alpha: f32,
}

impl DirichletPartitioner {
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    fn proportions<R: Rng + ?Sized>(&self, gamma: &Gamma<f64>, clients: usize, rng: &mut R) -> Vec<f64> {
        let draws: Vec<f64> = (0..clients).map(|_| gamma.sample(rng)).collect();
        let sum: f64 = draws.iter().sum();

        if sum > 0.0 && sum.is_finite() {
            draws.into_iter().map(|d| d / sum).collect()
        } else {
            vec![1.0 / clients as f64; clients]
        }
    }
}

impl Partitioner for DirichletPartitioner {
    fn partition(
        &self,
        labels: &[usize],
        clients: usize,
        rng: &mut dyn rand::RngCore,
    ) -> Result<Vec<Vec<usize>>> {
        let gamma = Gamma::new(self.alpha as f64, 1.0).map_err(|e| {
            FlError::InvalidConfig(format!("dirichlet alpha {}: {e}", self.alpha))
        })?;

        let classes = labels.iter().max().map_or(0, |&m| m + 1);
        let mut parts = vec![Vec::new(); clients];

        for class in 0..classes {
            let mut indices: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
            indices.shuffle(rng);

            let proportions = self.proportions(&gamma, clients, rng);
            let total = indices.len();
            let mut start = 0;
            let mut acc = 0.0;

            for (part, p) in parts.iter_mut().zip(proportions) {
                acc += p;
                let end = ((acc * total as f64).round() as usize).clamp(start, total);
                part.extend_from_slice(&indices[start..end]);
                start = end;
            }

            // rounding leftovers
            if let Some(last) = parts.last_mut() {
                last.extend_from_slice(&indices[start..]);
            }
        }

        Ok(parts)
    }
}
