use rand::seq::SliceRandom;

use super::{Allocation, AllocationHistory, AllocationMask, Allocator, LayerMask, MaskGeometry};
use crate::{capacity::ClientCapacity, seed::SeedTree};

/// Which clients' masks a window is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Clients of the same tier, in the previous round and earlier in the current one.
    PerTier,
    /// Every client of the previous round. All clients of a round get the same offsets, so
    /// submodels stay nested.
    Shared,
}

/// Places each window where it overlaps the least with the windows its peers trained
/// recently, spreading same-tier clients over the whole layer.
///
/// Candidate offsets are the stride aligned units. The score of a candidate is the sum over
/// its units of how many peer masks covered that unit, the lowest score wins and ties go to
/// the earliest candidate of a seed-derived permutation, one per (round, group, layer).
/// Round 0 has no history and uses offset 0.
#[derive(Debug, Clone)]
pub struct SimilarityAllocator {
    geometry: MaskGeometry,
    grouping: Grouping,
    seeds: SeedTree,
}

impl SimilarityAllocator {
    pub fn new(geometry: MaskGeometry, grouping: Grouping, seeds: SeedTree) -> Self {
        Self {
            geometry,
            grouping,
            seeds,
        }
    }

    fn is_peer(&self, client: &ClientCapacity, other: &Allocation) -> bool {
        match self.grouping {
            Grouping::PerTier => other.tier == client.tier,
            Grouping::Shared => true,
        }
    }

    /// How many peer masks covered every unit of layer `l`.
    fn coverage(
        &self,
        client: &ClientCapacity,
        l: usize,
        history: &AllocationHistory,
    ) -> Vec<u32> {
        let mut counts = vec![0; self.geometry.widths()[l]];
        let current = match self.grouping {
            Grouping::PerTier => history.current(),
            Grouping::Shared => &[],
        };

        for allocation in history.previous().iter().chain(current) {
            if !self.is_peer(client, allocation) {
                continue;
            }

            if let Some(mask) = allocation.mask.layer(l) {
                for unit in mask.indices() {
                    counts[unit] += 1;
                }
            }
        }

        counts
    }

    /// The window length candidates are scored with.
    fn scored_len(&self, client: &ClientCapacity, l: usize, history: &AllocationHistory) -> usize {
        match self.grouping {
            Grouping::PerTier => self.geometry.len(client, l),
            // The smallest window of the previous round, shared by every submodel.
            Grouping::Shared => history
                .previous()
                .iter()
                .filter_map(|a| a.mask.layer(l))
                .map(LayerMask::len)
                .filter(|&len| len > 0)
                .min()
                .unwrap_or_else(|| self.geometry.stride(l)),
        }
    }

    fn candidates(&self, client: &ClientCapacity, round: usize, l: usize) -> Vec<usize> {
        let stride = self.geometry.stride(l);
        let mut candidates: Vec<usize> = (0..self.geometry.steps(l)).map(|k| k * stride).collect();

        let group = match self.grouping {
            Grouping::PerTier => self.seeds.child("tier").index(client.tier as u64),
            Grouping::Shared => self.seeds.child("shared"),
        };

        candidates.shuffle(&mut group.index(round as u64).index(l as u64).rng());
        candidates
    }

    fn offset(
        &self,
        client: &ClientCapacity,
        round: usize,
        l: usize,
        history: &AllocationHistory,
    ) -> usize {
        let width = self.geometry.widths()[l];
        let len = self.scored_len(client, l, history);
        let counts = self.coverage(client, l, history);

        self.candidates(client, round, l)
            .into_iter()
            .min_by_key(|&offset| {
                LayerMask::window(width, offset, len)
                    .indices()
                    .map(|unit| counts[unit] as u64)
                    .sum::<u64>()
            })
            .unwrap_or(0)
    }
}

impl Allocator for SimilarityAllocator {
    fn compute_mask(
        &self,
        client: &ClientCapacity,
        round: usize,
        history: &AllocationHistory,
    ) -> AllocationMask {
        if round == 0 {
            return self.geometry.prefix(client);
        }

        self.geometry
            .mask(client, |l| self.offset(client, round, l, history))
    }
}
