use rand::Rng;

use super::{AllocationHistory, AllocationMask, Allocator, MaskGeometry};
use crate::{capacity::ClientCapacity, seed::SeedTree};

/// Rotates every window of the inner allocator by a random amount of strides, drawn per
/// round and client. Submodels stay structured windows but which units a client drops
/// changes from round to round.
#[derive(Debug, Clone)]
pub struct Jittered<A> {
    inner: A,
    geometry: MaskGeometry,
    seeds: SeedTree,
}

impl<A: Allocator> Jittered<A> {
    pub fn new(inner: A, geometry: MaskGeometry, seeds: SeedTree) -> Self {
        Self {
            inner,
            geometry,
            seeds,
        }
    }
}

impl<A: Allocator> Allocator for Jittered<A> {
    fn compute_mask(
        &self,
        client: &ClientCapacity,
        round: usize,
        history: &AllocationHistory,
    ) -> AllocationMask {
        let mask = self.inner.compute_mask(client, round, history);
        let mut rng = self
            .seeds
            .index(round as u64)
            .index(client.client as u64)
            .rng();

        mask.map(|(l, layer)| {
            let strides = rng.random_range(0..self.geometry.steps(l));
            layer.rotate(strides * self.geometry.stride(l))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allocation::CyclicAllocator, model::Architecture};

    fn jittered() -> Jittered<CyclicAllocator> {
        let geometry = MaskGeometry::new(&Architecture::new(4, vec![100, 100], 2), 0.1);
        Jittered::new(CyclicAllocator::new(geometry.clone()), geometry, SeedTree::new(3))
    }

    fn client(client: usize) -> ClientCapacity {
        ClientCapacity {
            client,
            tier: 0,
            width: 0.3,
            depth: 1.0,
        }
    }

    #[test]
    fn keeps_window_sizes_and_alignment() {
        let allocator = jittered();
        let history = AllocationHistory::new();

        for round in 0..20 {
            let mask = allocator.compute_mask(&client(1), round, &history);

            for hidden in &mask.layers()[..2] {
                assert_eq!(hidden.len(), 30);
                assert_eq!(hidden.offset() % 10, 0);
            }
            assert!(mask.layers()[2].is_full());
        }
    }

    #[test]
    fn rotations_depend_on_round_and_client() {
        let allocator = jittered();
        let history = AllocationHistory::new();
        let offsets = |c: usize| -> Vec<usize> {
            (0..20)
                .map(|r| allocator.compute_mask(&client(c), r, &history).layers()[0].offset())
                .collect()
        };

        assert_eq!(offsets(0), offsets(0));
        assert_ne!(offsets(0), offsets(1));
    }
}
