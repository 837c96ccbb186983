use super::{AllocationHistory, AllocationMask, Allocator, MaskGeometry};
use crate::capacity::ClientCapacity;

/// Hands out the whole model to every client, every round.
#[derive(Debug, Clone)]
pub struct FullAllocator {
    geometry: MaskGeometry,
}

impl FullAllocator {
    pub fn new(geometry: MaskGeometry) -> Self {
        Self { geometry }
    }
}

impl Allocator for FullAllocator {
    fn compute_mask(&self, _: &ClientCapacity, _: usize, _: &AllocationHistory) -> AllocationMask {
        AllocationMask::full(self.geometry.widths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Architecture;

    #[test]
    fn ignores_the_nominal_capacity() {
        let geometry = MaskGeometry::new(&Architecture::new(4, vec![10, 10], 3), 0.1);
        let allocator = FullAllocator::new(geometry);
        let weak = ClientCapacity {
            client: 0,
            tier: 0,
            width: 0.1,
            depth: 0.1,
        };

        let mask = allocator.compute_mask(&weak, 4, &AllocationHistory::new());
        assert!(mask.layers().iter().all(|m| m.is_full()));
        assert_eq!(mask.units(), 23);
    }
}
