use super::{AllocationHistory, AllocationMask, Allocator, MaskGeometry};
use crate::capacity::ClientCapacity;

/// Slides every client's window one stride forward per round, wrapping around the layer.
///
/// Offsets only depend on the round, so at any round the windows of all tiers start at the
/// same unit and smaller submodels are prefixes of bigger ones.
#[derive(Debug, Clone)]
pub struct CyclicAllocator {
    geometry: MaskGeometry,
}

impl CyclicAllocator {
    pub fn new(geometry: MaskGeometry) -> Self {
        Self { geometry }
    }

    /// The window offset of layer `l` in `round`.
    pub fn offset(&self, l: usize, round: usize) -> usize {
        let width = self.geometry.widths()[l];
        (round % width) * self.geometry.stride(l) % width
    }
}

impl Allocator for CyclicAllocator {
    fn compute_mask(
        &self,
        client: &ClientCapacity,
        round: usize,
        _: &AllocationHistory,
    ) -> AllocationMask {
        self.geometry.mask(client, |l| self.offset(l, round))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Architecture;

    fn client(width: f32) -> ClientCapacity {
        ClientCapacity {
            client: 0,
            tier: 0,
            width,
            depth: 1.0,
        }
    }

    #[test]
    fn offsets_advance_by_stride_and_wrap() {
        let allocator = CyclicAllocator::new(MaskGeometry::new(&Architecture::new(4, vec![100], 2), 0.1));

        assert_eq!(allocator.offset(0, 0), 0);
        assert_eq!(allocator.offset(0, 3), 30);
        assert_eq!(allocator.offset(0, 10), 0);
        assert_eq!(allocator.offset(0, 12), 20);
    }

    #[test]
    fn windows_wrap_around_the_layer() {
        let allocator = CyclicAllocator::new(MaskGeometry::new(&Architecture::new(4, vec![100], 2), 0.1));
        let mask = allocator.compute_mask(&client(0.3), 8, &AllocationHistory::new());
        let hidden = mask.layer(0).unwrap();

        assert_eq!(hidden.len(), 30);
        assert!(hidden.contains(80) && hidden.contains(99) && hidden.contains(9));
        assert!(!hidden.contains(10));
        assert!(mask.layer(1).unwrap().is_full());
    }

    #[test]
    fn huge_rounds_do_not_overflow() {
        let allocator = CyclicAllocator::new(MaskGeometry::new(&Architecture::new(4, vec![100], 2), 0.1));
        assert_eq!(allocator.offset(0, usize::MAX), (usize::MAX % 100) * 10 % 100);
    }
}
