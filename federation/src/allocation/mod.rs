mod cyclic;
mod full;
mod geometry;
mod history;
mod jittered;
mod mask;
mod similarity;

pub use cyclic::CyclicAllocator;
pub use full::FullAllocator;
pub use geometry::MaskGeometry;
pub use history::{Allocation, AllocationHistory};
pub use jittered::Jittered;
pub use mask::{AllocationMask, LayerMask};
pub use similarity::{Grouping, SimilarityAllocator};

use crate::{
    capacity::ClientCapacity,
    configs::{AllocationPolicy, Framework},
    error::{FlError, Result},
    seed::SeedTree,
};

/// Decides which slice of the global model a client trains in a round.
pub trait Allocator: Send + Sync {
    /// Computes the mask of `client` for `round`.
    ///
    /// # Arguments
    /// * `client` - The client's capacity.
    /// * `round` - The current round.
    /// * `history` - The masks of the previous round and those already handed out in this one.
    fn compute_mask(
        &self,
        client: &ClientCapacity,
        round: usize,
        history: &AllocationHistory,
    ) -> AllocationMask;
}

/// Builds the allocator of a framework and allocation policy pair.
///
/// # Arguments
/// * `framework` - The simulated framework.
/// * `policy` - The allocation policy.
/// * `geometry` - The window sizes of the run.
/// * `seeds` - The `allocation` stream of the run.
///
/// # Returns
/// The allocator or `UnsupportedAllocation` if the pair makes no sense.
pub fn build_allocator(
    framework: Framework,
    policy: AllocationPolicy,
    geometry: MaskGeometry,
    seeds: SeedTree,
) -> Result<Box<dyn Allocator>> {
    use AllocationPolicy::*;
    use Framework::*;

    let allocator: Box<dyn Allocator> = match (framework, policy) {
        (Local | Fedavg, Full) => Box::new(FullAllocator::new(geometry)),
        (Feddrop, Cyclic) => Box::new(Jittered::new(
            CyclicAllocator::new(geometry.clone()),
            geometry,
            seeds.child("jitter"),
        )),
        (Feddrop, Sim) => Box::new(Jittered::new(
            SimilarityAllocator::new(geometry.clone(), Grouping::PerTier, seeds.child("sim")),
            geometry,
            seeds.child("jitter"),
        )),
        (Fjord, Sim) => Box::new(SimilarityAllocator::new(geometry, Grouping::Shared, seeds)),
        (Pdhfl | Heterofl | Fjord, Cyclic) => Box::new(CyclicAllocator::new(geometry)),
        (Pdhfl | Heterofl, Sim) => Box::new(SimilarityAllocator::new(
            geometry,
            Grouping::PerTier,
            seeds,
        )),
        (framework, allocation) => {
            return Err(FlError::UnsupportedAllocation {
                framework,
                allocation,
            });
        }
    };

    Ok(allocator)
}
