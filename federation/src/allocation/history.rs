use std::mem;

use super::AllocationMask;
use crate::capacity::ClientCapacity;

/// A mask handed out to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub client: usize,
    pub tier: usize,
    pub mask: AllocationMask,
}

/// The allocations of the previous round and of the current one so far.
///
/// This is the only allocation state that outlives a round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationHistory {
    previous: Vec<Allocation>,
    current: Vec<Allocation>,
}

impl AllocationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the current round's allocations to the previous round.
    pub fn begin_round(&mut self) {
        self.previous = mem::take(&mut self.current);
    }

    /// Records the mask handed out to `client` in the current round.
    pub fn record(&mut self, client: &ClientCapacity, mask: AllocationMask) {
        self.current.push(Allocation {
            client: client.client,
            tier: client.tier,
            mask,
        });
    }

    pub fn previous(&self) -> &[Allocation] {
        &self.previous
    }

    pub fn current(&self) -> &[Allocation] {
        &self.current
    }

    /// Returns the mask `client` received in the current round.
    pub fn mask_of(&self, client: usize) -> Option<&AllocationMask> {
        self.current
            .iter()
            .find(|a| a.client == client)
            .map(|a| &a.mask)
    }
}
