use rand::{SeedableRng, rngs::StdRng};
use sha2::{Digest, Sha256};

/// A node of the seed derivation tree.
///
/// Every random stream of a run is a path from the root, e.g. `training/3/7` for the local
/// training of client 7 in round 3. Children are hashes of their parent, so adding a new
/// consumer never shifts the values drawn by an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeedTree([u8; 32]);

impl SeedTree {
    /// Creates the root of the tree for an experiment seed.
    pub fn new(seed: u64) -> Self {
        Self(sha256v(&[b"root", &seed.to_le_bytes()]))
    }

    /// Derives the named child stream.
    pub fn child(&self, label: &str) -> Self {
        Self(sha256v(&[&self.0, b"/", label.as_bytes()]))
    }

    /// Derives the `i`-th child stream, for per-round or per-client streams.
    pub fn index(&self, i: u64) -> Self {
        Self(sha256v(&[&self.0, b"#", &i.to_le_bytes()]))
    }

    /// Returns a fresh generator seeded with this node's material.
    pub fn rng(&self) -> StdRng {
        StdRng::from_seed(self.0)
    }

    pub fn material(&self) -> [u8; 32] {
        self.0
    }
}

fn sha256v(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();

    for val in data {
        hasher.update(val);
    }

    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn same_path_same_stream() {
        let a = SeedTree::new(42).child("training").index(3).index(7);
        let b = SeedTree::new(42).child("training").index(3).index(7);

        assert_eq!(a, b);
        assert_eq!(a.rng().random::<u64>(), b.rng().random::<u64>());
    }

    #[test]
    fn siblings_are_independent() {
        let root = SeedTree::new(42);

        assert_ne!(root.child("capacity"), root.child("selection"));
        assert_ne!(root.index(0), root.index(1));
        assert_ne!(root.child("0"), root.index(0));
        assert_ne!(SeedTree::new(42), SeedTree::new(43));
    }
}
