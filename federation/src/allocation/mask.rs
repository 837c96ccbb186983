use serde::{Deserialize, Serialize};

/// The units of one layer a client receives: a contiguous window of `len` units starting at
/// `offset`, wrapping around the layer's width.
///
/// Only windows exist, a mask can't describe an arbitrary scatter of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMask {
    width: usize,
    offset: usize,
    len: usize,
}

impl LayerMask {
    pub fn full(width: usize) -> Self {
        Self {
            width,
            offset: 0,
            len: width,
        }
    }

    /// The mask of a layer the client skips.
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            offset: 0,
            len: 0,
        }
    }

    /// Creates a window of `len` units starting at `offset`, both taken modulo the width.
    pub fn window(width: usize, offset: usize, len: usize) -> Self {
        let len = len.min(width);

        if len == width || width == 0 {
            return Self::full(width);
        }

        Self {
            width,
            offset: offset % width,
            len,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.width
    }

    /// The covered units, in window order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        (self.offset..self.offset + self.len).map(|i| i % self.width)
    }

    pub fn contains(&self, unit: usize) -> bool {
        unit < self.width && (unit + self.width - self.offset) % self.width < self.len
    }

    /// Moves the window `shift` units forward.
    pub fn rotate(&self, shift: usize) -> Self {
        if self.is_empty() || self.is_full() {
            return *self;
        }

        Self::window(self.width, self.offset + shift, self.len)
    }
}

/// What a client receives from the global model in one round: one `LayerMask` per layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationMask {
    layers: Vec<LayerMask>,
}

impl AllocationMask {
    pub fn new(layers: Vec<LayerMask>) -> Self {
        Self { layers }
    }

    /// The whole model.
    pub fn full(widths: &[usize]) -> Self {
        Self::new(widths.iter().map(|&w| LayerMask::full(w)).collect())
    }

    pub fn layers(&self) -> &[LayerMask] {
        &self.layers
    }

    pub fn layer(&self, l: usize) -> Option<&LayerMask> {
        self.layers.get(l)
    }

    /// The amount of units received over all layers.
    pub fn units(&self) -> usize {
        self.layers.iter().map(LayerMask::len).sum()
    }

    /// Applies `f` to every mask, building a new allocation.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: FnMut((usize, &LayerMask)) -> LayerMask,
    {
        Self::new(self.layers.iter().enumerate().map(f).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_wraps_around() {
        let mask = LayerMask::window(10, 8, 4);

        assert_eq!(mask.indices().collect::<Vec<_>>(), [8, 9, 0, 1]);
        assert!(mask.contains(0) && mask.contains(9));
        assert!(!mask.contains(2) && !mask.contains(7));
    }

    #[test]
    fn full_windows_are_canonical() {
        assert_eq!(LayerMask::window(10, 3, 10), LayerMask::full(10));
        assert_eq!(LayerMask::window(10, 3, 12), LayerMask::full(10));
        assert_eq!(LayerMask::full(10).rotate(4), LayerMask::full(10));
    }

    #[test]
    fn rotate_keeps_the_length() {
        let mask = LayerMask::window(10, 6, 3).rotate(5);

        assert_eq!(mask.offset(), 1);
        assert_eq!(mask.len(), 3);
        assert_eq!(LayerMask::empty(10).rotate(5), LayerMask::empty(10));
    }
}
