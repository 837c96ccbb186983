use super::{AllocationMask, LayerMask};
use crate::{capacity::ClientCapacity, model::Architecture};

// Absorbs the f32 rounding of fractions such as 0.7 * 100.
const EPS: f64 = 1e-4;

/// Maps client capacities to window sizes over the model's layers.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskGeometry {
    widths: Vec<usize>,
    strides: Vec<usize>,
}

impl MaskGeometry {
    /// Creates a new `MaskGeometry`.
    ///
    /// # Arguments
    /// * `architecture` - The global model's shape.
    /// * `stride_fraction` - The fraction of each layer's width a window moves per step.
    pub fn new(architecture: &Architecture, stride_fraction: f32) -> Self {
        let widths = architecture.widths();
        let strides = widths
            .iter()
            .map(|&w| ((stride_fraction as f64 * w as f64).round() as usize).max(1))
            .collect();

        Self { widths, strides }
    }

    pub fn widths(&self) -> &[usize] {
        &self.widths
    }

    pub fn depth(&self) -> usize {
        self.widths.len()
    }

    pub fn stride(&self, l: usize) -> usize {
        self.strides[l]
    }

    /// The amount of distinct stride aligned offsets of layer `l`.
    pub fn steps(&self, l: usize) -> usize {
        self.widths[l].div_ceil(self.strides[l])
    }

    pub fn is_output(&self, l: usize) -> bool {
        l + 1 == self.widths.len()
    }

    /// The window length of a `fraction` of `width` units, at least one unit.
    pub fn window_len(fraction: f32, width: usize) -> usize {
        let len = (fraction as f64 * width as f64 + EPS).floor() as usize;
        len.clamp(1, width.max(1))
    }

    /// The amount of hidden layers kept by a client of the given depth fraction.
    pub fn kept_hidden(&self, depth: f32) -> usize {
        let hidden = self.widths.len() - 1;
        let kept = (depth as f64 * hidden as f64 - EPS).ceil() as usize;
        kept.clamp(1.min(hidden), hidden)
    }

    /// Whether `client` receives layer `l` at all.
    pub fn keeps(&self, client: &ClientCapacity, l: usize) -> bool {
        self.is_output(l) || l < self.kept_hidden(client.depth)
    }

    /// The window length `client` gets on layer `l`, zero for skipped layers.
    pub fn len(&self, client: &ClientCapacity, l: usize) -> usize {
        if !self.keeps(client, l) {
            0
        } else if self.is_output(l) {
            self.widths[l]
        } else {
            Self::window_len(client.width, self.widths[l])
        }
    }

    /// Builds the client's mask, placing each hidden window at `offset(l)`.
    pub fn mask<F>(&self, client: &ClientCapacity, mut offset: F) -> AllocationMask
    where
        F: FnMut(usize) -> usize,
    {
        let layers = (0..self.depth())
            .map(|l| {
                let width = self.widths[l];
                match self.len(client, l) {
                    0 => LayerMask::empty(width),
                    len if len == width => LayerMask::full(width),
                    len => LayerMask::window(width, offset(l), len),
                }
            })
            .collect();

        AllocationMask::new(layers)
    }

    /// The canonical mask of `client`: every window starts at unit 0.
    pub fn prefix(&self, client: &ClientCapacity) -> AllocationMask {
        self.mask(client, |_| 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(width: f32, depth: f32) -> ClientCapacity {
        ClientCapacity {
            client: 0,
            tier: 0,
            width,
            depth,
        }
    }

    #[test]
    fn window_len_floors_with_tolerance() {
        assert_eq!(MaskGeometry::window_len(0.3, 100), 30);
        assert_eq!(MaskGeometry::window_len(0.6, 100), 60);
        assert_eq!(MaskGeometry::window_len(0.5, 7), 3);
        assert_eq!(MaskGeometry::window_len(0.01, 10), 1);
        assert_eq!(MaskGeometry::window_len(1.0, 10), 10);
    }

    #[test]
    fn strides_round_to_at_least_one() {
        let geometry = MaskGeometry::new(&Architecture::new(4, vec![100, 5], 3), 0.1);

        assert_eq!(geometry.stride(0), 10);
        assert_eq!(geometry.stride(1), 1);
        assert_eq!(geometry.steps(0), 10);
    }

    #[test]
    fn depth_keeps_leading_hidden_layers() {
        let geometry = MaskGeometry::new(&Architecture::new(4, vec![10, 10, 10], 3), 0.1);

        assert_eq!(geometry.kept_hidden(0.3), 1);
        assert_eq!(geometry.kept_hidden(0.5), 2);
        assert_eq!(geometry.kept_hidden(2. / 3.), 2);
        assert_eq!(geometry.kept_hidden(1.0), 3);

        let mask = geometry.prefix(&client(0.5, 0.3));
        let lens: Vec<usize> = mask.layers().iter().map(LayerMask::len).collect();
        assert_eq!(lens, [5, 0, 0, 3]);
    }
}
