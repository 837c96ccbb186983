use machine_learning::{
    MlErr,
    arch::{Sequential, activations::ActFn, layers::Layer, loss::CrossEntropy},
    dataset::Dataset,
    training::{Evaluation, evaluate},
};
use ndarray::{Array1, Array2};

/// The slice of one global layer a client trains: `weights[i][j]` is the global weight at
/// `(rows[i], cols[j])` and `bias[j]` the global bias at `cols[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubLayer {
    pub layer: usize,
    pub rows: Vec<usize>,
    pub cols: Vec<usize>,
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl SubLayer {
    pub fn size(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// An independent copy of the part of the global model a client received. Layers skipped
/// by depth are absent, the last sublayer is always the output layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Submodel {
    layers: Vec<SubLayer>,
    scale: f32,
}

impl Submodel {
    /// Creates a new `Submodel`.
    ///
    /// # Arguments
    /// * `layers` - The kept layers, in order.
    /// * `scale` - The factor applied to hidden activations while training.
    pub fn new(layers: Vec<SubLayer>, scale: f32) -> Self {
        Self { layers, scale }
    }

    pub fn layers(&self) -> &[SubLayer] {
        &self.layers
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// The amount of trainable parameters.
    pub fn size(&self) -> usize {
        self.layers.iter().map(SubLayer::size).sum()
    }

    /// The `(inputs, outputs)` of every kept layer.
    pub fn dims(&self) -> Vec<(usize, usize)> {
        self.layers
            .iter()
            .map(|l| (l.rows.len(), l.cols.len()))
            .collect()
    }

    /// Flattens the parameters in the backend layout: per layer, row-major weights followed
    /// by biases.
    pub fn to_params(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.size());

        for layer in &self.layers {
            params.extend(layer.weights.iter());
            params.extend(layer.bias.iter());
        }

        params
    }

    /// Overwrites the parameters with a flat buffer laid out as `to_params` does.
    pub fn load_params(&mut self, params: &[f32]) -> Result<(), MlErr> {
        if params.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "submodel parameters",
                got: params.len(),
                expected: self.size(),
            });
        }

        let mut rest = params;

        for layer in &mut self.layers {
            let (w, tail) = rest.split_at(layer.weights.len());
            let (b, tail) = tail.split_at(layer.bias.len());

            layer
                .weights
                .iter_mut()
                .zip(w)
                .for_each(|(dst, &src)| *dst = src);
            layer
                .bias
                .iter_mut()
                .zip(b)
                .for_each(|(dst, &src)| *dst = src);

            rest = tail;
        }

        Ok(())
    }

    pub fn is_finite(&self) -> bool {
        self.layers
            .iter()
            .all(|l| l.weights.iter().chain(l.bias.iter()).all(|v| v.is_finite()))
    }

    /// Builds the backend network used to train this submodel: ReLU hidden layers followed
    /// by the scaling layer when `scale != 1`, and a linear output producing logits.
    pub fn training_network(&self) -> Sequential {
        network(&self.dims(), self.scale)
    }

    /// Evaluates the submodel as deployed, without the training time scaling.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation, MlErr> {
        let mut model = network(&self.dims(), 1.0);
        evaluate(&mut model, &self.to_params(), dataset, &CrossEntropy)
    }
}

fn network(dims: &[(usize, usize)], scale: f32) -> Sequential {
    let last = dims.len().saturating_sub(1);
    let mut layers = Vec::with_capacity(dims.len() * 2);

    for (i, &dim) in dims.iter().enumerate() {
        if i == last {
            layers.push(Layer::dense(dim, None));
            continue;
        }

        layers.push(Layer::dense(dim, Some(ActFn::relu())));

        if scale != 1.0 {
            layers.push(Layer::scale(scale));
        }
    }

    Sequential::new(layers)
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::Model;
    use ndarray::{Array, array};

    use super::*;

    fn two_layers() -> Submodel {
        Submodel::new(
            vec![
                SubLayer {
                    layer: 0,
                    rows: vec![0, 1],
                    cols: vec![3],
                    weights: array![[1.], [2.]],
                    bias: array![0.5],
                },
                SubLayer {
                    layer: 1,
                    rows: vec![3],
                    cols: vec![0, 1],
                    weights: array![[3., 4.]],
                    bias: array![5., 6.],
                },
            ],
            2.0,
        )
    }

    #[test]
    fn params_follow_the_backend_layout() {
        let mut sub = two_layers();
        assert_eq!(sub.to_params(), [1., 2., 0.5, 3., 4., 5., 6.]);

        let params: Vec<f32> = (0..7).map(|i| i as f32).collect();
        sub.load_params(&params).unwrap();
        assert_eq!(sub.layers()[1].weights, array![[3., 4.]]);
        assert_eq!(sub.layers()[1].bias, array![5., 6.]);

        assert!(sub.load_params(&params[1..]).is_err());
    }

    #[test]
    fn training_network_scales_hidden_activations() {
        let sub = two_layers();
        let mut train = sub.training_network();
        let mut deployed = network(&sub.dims(), 1.0);
        let x = Array::from_shape_vec((1, 2), vec![1., 1.]).unwrap();

        assert_eq!(train.size(), sub.size());

        // hidden = relu(1 + 2 + 0.5) = 3.5
        let y = deployed.forward(&sub.to_params(), x.view()).unwrap();
        assert_eq!(y, array![[3.5 * 3. + 5., 3.5 * 4. + 6.]]);

        let y = train.forward(&sub.to_params(), x.view()).unwrap();
        assert_eq!(y, array![[7. * 3. + 5., 7. * 4. + 6.]]);
    }

    #[test]
    fn non_finite_values_are_detected() {
        let mut sub = two_layers();
        assert!(sub.is_finite());

        sub.load_params(&[0., 0., f32::NAN, 0., 0., 0., 0.]).unwrap();
        assert!(!sub.is_finite());
    }
}
