use std::{cell::RefCell, rc::Rc};

use machine_learning::{
    MlErr,
    dataset::Dataset,
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
    training::Evaluation,
};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    allocation::AllocationMask,
    configs::WeightInit,
    error::{FlError, Result},
    seed::SeedTree,
    submodel::{SubLayer, Submodel},
};

/// The shape of the global model: dense layers `input -> hidden.. -> classes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub input: usize,
    pub hidden: Vec<usize>,
    pub classes: usize,
}

impl Architecture {
    pub fn new(input: usize, hidden: Vec<usize>, classes: usize) -> Self {
        Self {
            input,
            hidden,
            classes,
        }
    }

    /// The amount of layers, the output one included.
    pub fn depth(&self) -> usize {
        self.hidden.len() + 1
    }

    /// The `(inputs, outputs)` of layer `l`.
    pub fn dims(&self, l: usize) -> (usize, usize) {
        let n = if l == 0 { self.input } else { self.hidden[l - 1] };
        let m = self.hidden.get(l).copied().unwrap_or(self.classes);
        (n, m)
    }

    /// The full width (output units) of every layer.
    pub fn widths(&self) -> Vec<usize> {
        (0..self.depth()).map(|l| self.dims(l).1).collect()
    }

    /// The amount of parameters of the whole model.
    pub fn size(&self) -> usize {
        (0..self.depth())
            .map(|l| {
                let (n, m) = self.dims(l);
                (n + 1) * m
            })
            .sum()
    }
}

/// The full width parameters of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

/// The shared model every client trains a slice of.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalModel {
    architecture: Architecture,
    layers: Vec<LayerParams>,
}

impl GlobalModel {
    /// Creates a new `GlobalModel` with random weights and zero biases.
    ///
    /// # Arguments
    /// * `architecture` - The shape of the model.
    /// * `init` - The weight distribution.
    /// * `seeds` - The `init` stream of the run.
    pub fn init(architecture: Architecture, init: WeightInit, seeds: &SeedTree) -> Result<Self> {
        let rng = Rc::new(RefCell::new(seeds.rng()));
        let mut param_gens: Vec<Box<dyn ParamGen>> = Vec::with_capacity(architecture.depth() * 2);

        for l in 0..architecture.depth() {
            let (n, m) = architecture.dims(l);
            let limit = n * m;

            let weights: Box<dyn ParamGen> = match init {
                WeightInit::Kaiming => Box::new(RandParamGen::kaiming(rng.clone(), limit, n)?),
                WeightInit::Xavier => {
                    Box::new(RandParamGen::xavier_uniform(rng.clone(), limit, n, m)?)
                }
                WeightInit::Lecun => Box::new(RandParamGen::lecun(rng.clone(), limit, n)?),
            };

            param_gens.push(weights);
            param_gens.push(Box::new(ConstParamGen::zeros(m)));
        }

        let params = ChainedParamGen::new(param_gens).take(architecture.size())?;
        Self::from_flat(architecture, &params)
    }

    /// Builds a model out of a flat buffer laid out as the backend does.
    pub fn from_flat(architecture: Architecture, params: &[f32]) -> Result<Self> {
        if params.len() != architecture.size() {
            return Err(MlErr::SizeMismatch {
                what: "global model parameters",
                got: params.len(),
                expected: architecture.size(),
            }
            .into());
        }

        let mut rest = params;
        let mut layers = Vec::with_capacity(architecture.depth());

        for l in 0..architecture.depth() {
            let (n, m) = architecture.dims(l);
            let (w, tail) = rest.split_at(n * m);
            let (b, tail) = tail.split_at(m);

            let weights = Array2::from_shape_vec((n, m), w.to_vec()).map_err(|_| {
                MlErr::InvalidShape {
                    what: "global weights",
                    rows: n,
                    cols: m,
                }
            })?;

            layers.push(LayerParams {
                weights,
                bias: Array1::from_vec(b.to_vec()),
            });
            rest = tail;
        }

        Ok(Self {
            architecture,
            layers,
        })
    }

    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [LayerParams] {
        &mut self.layers
    }

    /// Copies out the part of the model selected by `mask`.
    ///
    /// Layer `l` keeps the columns of its own mask and the rows of the previous kept layer's
    /// mask, the first layer keeps every input feature.
    ///
    /// # Arguments
    /// * `mask` - One mask per layer, skipped layers have empty masks.
    /// * `scale` - The hidden activation factor of the submodel.
    ///
    /// # Returns
    /// The submodel, or an error if the mask doesn't fit the architecture.
    pub fn extract(&self, mask: &AllocationMask, scale: f32) -> Result<Submodel> {
        let widths = self.architecture.widths();
        let masks = mask.layers();

        if masks.len() != widths.len() || masks.iter().zip(&widths).any(|(m, &w)| m.width() != w) {
            return Err(FlError::InvalidConfig(format!(
                "allocation mask of {} layers does not fit a model of widths {widths:?}",
                masks.len()
            )));
        }

        if masks.last().is_none_or(|m| m.is_empty()) {
            return Err(FlError::InvalidConfig(
                "allocation mask drops the output layer".into(),
            ));
        }

        let mut rows: Vec<usize> = (0..self.architecture.input).collect();
        let mut layers = Vec::with_capacity(masks.len());

        for (l, (params, mask)) in self.layers.iter().zip(masks).enumerate() {
            if mask.is_empty() {
                continue;
            }

            if rows.iter().any(|&r| r >= params.weights.nrows()) {
                return Err(FlError::InvalidConfig(format!(
                    "layer {l} can't read from a previous layer of different width"
                )));
            }

            let cols: Vec<usize> = mask.indices().collect();
            let weights = params.weights.select(Axis(0), &rows).select(Axis(1), &cols);
            let bias = params.bias.select(Axis(0), &cols);

            layers.push(SubLayer {
                layer: l,
                rows,
                cols: cols.clone(),
                weights,
                bias,
            });
            rows = cols;
        }

        Ok(Submodel::new(layers, scale))
    }

    /// Writes every value of `submodel` back to its global coordinates.
    pub fn absorb(&mut self, submodel: &Submodel) {
        for sub in submodel.layers() {
            let Some(params) = self.layers.get_mut(sub.layer) else {
                continue;
            };

            for (i, &r) in sub.rows.iter().enumerate() {
                for (j, &c) in sub.cols.iter().enumerate() {
                    params.weights[[r, c]] = sub.weights[[i, j]];
                }
            }

            for (j, &c) in sub.cols.iter().enumerate() {
                params.bias[c] = sub.bias[j];
            }
        }
    }

    /// Returns the first layer holding a non finite value, if any.
    pub fn first_non_finite(&self) -> Option<usize> {
        self.layers.iter().position(|l| {
            !l.weights
                .iter()
                .chain(l.bias.iter())
                .all(|v| v.is_finite())
        })
    }

    /// Evaluates the whole model.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let full = AllocationMask::full(&self.architecture.widths());
        Ok(self.extract(&full, 1.0)?.evaluate(dataset)?)
    }
}
