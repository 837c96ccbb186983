use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::{allocation::AllocationMask, model::GlobalModel, training::ClientUpdate};

/// How many clients received every unit of every layer in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageCount {
    layers: Vec<Vec<u32>>,
}

impl CoverageCount {
    /// Counts the clients covering each unit.
    ///
    /// # Arguments
    /// * `widths` - The full width of every layer.
    /// * `masks` - The masks handed out in the round.
    pub fn from_masks<'a, I>(widths: &[usize], masks: I) -> Self
    where
        I: IntoIterator<Item = &'a AllocationMask>,
    {
        let mut layers: Vec<Vec<u32>> = widths.iter().map(|&w| vec![0; w]).collect();

        for mask in masks {
            for (counts, layer) in layers.iter_mut().zip(mask.layers()) {
                for unit in layer.indices() {
                    counts[unit] += 1;
                }
            }
        }

        Self { layers }
    }

    pub fn layer(&self, l: usize) -> &[u32] {
        &self.layers[l]
    }

    /// The amount of units nobody received.
    pub fn uncovered(&self) -> usize {
        self.layers.iter().flatten().filter(|&&c| c == 0).count()
    }
}

/// What an aggregation did to the global model.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationReport {
    pub contributors: usize,
    /// Parameters left untouched because no update covered them.
    pub uncovered_params: usize,
    pub coverage: CoverageCount,
}

struct Accumulator {
    weights: Array2<f64>,
    weights_norm: Array2<f64>,
    bias: Array1<f64>,
    bias_norm: Array1<f64>,
}

/// Merges the round's updates into the global model.
///
/// Every parameter becomes the weighted mean of the updates covering it, each update weighing
/// its client's amount of samples. Parameters no update covers keep their value.
///
/// # Arguments
/// * `model` - The global model, mutated in place.
/// * `updates` - The non diverged updates of the round.
///
/// # Returns
/// The coverage of the round.
pub fn aggregate(model: &mut GlobalModel, updates: &[ClientUpdate]) -> AggregationReport {
    let contributing = || updates.iter().filter(|u| u.weight > 0.0);
    let widths = model.architecture().widths();
    let coverage = CoverageCount::from_masks(&widths, contributing().map(|u| &u.mask));

    let mut accs: Vec<Accumulator> = model
        .layers()
        .iter()
        .map(|l| Accumulator {
            weights: Array2::zeros(l.weights.raw_dim()),
            weights_norm: Array2::zeros(l.weights.raw_dim()),
            bias: Array1::zeros(l.bias.raw_dim()),
            bias_norm: Array1::zeros(l.bias.raw_dim()),
        })
        .collect();

    let mut contributors = 0;

    for update in contributing() {
        contributors += 1;
        let w = update.weight;

        for sub in update.submodel.layers() {
            let Some(acc) = accs.get_mut(sub.layer) else {
                continue;
            };

            for (i, &r) in sub.rows.iter().enumerate() {
                for (j, &c) in sub.cols.iter().enumerate() {
                    acc.weights[[r, c]] += w * sub.weights[[i, j]] as f64;
                    acc.weights_norm[[r, c]] += w;
                }
            }

            for (j, &c) in sub.cols.iter().enumerate() {
                acc.bias[c] += w * sub.bias[j] as f64;
                acc.bias_norm[c] += w;
            }
        }
    }

    let mut uncovered_params = 0;

    for (params, acc) in model.layers_mut().iter_mut().zip(&accs) {
        Zip::from(&mut params.weights)
            .and(&acc.weights)
            .and(&acc.weights_norm)
            .for_each(|p, &sum, &norm| merge(p, sum, norm, &mut uncovered_params));

        Zip::from(&mut params.bias)
            .and(&acc.bias)
            .and(&acc.bias_norm)
            .for_each(|p, &sum, &norm| merge(p, sum, norm, &mut uncovered_params));
    }

    AggregationReport {
        contributors,
        uncovered_params,
        coverage,
    }
}

fn merge(param: &mut f32, sum: f64, norm: f64, uncovered: &mut usize) {
    if norm > 0.0 {
        *param = (sum / norm) as f32;
    } else {
        *uncovered += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{allocation::LayerMask, model::Architecture};

    fn model(value: f32) -> GlobalModel {
        let arch = Architecture::new(1, vec![4], 1);
        GlobalModel::from_flat(arch.clone(), &vec![value; arch.size()]).unwrap()
    }

    fn update(global: &GlobalModel, mask: AllocationMask, value: f32, weight: f64) -> ClientUpdate {
        let mut submodel = global.extract(&mask, 1.0).unwrap();
        let params = vec![value; submodel.size()];
        submodel.load_params(&params).unwrap();

        ClientUpdate {
            client: 0,
            round: 0,
            mask,
            submodel,
            weight,
            loss: 0.0,
        }
    }

    #[test]
    fn overlapping_windows_average_by_weight() {
        let mut global = model(0.0);
        let a = AllocationMask::new(vec![LayerMask::window(4, 0, 2), LayerMask::full(1)]);
        let b = AllocationMask::new(vec![LayerMask::window(4, 1, 2), LayerMask::full(1)]);
        let updates = [update(&global, a, 1.0, 1.0), update(&global, b, 4.0, 3.0)];

        let report = aggregate(&mut global, &updates);
        let hidden = &global.layers()[0];

        assert_eq!(hidden.bias.to_vec(), [1.0, 13.0 / 4.0, 4.0, 0.0]);
        assert_eq!(report.coverage.layer(0), [1, 2, 1, 0]);
        assert_eq!(report.coverage.uncovered(), 1);
        // unit 3: its input weight, its bias and its output weight
        assert_eq!(report.uncovered_params, 3);
        assert_eq!(report.contributors, 2);
    }

    #[test]
    fn zero_weight_updates_do_not_count() {
        let mut global = model(2.0);
        let full = AllocationMask::full(&[4, 1]);
        let updates = [update(&global, full, 9.0, 0.0)];

        let report = aggregate(&mut global, &updates);

        assert_eq!(global, model(2.0));
        assert_eq!(report.contributors, 0);
        assert_eq!(report.coverage.uncovered(), 4 + 1);
    }

    #[test]
    fn coverage_counts_each_client_once() {
        let masks = [
            AllocationMask::new(vec![LayerMask::window(4, 3, 2)]),
            AllocationMask::new(vec![LayerMask::full(4)]),
        ];

        let coverage = CoverageCount::from_masks(&[4], &masks);
        assert_eq!(coverage.layer(0), [2, 1, 1, 2]);
    }
}
