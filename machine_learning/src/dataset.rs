use std::num::NonZeroUsize;

use ndarray::{ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use crate::{MlErr, Result};

/// An in-memory dataset stored row-major as `[x | y]` rows of `x_size + y_size` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    data: Vec<f32>,
    x_size: usize,
    y_size: usize,
    len: usize,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `data` - The flat rows of the dataset.
    /// * `x_size` - The amount of input values per row.
    /// * `y_size` - The amount of expected output values per row.
    ///
    /// # Returns
    /// A new `Dataset` or an error if `data` can't be split in whole rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let row = x_size + y_size;

        if x_size == 0 || y_size == 0 || data.len() % row != 0 {
            return Err(MlErr::InvalidShape {
                what: "dataset",
                rows: data.len() / row.max(1),
                cols: row,
            });
        }

        Ok(Self {
            len: data.len() / row,
            data,
            x_size,
            y_size,
        })
    }

    /// Creates a classification `Dataset` from features and class labels, one-hot encoding the
    /// labels.
    ///
    /// # Arguments
    /// * `features` - The flat features, `x_size` per sample.
    /// * `labels` - The class of each sample.
    /// * `x_size` - The amount of features per sample.
    /// * `classes` - The amount of classes.
    pub fn from_labels(
        features: &[f32],
        labels: &[usize],
        x_size: usize,
        classes: usize,
    ) -> Result<Self> {
        if features.len() != labels.len() * x_size {
            return Err(MlErr::SizeMismatch {
                what: "features",
                got: features.len(),
                expected: labels.len() * x_size,
            });
        }

        let mut data = Vec::with_capacity(labels.len() * (x_size + classes));

        for (x, &label) in features.chunks(x_size.max(1)).zip(labels) {
            if label >= classes {
                return Err(MlErr::SizeMismatch {
                    what: "label",
                    got: label,
                    expected: classes,
                });
            }

            data.extend_from_slice(x);
            data.extend((0..classes).map(|c| (c == label) as u8 as f32));
        }

        Self::new(data, x_size, classes)
    }

    /// Returns the amount of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    /// Returns the class of every sample, that is, the position of the largest expected output.
    pub fn labels(&self) -> Vec<usize> {
        self.data
            .chunks(self.x_size + self.y_size)
            .map(|row| {
                row[self.x_size..]
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }

    /// Builds a new dataset with the given rows, in the given order.
    ///
    /// # Arguments
    /// * `indices` - The rows to keep.
    ///
    /// # Returns
    /// The subset or an error if any index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let row = self.x_size + self.y_size;
        let mut data = Vec::with_capacity(indices.len() * row);

        for &i in indices {
            if i >= self.len {
                return Err(MlErr::SizeMismatch {
                    what: "row index",
                    got: i,
                    expected: self.len,
                });
            }

            data.extend_from_slice(&self.data[i * row..(i + 1) * row]);
        }

        Ok(Self {
            data,
            x_size: self.x_size,
            y_size: self.y_size,
            len: indices.len(),
        })
    }

    /// Shuffles the rows of the dataset in place.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let row = self.x_size + self.y_size;
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(rng);

        let mut data = Vec::with_capacity(self.data.len());
        for i in order {
            data.extend_from_slice(&self.data[i * row..(i + 1) * row]);
        }

        self.data = data;
    }

    /// Views the whole dataset as an `(x, y)` pair of matrices.
    pub fn view(&self) -> Result<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        Ok(self.matrix()?.split_at(Axis(1), self.x_size))
    }

    /// Splits the dataset in consecutive batches, the last one might be smaller.
    ///
    /// # Arguments
    /// * `batch_size` - The maximum amount of rows per batch.
    ///
    /// # Returns
    /// An iterator of `(x, y)` batches.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> Result<impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)>> {
        let full = self.matrix()?;
        let rows = self.len;
        let size = batch_size.get();
        let x_size = self.x_size;

        let batches = (0..rows.div_ceil(size)).map(move |i| {
            let start = i * size;
            let end = (start + size).min(rows);
            full.slice_move(s![start..end, ..]).split_at(Axis(1), x_size)
        });

        Ok(batches)
    }

    fn matrix(&self) -> Result<ArrayView2<'_, f32>> {
        let cols = self.x_size + self.y_size;

        ArrayView2::from_shape((self.len, cols), &self.data).map_err(|_| MlErr::InvalidShape {
            what: "dataset",
            rows: self.len,
            cols,
        })
    }
}
