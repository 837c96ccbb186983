use machine_learning::{MlErr, dataset::Dataset};
use rand::{Rng, seq::SliceRandom};
use rand_distr::{Distribution, Normal, StandardNormal};

/// Class-conditional Gaussian data: every class has a random mean and its samples are that
/// mean plus isotropic noise.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSource {
    x_size: usize,
    classes: usize,
    noise: f32,
}

impl SyntheticSource {
    pub fn new(x_size: usize, classes: usize) -> Self {
        Self {
            x_size,
            classes,
            noise: 1.0,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise;
        self
    }

    /// Draws a train and a test set from the same class means.
    ///
    /// # Arguments
    /// * `train` - The amount of train samples.
    /// * `test` - The amount of test samples.
    /// * `rng` - The `data` stream of the run.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        train: usize,
        test: usize,
        rng: &mut R,
    ) -> Result<(Dataset, Dataset), MlErr> {
        let noise = Normal::new(0., self.noise).map_err(|e| MlErr::Init(e.to_string()))?;
        let means: Vec<f32> = (0..self.x_size * self.classes)
            .map(|_| StandardNormal.sample(rng))
            .collect();

        let train = self.sample(train, &means, &noise, rng)?;
        let test = self.sample(test, &means, &noise, rng)?;
        Ok((train, test))
    }

    fn sample<R: Rng + ?Sized>(
        &self,
        n: usize,
        means: &[f32],
        noise: &Normal<f32>,
        rng: &mut R,
    ) -> Result<Dataset, MlErr> {
        let mut labels: Vec<usize> = (0..n).map(|i| i % self.classes).collect();
        labels.shuffle(rng);

        let mut features = Vec::with_capacity(n * self.x_size);
        for &label in &labels {
            let mean = &means[label * self.x_size..(label + 1) * self.x_size];
            features.extend(mean.iter().map(|m| m + noise.sample(rng)));
        }

        Dataset::from_labels(&features, &labels, self.x_size, self.classes)
    }
}
