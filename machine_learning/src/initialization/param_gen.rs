use crate::{MlErr, Result};

/// A source of initial parameter values, handing out at most a fixed amount of them.
pub trait ParamGen {
    /// Samples up to `n` parameters.
    ///
    /// # Returns
    /// Fewer than `n` values when close to exhaustion, `None` once exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Samples exactly `n` parameters, pulling until enough were handed out.
    ///
    /// # Returns
    /// A `SizeMismatch` error if the generator runs dry first.
    fn take(&mut self, n: usize) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(n);

        while out.len() < n {
            match self.sample(n - out.len()) {
                Some(values) if !values.is_empty() => out.extend(values),
                _ => {
                    return Err(MlErr::SizeMismatch {
                        what: "initial parameters",
                        got: out.len(),
                        expected: n,
                    });
                }
            }
        }

        Ok(out)
    }
}
