use rand_distr::{NormalError, uniform::Error as UniformError};

use crate::MlErr;

impl From<NormalError> for MlErr {
    fn from(value: NormalError) -> Self {
        Self::Init(value.to_string())
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::Init(value.to_string())
    }
}
