use crate::error::{ZarrError, ZarrResult};
use crate::types::{inverse_permutation, ZarrVectorValue};
use serde::{Deserialize, Serialize};

/// Axis-permutation codec. `order` must be a bijection over `0..rank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeCodec {
    pub order: Vec<usize>,
}

impl TransposeCodec {
    pub fn new(order: Vec<usize>) -> ZarrResult<Self> {
        let codec = Self { order };
        codec.validate()?;
        Ok(codec)
    }

    /// Check that `order` is a permutation of `0..order.len()`.
    pub fn validate(&self) -> ZarrResult<()> {
        let mut seen = vec![false; self.order.len()];
        for &axis in &self.order {
            if axis >= self.order.len() || seen[axis] {
                return Err(ZarrError::InvalidConfiguration(format!(
                    "Transpose order {:?} is not a permutation of 0..{}",
                    self.order,
                    self.order.len()
                )));
            }
            seen[axis] = true;
        }
        Ok(())
    }

    pub fn validate_rank(&self, rank: usize) -> ZarrResult<()> {
        if self.order.len() != rank {
            return Err(ZarrError::InvalidConfiguration(format!(
                "Transpose order {:?} does not cover an array of rank {rank}",
                self.order
            )));
        }
        Ok(())
    }

    /// Shape of the encoded array given the decoded shape.
    pub fn transform_shape(&self, shape: &[usize]) -> Vec<usize> {
        self.order.iter().map(|&d| shape[d]).collect()
    }

    /// Reorder shape and element order according to the permutation.
    pub fn encode(
        &self,
        data: ZarrVectorValue,
        shape: &[usize],
    ) -> ZarrResult<(ZarrVectorValue, Vec<usize>)> {
        self.validate_rank(shape.len())?;
        let permuted = data.permuted(shape, &self.order);
        Ok((permuted, self.transform_shape(shape)))
    }

    /// Apply the inverse permutation. `shape` is the decoded (original) shape.
    pub fn decode(
        &self,
        data: ZarrVectorValue,
        shape: &[usize],
    ) -> ZarrResult<(ZarrVectorValue, Vec<usize>)> {
        self.validate_rank(shape.len())?;
        let encoded_shape = self.transform_shape(shape);
        let restored = data.permuted(&encoded_shape, &inverse_permutation(&self.order));
        Ok((restored, shape.to_vec()))
    }
}
