use burn::{
    prelude::*,
    tensor::{backend::Backend, BasicOps},
};

use crate::{batch::split_batch, error::BatchError};

/// A value with a leading batch dimension that can be tiled along it.
///
/// Implemented for every burn tensor (any rank, any kind) and for
/// [`TensorDict`](crate::tensor::TensorDict). The batch transforms in
/// [`batch`](crate::batch) are written against this trait only.
pub trait BatchLayout: Sized {
    /// Size of the leading (batch) dimension.
    fn batch_size(&self) -> usize;

    /// Tiles the value `repeats` times along the batch dimension.
    ///
    /// Element `r * n + b` of the result equals element `b` of the input,
    /// where `n` is the input batch size. The result owns fresh storage.
    fn repeat_batch(self, repeats: usize) -> Self;
}

/// Inverse layout of [`BatchLayout::repeat_batch`], producing `Out`.
///
/// Every level splits the leading dimension into `(repeats, n / repeats)`
/// and swaps the two axes, so the value gains one axis per level.
pub trait Regroup<Out>: BatchLayout {
    /// Applies `levels` in order. All factors are positive.
    fn regroup(self, levels: &[usize]) -> Result<Out, BatchError>;
}

impl<B, const D: usize, K> BatchLayout for Tensor<B, D, K>
where
    B: Backend,
    K: BasicOps<B>,
{
    fn batch_size(&self) -> usize {
        self.dims()[0]
    }

    fn repeat_batch(self, repeats: usize) -> Self {
        self.repeat_dim(0, repeats)
    }
}

impl<B, const D: usize, const D2: usize, K> Regroup<Tensor<B, D2, K>> for Tensor<B, D, K>
where
    B: Backend,
    K: BasicOps<B>,
{
    fn regroup(self, levels: &[usize]) -> Result<Tensor<B, D2, K>, BatchError> {
        let k = levels.len();
        if D + k != D2 {
            return Err(BatchError::RankMismatch {
                expected: D + k,
                actual: D2,
            });
        }
        split_batch(self.batch_size(), levels)?;

        // Work at the final rank from the start: the input sits behind `k`
        // leading unit axes, and each level turns one of them into the
        // replication axis.
        let mut dims = [1usize; D2];
        dims[k..].copy_from_slice(&self.dims());
        let mut x: Tensor<B, D2, K> = self.reshape(dims);

        for (level, &repeats) in levels.iter().enumerate() {
            let lead = k - level;
            dims[lead - 1] = repeats;
            dims[lead] /= repeats;
            x = x.reshape(dims).swap_dims(lead - 1, lead);
            dims.swap(lead - 1, lead);
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_repeat_batch_layout() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 2>::from_data([[1.0, 2.0], [3.0, 4.0]], &device);

        let repeated = x.repeat_batch(3);

        assert_eq!(repeated.dims(), [6, 2]);
        assert_eq!(
            repeated.into_data().to_vec::<f32>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_regroup_single_level() {
        let device = NdArrayDevice::default();
        // Starts laid out as [r * n + b] with n = 2, r = 3.
        let x = Tensor::<NdArray, 1, Int>::from_data([0, 100, 1, 101, 2, 102], &device);

        let grouped: Tensor<NdArray, 2, Int> = x.regroup(&[3]).unwrap();

        assert_eq!(grouped.dims(), [2, 3]);
        assert_eq!(
            grouped.into_data().to_vec::<i64>().unwrap(),
            vec![0, 1, 2, 100, 101, 102]
        );
    }

    #[test]
    fn test_regroup_rank_mismatch() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 2>::zeros([4, 3], &device);

        let result: Result<Tensor<NdArray, 4>, _> = x.regroup(&[2]);

        assert_eq!(
            result.unwrap_err(),
            BatchError::RankMismatch {
                expected: 3,
                actual: 4
            }
        );
    }

    #[test]
    fn test_regroup_without_levels_is_identity() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 2>::from_data([[1.0, 2.0], [3.0, 4.0]], &device);

        let same: Tensor<NdArray, 2> = x.clone().regroup(&[]).unwrap();

        assert_eq!(same.dims(), [2, 2]);
        assert_eq!(
            same.into_data().to_vec::<f32>().unwrap(),
            x.into_data().to_vec::<f32>().unwrap()
        );
    }
}
