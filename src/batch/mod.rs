//! Multi-start batch replication
//!
//! A multi-start rollout runs several independent trajectories ("starts") for
//! every problem instance. Instead of looping over starts, the instance batch
//! is tiled along its leading dimension so one policy forward pass serves all
//! starts at once, and the per-start results are regrouped by instance when
//! the loss is aggregated.
//!
//! # Layout
//!
//! For a batch of `n` instances tiled `R` times, start `r` of instance `b`
//! lives at row `r * n + b`:
//!
//! ```text
//! batchify([a, b], 3)   -> [a, b, a, b, a, b]
//! unbatchify(.., 3)     -> [[a, a, a], [b, b, b]]   shape (n, R, ...)
//! ```
//!
//! # Repeat specifications
//!
//! A [`RepeatSpec`] is one factor or a sequence of nested factors. The
//! sequence is processed from its last element to its first, by both
//! [`batchify`] and [`unbatchify`]. A zero factor is skipped; a negative one
//! is rejected with [`BatchError::InvalidSpec`].
//!
//! # Usage Example
//!
//! ```ignore
//! use multistart::batch::{batchify, unbatchify};
//!
//! // [batch, nodes, 2] -> [batch * starts, nodes, 2]
//! let locs = batchify(locs, starts)?;
//! let log_likelihood: Tensor<B, 1> = policy.rollout(locs);
//!
//! // [batch * starts] -> [batch, starts]
//! let per_instance: Tensor<B, 2> = unbatchify(log_likelihood, starts)?;
//! let advantage = rewards.clone() - rewards.mean_dim(1);
//! ```

use crate::{
    error::BatchError,
    traits::{BatchLayout, Regroup},
};

/// Replication factors, applied last-to-first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepeatSpec(Vec<i64>);

impl RepeatSpec {
    pub fn new(factors: impl Into<Vec<i64>>) -> Self {
        Self(factors.into())
    }

    /// Factors as given, in declaration order.
    pub fn factors(&self) -> &[i64] {
        &self.0
    }

    /// Positive factors in processing order (reversed, zeros dropped).
    pub fn levels(&self) -> Result<Vec<usize>, BatchError> {
        let mut levels = Vec::with_capacity(self.0.len());
        for &factor in self.0.iter().rev() {
            if factor < 0 {
                return Err(BatchError::InvalidSpec { factor });
            }
            if factor > 0 {
                levels.push(factor as usize);
            }
        }
        Ok(levels)
    }

    /// How many times the batch grows under [`batchify`].
    pub fn expansion(&self) -> Result<usize, BatchError> {
        Ok(self.levels()?.iter().product())
    }
}

impl From<i64> for RepeatSpec {
    fn from(factor: i64) -> Self {
        Self(vec![factor])
    }
}

impl From<Vec<i64>> for RepeatSpec {
    fn from(factors: Vec<i64>) -> Self {
        Self(factors)
    }
}

impl From<&[i64]> for RepeatSpec {
    fn from(factors: &[i64]) -> Self {
        Self(factors.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for RepeatSpec {
    fn from(factors: [i64; N]) -> Self {
        Self(factors.to_vec())
    }
}

/// Tiles `x` along its batch dimension according to `spec`.
///
/// The leading dimension of the result is `n * spec.expansion()`; every
/// other dimension is unchanged. The spec is validated before any work.
pub fn batchify<T: BatchLayout>(x: T, spec: impl Into<RepeatSpec>) -> Result<T, BatchError> {
    let levels = spec.into().levels()?;
    Ok(levels.into_iter().fold(x, |x, repeats| x.repeat_batch(repeats)))
}

/// Regroups a batchified value so each instance's starts become adjacent.
///
/// Every positive level of `spec` turns the leading dimension `R * n` into
/// two axes `(n, R)`. With a single factor, `unbatchify(batchify(x, R), R)`
/// has shape `(n, R, ...)` and its entry `[b, r]` equals `x[b]`.
///
/// For plain tensors the output rank is chosen by the caller and must be the
/// input rank plus the number of positive levels.
pub fn unbatchify<T, Out>(x: T, spec: impl Into<RepeatSpec>) -> Result<Out, BatchError>
where
    T: Regroup<Out>,
{
    let levels = spec.into().levels()?;
    x.regroup(&levels)
}

/// Checks that `batch_size` splits evenly through `levels` and returns the
/// remaining leading dimension.
pub(crate) fn split_batch(batch_size: usize, levels: &[usize]) -> Result<usize, BatchError> {
    levels.iter().try_fold(batch_size, |dim, &repeats| {
        if dim % repeats != 0 {
            Err(BatchError::ShapeMismatch { dim, repeats })
        } else {
            Ok(dim / repeats)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorDict;
    use burn::{
        backend::ndarray::{NdArray, NdArrayDevice},
        prelude::*,
    };

    fn instances(device: &NdArrayDevice) -> Tensor<NdArray, 3> {
        // 2 instances, 3 nodes, 2 coordinates
        Tensor::from_data(
            [
                [[0.0, 0.1], [0.2, 0.3], [0.4, 0.5]],
                [[1.0, 1.1], [1.2, 1.3], [1.4, 1.5]],
            ],
            device,
        )
    }

    fn values<const D: usize>(x: Tensor<NdArray, D>) -> Vec<f32> {
        x.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_levels_are_reversed_and_skip_zero() {
        let spec = RepeatSpec::from([2, 0, 5]);
        assert_eq!(spec.levels().unwrap(), vec![5, 2]);
        assert_eq!(spec.expansion().unwrap(), 10);
        assert_eq!(spec.factors(), &[2, 0, 5]);
    }

    #[test]
    fn test_negative_factor_rejected() {
        let device = NdArrayDevice::default();
        let err = batchify(instances(&device), -1).unwrap_err();
        assert_eq!(err, BatchError::InvalidSpec { factor: -1 });

        let err = RepeatSpec::from(vec![3, -2]).levels().unwrap_err();
        assert_eq!(err, BatchError::InvalidSpec { factor: -2 });
    }

    #[test]
    fn test_batchify_layout() {
        let device = NdArrayDevice::default();
        let x = instances(&device);

        let tiled = batchify(x.clone(), 4).unwrap();
        assert_eq!(tiled.dims(), [8, 3, 2]);

        // row r * n + b holds instance b
        for r in 0..4 {
            for b in 0..2 {
                let row = tiled.clone().slice([r * 2 + b..r * 2 + b + 1]);
                let original = x.clone().slice([b..b + 1]);
                assert_eq!(values(row), values(original));
            }
        }
    }

    #[test]
    fn test_round_trip_groups_starts_by_instance() {
        let device = NdArrayDevice::default();
        let x = instances(&device);
        let starts = 5;

        let grouped: Tensor<NdArray, 4> =
            unbatchify(batchify(x.clone(), starts).unwrap(), starts).unwrap();
        assert_eq!(grouped.dims(), [2, 5, 3, 2]);

        for b in 0..2 {
            let original = values(x.clone().slice([b..b + 1]));
            for r in 0..starts as usize {
                let start = grouped.clone().slice([b..b + 1, r..r + 1]);
                assert_eq!(values(start), original);
            }
        }
    }

    #[test]
    fn test_round_trip_keeps_distinct_start_values() {
        let device = NdArrayDevice::default();
        // per-start rewards in replicated layout: instance b, start r -> 10 * b + r
        let rewards = Tensor::<NdArray, 1>::from_data([0.0, 10.0, 1.0, 11.0, 2.0, 12.0], &device);

        let grouped: Tensor<NdArray, 2> = unbatchify(rewards, 3).unwrap();

        assert_eq!(values(grouped), vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let device = NdArrayDevice::default();
        let x = instances(&device);

        let same = batchify(x.clone(), 0).unwrap();
        assert_eq!(same.dims(), [2, 3, 2]);
        assert_eq!(values(same), values(x.clone()));

        let same: Tensor<NdArray, 3> = unbatchify(x.clone(), 0).unwrap();
        assert_eq!(values(same), values(x));
    }

    #[test]
    fn test_zero_factor_is_identity_for_dict() {
        let device = NdArrayDevice::default();
        let state = TensorDict::new(2)
            .with("locs", instances(&device))
            .unwrap()
            .with("first", Tensor::<NdArray, 1, Int>::from_data([3, 1], &device))
            .unwrap();

        let same = batchify(state.clone(), 0).unwrap();
        assert_eq!(same.batch_size(), 2);
        assert_eq!(
            values(same.float::<3>("locs").unwrap()),
            values(state.float::<3>("locs").unwrap())
        );
        assert_eq!(
            same.int::<1>("first").unwrap().into_data().to_vec::<i64>().unwrap(),
            vec![3, 1]
        );

        let same: TensorDict<NdArray> = unbatchify(state, 0).unwrap();
        assert_eq!(same.keys().collect::<Vec<_>>(), vec!["first", "locs"]);
        assert_eq!(same.get("locs").unwrap().dims(), vec![2, 3, 2]);
    }

    #[test]
    fn test_nested_spec_applies_last_factor_first() {
        let device = NdArrayDevice::default();
        let x = instances(&device);

        let nested = batchify(x.clone(), [2, 3]).unwrap();
        let stepwise = batchify(batchify(x.clone(), 3).unwrap(), 2).unwrap();
        let other_order = batchify(batchify(x, 2).unwrap(), 3).unwrap();

        assert_eq!(nested.dims(), [12, 3, 2]);
        assert_eq!(values(nested.clone()), values(stepwise));
        assert_eq!(values(nested), values(other_order));
    }

    #[test]
    fn test_nested_layout_differs_by_order() {
        let device = NdArrayDevice::default();
        let ids = Tensor::<NdArray, 1, Int>::from_data([0, 1], &device);

        let nested = batchify(ids.clone(), [2, 3]).unwrap();
        let reversed = batchify(batchify(ids, 2).unwrap(), 3).unwrap();

        // Plain tiling commutes; the regrouped shapes do not.
        let nested: Tensor<NdArray, 3, Int> = unbatchify(nested, [2, 3]).unwrap();
        let reversed: Tensor<NdArray, 3, Int> = unbatchify(reversed, [3, 2]).unwrap();
        assert_eq!(nested.dims(), [2, 2, 3]);
        assert_eq!(reversed.dims(), [2, 3, 2]);
    }

    #[test]
    fn test_nested_round_trip_preserves_instances() {
        let device = NdArrayDevice::default();
        let ids = Tensor::<NdArray, 1, Int>::from_data([7, 8], &device);

        let tiled = batchify(ids, [2, 2]).unwrap();
        assert_eq!(tiled.dims(), [8]);

        let grouped: Tensor<NdArray, 3, Int> = unbatchify(tiled, [2, 2]).unwrap();
        assert_eq!(grouped.dims(), [2, 2, 2]);
        assert_eq!(
            grouped.into_data().to_vec::<i64>().unwrap(),
            vec![7, 7, 7, 7, 8, 8, 8, 8]
        );
    }

    #[test]
    fn test_unbatchify_rejects_indivisible_batch() {
        let device = NdArrayDevice::default();
        let x = Tensor::<NdArray, 2>::zeros([7, 2], &device);

        let result: Result<Tensor<NdArray, 3>, _> = unbatchify(x, 3);

        assert_eq!(
            result.unwrap_err(),
            BatchError::ShapeMismatch { dim: 7, repeats: 3 }
        );
    }

    #[test]
    fn test_unbatchify_checks_every_level_first() {
        let device = NdArrayDevice::default();
        let state = TensorDict::new(6)
            .with("x", Tensor::<NdArray, 1>::zeros([6], &device))
            .unwrap();

        // 6 / 3 = 2, then 2 / 4 fails
        let result: Result<TensorDict<NdArray>, _> = unbatchify(state, [4, 3]);
        assert_eq!(
            result.unwrap_err(),
            BatchError::ShapeMismatch { dim: 2, repeats: 4 }
        );
    }

    #[test]
    fn test_dict_round_trip() {
        let device = NdArrayDevice::default();
        let state = TensorDict::new(2)
            .with("locs", instances(&device))
            .unwrap()
            .with("first", Tensor::<NdArray, 1, Int>::from_data([3, 1], &device))
            .unwrap();

        let tiled = batchify(state, 4).unwrap();
        assert_eq!(tiled.batch_size(), 8);
        assert_eq!(tiled.get("locs").unwrap().dims(), vec![8, 3, 2]);

        let grouped: TensorDict<NdArray> = unbatchify(tiled, 4).unwrap();
        assert_eq!(grouped.batch_size(), 2);
        assert_eq!(grouped.get("locs").unwrap().dims(), vec![2, 4, 3, 2]);
        assert_eq!(
            grouped.int::<2>("first").unwrap().into_data().to_vec::<i64>().unwrap(),
            vec![3, 3, 3, 3, 1, 1, 1, 1]
        );
    }
}
