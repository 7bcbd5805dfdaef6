use std::collections::BTreeMap;

use burn::{
    prelude::*,
    tensor::backend::Backend,
};
use strum::Display;

use super::{DynTensor, MAX_RANK};
use crate::{
    batch::split_batch,
    error::BatchError,
    traits::{BatchLayout, Regroup},
};

/// One named entry of a [`TensorDict`], tagged by element kind.
#[derive(Debug, Clone, Display)]
pub enum Field<B: Backend> {
    Float(DynTensor<B, Float>),
    Int(DynTensor<B, Int>),
    Bool(DynTensor<B, Bool>),
}

macro_rules! each_kind {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            Field::Float($t) => $body,
            Field::Int($t) => $body,
            Field::Bool($t) => $body,
        }
    };
}

macro_rules! map_kind {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            Field::Float($t) => Field::Float($body),
            Field::Int($t) => Field::Int($body),
            Field::Bool($t) => Field::Bool($body),
        }
    };
}

impl<B: Backend> Field<B> {
    pub fn rank(&self) -> usize {
        each_kind!(self, t => t.rank())
    }

    pub fn dims(&self) -> Vec<usize> {
        each_kind!(self, t => t.dims())
    }

    pub fn batch_size(&self) -> usize {
        each_kind!(self, t => t.batch_size())
    }

    fn repeat_batch(self, repeats: usize) -> Self {
        map_kind!(self, t => t.repeat_batch(repeats))
    }

    fn regroup_once(self, repeats: usize) -> Option<Self> {
        Some(map_kind!(self, t => t.regroup_once(repeats)?))
    }
}

impl<B: Backend, const D: usize> From<Tensor<B, D>> for Field<B>
where
    DynTensor<B, Float>: From<Tensor<B, D>>,
{
    fn from(tensor: Tensor<B, D>) -> Self {
        Field::Float(tensor.into())
    }
}

impl<B: Backend, const D: usize> From<Tensor<B, D, Int>> for Field<B>
where
    DynTensor<B, Int>: From<Tensor<B, D, Int>>,
{
    fn from(tensor: Tensor<B, D, Int>) -> Self {
        Field::Int(tensor.into())
    }
}

impl<B: Backend, const D: usize> From<Tensor<B, D, Bool>> for Field<B>
where
    DynTensor<B, Bool>: From<Tensor<B, D, Bool>>,
{
    fn from(tensor: Tensor<B, D, Bool>) -> Self {
        Field::Bool(tensor.into())
    }
}

/// Named tensors sharing one leading batch dimension.
///
/// This is the per-step state the environment hands to the policy: node
/// features, masks, current positions and so on. Batch transforms apply to
/// every field alike and keep the field names.
///
/// # Example
///
/// ```ignore
/// let state = TensorDict::new(batch)
///     .with("locs", Tensor::<B, 3>::zeros([batch, nodes, 2], &device))?
///     .with("mask", Tensor::<B, 2, Bool>::empty([batch, nodes], &device))?;
///
/// let starts = batchify(state, 8)?;
/// assert_eq!(starts.batch_size(), batch * 8);
/// ```
#[derive(Debug, Clone)]
pub struct TensorDict<B: Backend> {
    batch_size: usize,
    fields: BTreeMap<String, Field<B>>,
}

impl<B: Backend> TensorDict<B> {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            fields: BTreeMap::new(),
        }
    }

    /// Inserts a field, replacing any previous field of the same name.
    ///
    /// The field's leading dimension must equal the dict's batch size.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Field<B>>,
    ) -> Result<Option<Field<B>>, BatchError> {
        let name = name.into();
        let value = value.into();
        let actual = value.batch_size();
        if actual != self.batch_size {
            return Err(BatchError::BatchSizeMismatch {
                field: name,
                expected: self.batch_size,
                actual,
            });
        }
        Ok(self.fields.insert(name, value))
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<Field<B>>,
    ) -> Result<Self, BatchError> {
        self.insert(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Field<B>> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field<B>> {
        self.fields.remove(name)
    }

    pub fn float<const D: usize>(&self, name: &str) -> Option<Tensor<B, D>> {
        match self.fields.get(name)? {
            Field::Float(t) => t.clone().into_rank(),
            _ => None,
        }
    }

    pub fn int<const D: usize>(&self, name: &str) -> Option<Tensor<B, D, Int>> {
        match self.fields.get(name)? {
            Field::Int(t) => t.clone().into_rank(),
            _ => None,
        }
    }

    pub fn bool<const D: usize>(&self, name: &str) -> Option<Tensor<B, D, Bool>> {
        match self.fields.get(name)? {
            Field::Bool(t) => t.clone().into_rank(),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field<B>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<B: Backend> BatchLayout for TensorDict<B> {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn repeat_batch(self, repeats: usize) -> Self {
        let fields = self
            .fields
            .into_iter()
            .map(|(name, field)| (name, field.repeat_batch(repeats)))
            .collect();

        Self {
            batch_size: self.batch_size * repeats,
            fields,
        }
    }
}

impl<B: Backend> Regroup<TensorDict<B>> for TensorDict<B> {
    fn regroup(self, levels: &[usize]) -> Result<TensorDict<B>, BatchError> {
        let batch_size = split_batch(self.batch_size, levels)?;

        // Every field is checked before any of them is touched.
        for (name, field) in &self.fields {
            if field.rank() + levels.len() > MAX_RANK {
                return Err(BatchError::RankOverflow {
                    field: name.clone(),
                    rank: field.rank(),
                    levels: levels.len(),
                });
            }
        }

        let mut fields = BTreeMap::new();
        for (name, mut field) in self.fields {
            for &repeats in levels {
                field = match field.regroup_once(repeats) {
                    Some(field) => field,
                    None => {
                        return Err(BatchError::RankOverflow {
                            field: name,
                            rank: MAX_RANK,
                            levels: levels.len(),
                        })
                    }
                };
            }
            fields.insert(name, field);
        }

        Ok(TensorDict { batch_size, fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    fn sample_state(device: &NdArrayDevice) -> TensorDict<NdArray> {
        TensorDict::new(2)
            .with(
                "locs",
                Tensor::<NdArray, 3>::from_data(
                    [[[0.0, 0.1], [0.2, 0.3]], [[1.0, 1.1], [1.2, 1.3]]],
                    device,
                ),
            )
            .unwrap()
            .with("current", Tensor::<NdArray, 1, Int>::from_data([4, 7], device))
            .unwrap()
            .with(
                "mask",
                Tensor::<NdArray, 2, Int>::from_data([[1, 0], [0, 1]], device).equal_elem(1),
            )
            .unwrap()
    }

    #[test]
    fn test_insert_rejects_wrong_batch_size() {
        let device = NdArrayDevice::default();
        let mut dict = TensorDict::<NdArray>::new(3);

        let err = dict
            .insert("x", Tensor::<NdArray, 2>::zeros([2, 5], &device))
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::BatchSizeMismatch {
                field: "x".to_string(),
                expected: 3,
                actual: 2,
            }
        );
        assert!(dict.is_empty());
    }

    #[test]
    fn test_typed_accessors() {
        let device = NdArrayDevice::default();
        let state = sample_state(&device);

        assert_eq!(state.len(), 3);
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["current", "locs", "mask"]);
        assert!(state.float::<3>("locs").is_some());
        assert!(state.float::<2>("locs").is_none());
        assert!(state.int::<1>("locs").is_none());
        assert!(state.bool::<2>("mask").is_some());
        assert_eq!(state.get("current").unwrap().to_string(), "Int");
    }

    #[test]
    fn test_repeat_batch_applies_to_every_field() {
        let device = NdArrayDevice::default();
        let repeated = sample_state(&device).repeat_batch(3);

        assert_eq!(repeated.batch_size(), 6);
        assert_eq!(repeated.get("locs").unwrap().dims(), vec![6, 2, 2]);
        assert_eq!(repeated.get("current").unwrap().dims(), vec![6]);
        assert_eq!(repeated.get("mask").unwrap().dims(), vec![6, 2]);

        let current = repeated.int::<1>("current").unwrap().into_data();
        assert_eq!(current.to_vec::<i64>().unwrap(), vec![4, 7, 4, 7, 4, 7]);
    }

    #[test]
    fn test_regroup_rejects_rank_overflow() {
        let device = NdArrayDevice::default();
        let dict = TensorDict::<NdArray>::new(4)
            .with("deep", Tensor::<NdArray, 5>::zeros([4, 1, 1, 1, 1], &device))
            .unwrap();

        let err = dict.regroup(&[2, 2]).unwrap_err();
        assert_eq!(
            err,
            BatchError::RankOverflow {
                field: "deep".to_string(),
                rank: 5,
                levels: 2,
            }
        );
    }
}
