use burn::{
    module::ParamId,
    optim::GradientsParams,
    prelude::*,
    tensor::{backend::Backend, BasicOps, ElementConversion, TensorKind},
};

/// Highest rank a [`DynTensor`] can hold.
pub const MAX_RANK: usize = 6;

/// A burn tensor whose rank is only known at runtime.
///
/// burn fixes tensor rank in the type. Structured collections mix fields of
/// different ranks and must add axes when regrouped, so they store this
/// tagged variant instead.
#[derive(Debug, Clone)]
pub enum DynTensor<B: Backend, K: TensorKind<B> = Float> {
    R1(Tensor<B, 1, K>),
    R2(Tensor<B, 2, K>),
    R3(Tensor<B, 3, K>),
    R4(Tensor<B, 4, K>),
    R5(Tensor<B, 5, K>),
    R6(Tensor<B, 6, K>),
}

/// Runs `$body` with `$t` bound to the inner tensor, whatever its rank.
macro_rules! each_rank {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            DynTensor::R1($t) => $body,
            DynTensor::R2($t) => $body,
            DynTensor::R3($t) => $body,
            DynTensor::R4($t) => $body,
            DynTensor::R5($t) => $body,
            DynTensor::R6($t) => $body,
        }
    };
}

/// Like `each_rank!` but re-wraps a same-rank result.
macro_rules! map_rank {
    ($value:expr, $t:ident => $body:expr) => {
        match $value {
            DynTensor::R1($t) => DynTensor::R1($body),
            DynTensor::R2($t) => DynTensor::R2($body),
            DynTensor::R3($t) => DynTensor::R3($body),
            DynTensor::R4($t) => DynTensor::R4($body),
            DynTensor::R5($t) => DynTensor::R5($body),
            DynTensor::R6($t) => DynTensor::R6($body),
        }
    };
}

macro_rules! impl_from_rank {
    ($($rank:literal => $variant:ident),*) => {
        $(
            impl<B: Backend, K: TensorKind<B>> From<Tensor<B, $rank, K>> for DynTensor<B, K> {
                fn from(tensor: Tensor<B, $rank, K>) -> Self {
                    DynTensor::$variant(tensor)
                }
            }
        )*
    };
}

impl_from_rank!(1 => R1, 2 => R2, 3 => R3, 4 => R4, 5 => R5, 6 => R6);

impl<B: Backend, K: BasicOps<B>> DynTensor<B, K> {
    /// Erases the rank of a tensor whose rank is a generic parameter.
    ///
    /// Returns `None` above [`MAX_RANK`].
    pub fn from_static<const D: usize>(tensor: Tensor<B, D, K>) -> Option<Self> {
        let dims = tensor.dims();
        let erased = match D {
            1 => DynTensor::R1(tensor.reshape(fixed_shape::<1>(&dims))),
            2 => DynTensor::R2(tensor.reshape(fixed_shape::<2>(&dims))),
            3 => DynTensor::R3(tensor.reshape(fixed_shape::<3>(&dims))),
            4 => DynTensor::R4(tensor.reshape(fixed_shape::<4>(&dims))),
            5 => DynTensor::R5(tensor.reshape(fixed_shape::<5>(&dims))),
            6 => DynTensor::R6(tensor.reshape(fixed_shape::<6>(&dims))),
            _ => return None,
        };
        Some(erased)
    }

    pub fn rank(&self) -> usize {
        match self {
            DynTensor::R1(_) => 1,
            DynTensor::R2(_) => 2,
            DynTensor::R3(_) => 3,
            DynTensor::R4(_) => 4,
            DynTensor::R5(_) => 5,
            DynTensor::R6(_) => 6,
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        each_rank!(self, t => t.dims().to_vec())
    }

    /// Size of the leading (batch) axis.
    pub fn batch_size(&self) -> usize {
        each_rank!(self, t => t.dims()[0])
    }

    /// Tiles the tensor `repeats` times along the batch axis.
    pub fn repeat_batch(self, repeats: usize) -> Self {
        map_rank!(self, t => t.repeat_dim(0, repeats))
    }

    /// Splits the batch axis into `(repeats, n / repeats)` and swaps the two,
    /// producing a tensor one rank higher.
    ///
    /// Returns `None` when the tensor is already at [`MAX_RANK`]. Divisibility
    /// of the batch axis is the caller's responsibility.
    pub fn regroup_once(self, repeats: usize) -> Option<Self> {
        let regrouped = match self {
            DynTensor::R1(t) => DynTensor::R2(regroup_level(t, repeats)),
            DynTensor::R2(t) => DynTensor::R3(regroup_level(t, repeats)),
            DynTensor::R3(t) => DynTensor::R4(regroup_level(t, repeats)),
            DynTensor::R4(t) => DynTensor::R5(regroup_level(t, repeats)),
            DynTensor::R5(t) => DynTensor::R6(regroup_level(t, repeats)),
            DynTensor::R6(_) => return None,
        };
        Some(regrouped)
    }

    /// Recovers a statically ranked tensor, or `None` if the rank differs.
    pub fn into_rank<const D: usize>(self) -> Option<Tensor<B, D, K>> {
        if self.rank() != D {
            return None;
        }
        let shape = fixed_shape::<D>(&self.dims());
        Some(each_rank!(self, t => t.reshape(shape)))
    }
}

fn fixed_shape<const D: usize>(dims: &[usize]) -> [usize; D] {
    let mut shape = [0usize; D];
    shape.copy_from_slice(dims);
    shape
}

impl<B: Backend> DynTensor<B, Float> {
    /// Sum of squared elements, accumulated on the tensor's device.
    pub fn sum_squares(&self) -> f64 {
        each_rank!(self, t => t.clone().powf_scalar(2.0).sum().into_scalar().elem::<f64>())
    }

    pub fn mul_scalar(self, factor: f64) -> Self {
        map_rank!(self, t => t.mul_scalar(factor))
    }

    /// Registers the tensor as the gradient of parameter `id`, replacing any
    /// gradient already held for it.
    pub fn register_grad(self, id: ParamId, grads: &mut GradientsParams) {
        each_rank!(self, t => grads.register(id, t))
    }
}

/// One level of regrouping: `[R * n, ...] -> [n, R, ...]`.
///
/// `D2` must be `D + 1`.
pub(crate) fn regroup_level<B, const D: usize, const D2: usize, K>(
    x: Tensor<B, D, K>,
    repeats: usize,
) -> Tensor<B, D2, K>
where
    B: Backend,
    K: BasicOps<B>,
{
    debug_assert_eq!(D + 1, D2);
    let dims = x.dims();
    let mut target = [0usize; D2];
    target[0] = repeats;
    target[1] = dims[0] / repeats;
    target[2..].copy_from_slice(&dims[1..]);
    x.reshape(target).swap_dims(0, 1)
}
