//! Tensor-like values the batch transforms operate on.
//!
//! Plain burn tensors implement [`BatchLayout`](crate::traits::BatchLayout)
//! directly. Structured state goes into a [`TensorDict`], whose fields are
//! rank-erased [`DynTensor`]s tagged by element kind.

pub mod dict;
pub mod dyn_tensor;

pub use dict::{Field, TensorDict};
pub use dyn_tensor::{DynTensor, MAX_RANK};
