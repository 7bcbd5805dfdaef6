//! Building blocks for multi-start rollout training on burn.
//!
//! A multi-start policy-gradient trainer evaluates several rollouts per
//! problem instance in one forward pass and compares them against each other
//! when computing the loss. This crate provides the pieces around that loop:
//!
//! - [`batch`]: tile instance batches for parallel starts ([`batchify`]) and
//!   regroup per-start outputs by instance ([`unbatchify`])
//! - [`tensor`]: [`TensorDict`], named tensors sharing a batch dimension
//! - [`optim`]: per-group global-norm gradient clipping
//! - [`timing`]: elapsed/remaining time estimates for training progress
//! - [`config`], [`logging`], [`run`]: run setup for the training launcher
//!
//! The trainer, environment and policy network live outside this crate.
//!
//! # Example
//!
//! ```ignore
//! use multistart::prelude::*;
//!
//! let starts = config.repeat_spec();
//! let state = batchify(env.reset(), starts.clone())?;
//! let (log_likelihood, reward) = policy.rollout(state);       // [batch * starts]
//!
//! let reward: Tensor<B, 2> = unbatchify(reward, starts.clone())?;
//! let log_likelihood: Tensor<B, 2> = unbatchify(log_likelihood, starts)?;
//! let advantage = reward.clone() - reward.mean_dim(1);
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod optim;
pub mod run;
pub mod tensor;
pub mod timing;
pub mod traits;

pub use batch::{batchify, unbatchify, RepeatSpec};
pub use error::{BatchError, ClipError, RunError};
pub use tensor::TensorDict;

pub mod prelude {
    pub use crate::{
        batch::{batchify, unbatchify, RepeatSpec},
        config::{Cli, Mode, RunConfig},
        error::{BatchError, ClipError, RunError},
        optim::{clip_grad_norms, GradNorms, GradientClipper, ParamGroup, Parameter},
        run::RunContext,
        tensor::{DynTensor, Field, TensorDict},
        timing::{format_hours, TimeEstimator},
        traits::{BatchLayout, Regroup},
    };
}
