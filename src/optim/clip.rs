//! Global-norm gradient clipping per parameter group
//!
//! Each group (for example actor and critic) is clipped on its own: the L2
//! norm is taken over every gradient in the group, and if it exceeds
//! `max_norm` all of them are scaled by the same factor
//! `max_norm / (norm + 1e-6)`. burn's optimizer-level clipping works per
//! tensor, so it cannot bound a group's global norm.
//!
//! A `max_norm` of zero or below disables clipping; norms are still computed
//! and reported. Groups without parameters are skipped and do not appear in
//! the returned [`GradNorms`]. A NaN norm is reported as NaN and, when
//! clipping is active, spreads into the group's gradients.
//!
//! # Usage Example
//!
//! ```ignore
//! let actor_grads = GradientsParams::from_grads(actor_loss.backward(), &actor);
//! let mut groups = vec![ParamGroup::from_module("actor", &actor, &actor_grads)?];
//!
//! let norms = GradientClipper::new(config.max_grad_norm).clip(&mut groups)?;
//! log::info!("grad norms {:?} -> {:?}", norms.pre_clip, norms.post_clip);
//!
//! let mut actor_grads = actor_grads;
//! groups[0].register_grads(&mut actor_grads);
//! let actor = optimizer.step(lr, actor, actor_grads);
//! ```

use burn::{
    module::{AutodiffModule, Module, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::{AutodiffBackend, Backend},
};
use log::debug;

use crate::{error::ClipError, tensor::DynTensor};

/// Added to the norm before dividing, so a zero gradient never divides by zero.
pub const CLIP_EPS: f64 = 1e-6;

/// A trainable tensor, identified by its burn [`ParamId`], and the gradient
/// attached to it, if any.
#[derive(Debug, Clone)]
pub struct Parameter<B: Backend> {
    pub id: ParamId,
    pub name: String,
    pub grad: Option<DynTensor<B>>,
}

impl<B: Backend> Parameter<B> {
    /// A parameter with a fresh id and no gradient.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ParamId::new(),
            name: name.into(),
            grad: None,
        }
    }

    pub fn with_id(mut self, id: ParamId) -> Self {
        self.id = id;
        self
    }

    pub fn with_grad(mut self, grad: impl Into<DynTensor<B>>) -> Self {
        self.grad = Some(grad.into());
        self
    }
}

/// A named set of parameters clipped together.
#[derive(Debug, Clone)]
pub struct ParamGroup<B: Backend> {
    pub name: String,
    pub params: Vec<Parameter<B>>,
}

impl<B: Backend> ParamGroup<B> {
    pub fn new(name: impl Into<String>, params: Vec<Parameter<B>>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Collects one parameter per float tensor of `module`, with the
    /// gradient `grads` holds for it. Parameters `grads` knows nothing
    /// about (frozen ones) are kept without a gradient.
    pub fn from_module<AB, M>(
        name: impl Into<String>,
        module: &M,
        grads: &GradientsParams,
    ) -> Result<Self, ClipError>
    where
        AB: AutodiffBackend<InnerBackend = B>,
        M: AutodiffModule<AB>,
    {
        let mut collector = GradCollector {
            grads,
            params: Vec::new(),
            error: None,
        };
        module.visit(&mut collector);

        match collector.error {
            Some(err) => Err(err),
            None => Ok(Self::new(name, collector.params)),
        }
    }

    /// Writes the group's gradients back into `grads`, keyed by parameter id.
    pub fn register_grads(&self, grads: &mut GradientsParams) {
        for param in &self.params {
            if let Some(grad) = &param.grad {
                grad.clone().register_grad(param.id, grads);
            }
        }
    }

    /// L2 norm over all gradients in the group. Parameters without a
    /// gradient contribute nothing.
    pub fn grad_norm(&self) -> f64 {
        self.params
            .iter()
            .filter_map(|p| p.grad.as_ref())
            .map(DynTensor::sum_squares)
            .sum::<f64>()
            .sqrt()
    }

    fn scale_grads(&mut self, factor: f64) {
        for param in &mut self.params {
            if let Some(grad) = param.grad.take() {
                param.grad = Some(grad.mul_scalar(factor));
            }
        }
    }
}

/// Visits a module's float parameters and looks up their gradients.
struct GradCollector<'a, B: Backend> {
    grads: &'a GradientsParams,
    params: Vec<Parameter<B>>,
    error: Option<ClipError>,
}

impl<AB: AutodiffBackend> ModuleVisitor<AB> for GradCollector<'_, AB::InnerBackend> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<AB, D>) {
        let param = Parameter::new(id.to_string()).with_id(id);
        let Some(grad) = self.grads.get::<AB::InnerBackend, D>(id) else {
            self.params.push(param);
            return;
        };

        match DynTensor::from_static(grad) {
            Some(grad) => self.params.push(param.with_grad(grad)),
            None => {
                self.error.get_or_insert(ClipError::UnsupportedRank {
                    param: param.name,
                    rank: D,
                });
            }
        }
    }
}

/// Norms of every non-empty group, before and after clipping, in group order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradNorms {
    pub pre_clip: Vec<f64>,
    /// `min(norm, max_norm)` when `max_norm > 0`, else the pre-clip norm.
    /// A NaN norm is reported as NaN.
    pub post_clip: Vec<f64>,
}

/// Clips gradients of parameter groups to a maximum global norm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientClipper {
    max_norm: f64,
    error_if_nonfinite: bool,
}

impl Default for GradientClipper {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl GradientClipper {
    /// A `max_norm` of zero or below means no clipping.
    pub fn new(max_norm: f64) -> Self {
        Self {
            max_norm,
            error_if_nonfinite: false,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(f64::INFINITY)
    }

    /// Fail with [`ClipError::NonFiniteNorm`] when a group's norm is NaN or
    /// infinite instead of scaling by it.
    pub fn with_error_if_nonfinite(mut self, error_if_nonfinite: bool) -> Self {
        self.error_if_nonfinite = error_if_nonfinite;
        self
    }

    pub fn max_norm(&self) -> f64 {
        self.max_norm
    }

    /// The cap gradients are scaled against, `None` when clipping is off.
    fn cap(&self) -> Option<f64> {
        (self.max_norm > 0.0 && self.max_norm.is_finite()).then_some(self.max_norm)
    }

    /// Clips every non-empty group in place and reports its norms.
    ///
    /// Groups are processed in order. If a later group fails the
    /// non-finite check, earlier groups stay clipped.
    pub fn clip<B: Backend>(&self, groups: &mut [ParamGroup<B>]) -> Result<GradNorms, ClipError> {
        let mut norms = GradNorms::default();

        for group in groups.iter_mut().filter(|g| !g.params.is_empty()) {
            let norm = group.grad_norm();
            if self.error_if_nonfinite && !norm.is_finite() {
                return Err(ClipError::NonFiniteNorm {
                    group: group.name.clone(),
                    norm,
                });
            }

            if let Some(cap) = self.cap() {
                let coef = cap / (norm + CLIP_EPS);
                // NaN coefficients are applied as well
                if coef.is_nan() || coef < 1.0 {
                    group.scale_grads(coef);
                }
            }

            let reported = if self.max_norm > 0.0 && !norm.is_nan() {
                norm.min(self.max_norm)
            } else {
                norm
            };
            debug!(
                "group `{}`: grad norm {:.6} -> {:.6}",
                group.name, norm, reported
            );

            norms.pre_clip.push(norm);
            norms.post_clip.push(reported);
        }

        Ok(norms)
    }
}

/// Clips `groups` to `max_norm` with default settings.
pub fn clip_grad_norms<B: Backend>(
    groups: &mut [ParamGroup<B>],
    max_norm: f64,
) -> Result<GradNorms, ClipError> {
    GradientClipper::new(max_norm).clip(groups)
}
