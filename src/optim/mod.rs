//! Optimizer-step utilities

pub mod clip;

pub use clip::{clip_grad_norms, GradNorms, GradientClipper, ParamGroup, Parameter, CLIP_EPS};
