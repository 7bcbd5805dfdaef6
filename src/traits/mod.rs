pub mod batch_layout;

pub use batch_layout::{BatchLayout, Regroup};
