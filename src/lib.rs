//! Binary diabetes risk classifier: CSV rows in, a two-class softmax model and
//! its per-epoch training history out.

pub mod config;
pub mod encode;
pub mod error;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod parse;
pub mod pipeline;
pub mod plot;
pub mod split;
pub mod trainer;

pub use error::{Error, Result};
