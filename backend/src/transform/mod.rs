//! Transformation module.
//!
//! This module handles the table transformations:
//! - Steps: the individual optional operations
//! - Pipeline: fixed-order composition of the enabled steps

pub mod pipeline;
pub mod steps;

pub use pipeline::*;
pub use steps::*;
