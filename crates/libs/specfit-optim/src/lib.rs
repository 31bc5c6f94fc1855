//! # specfit-optim
//! Numeric building blocks of the specular decomposition: a non-negative
//! least squares solver, accumulators for normal equations and the step
//! basis functions used to discretise the specular lobe.

#![warn(missing_docs)]

mod basis;
mod builder;
pub mod nnls;
mod solution;
mod system;

pub use basis::*;
pub use builder::*;
pub use nnls::NnlsError;
pub use solution::*;
pub use system::*;
