//! # specfit-decomp
//! Decomposition of multi-view reflectance observations into a small set of
//! basis materials and per-texel mixing weights.
//!
//! The decomposition alternates between reconstructing the basis BRDFs for
//! fixed weights ([`BrdfReconstruction`]) and optimising the weights for
//! fixed BRDFs ([`SpecularWeightOptimization`]); texels that never received
//! an observation are filled from their neighbours at the end.

#![warn(missing_docs)]

mod clustering;
mod decomposition;
mod error_calc;
mod hole_fill;
pub mod io;
mod material;
mod matrix_builder;
mod process;
mod reconstruction;
mod reflectance;
pub mod synthetic;
mod weights;

pub use clustering::*;
pub use decomposition::*;
pub use error_calc::*;
pub use hole_fill::*;
pub use material::*;
pub use matrix_builder::*;
pub use process::*;
pub use reconstruction::*;
pub use reflectance::*;
pub use weights::*;
