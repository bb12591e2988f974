//! Parametric stellarator model builder.
//!
//! Turns plasma-equilibrium flux surfaces and a sparse radial build into
//! lofted in-vessel components, sweeps magnet coils from filament data,
//! builds a structured source mesh, and drives a modeling kernel through
//! import, imprint/merge, material tagging and faceted export.

pub mod assembly;
pub mod config;
pub mod equilibrium;
pub mod error;
pub mod invessel;
pub mod kernel;
pub mod magnets;
pub mod math;
pub mod source_mesh;
pub mod stellarator;

pub use error::{ParastellError, Result};
pub use stellarator::Stellarator;
