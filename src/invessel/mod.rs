//! In-vessel components: radial build, rib loci and lofted layer solids.

mod build;
mod loci;
mod radial_build;

pub use build::{InVesselBuild, InVesselBuildGenerator, InVesselComponent};
pub use loci::{LayerLoci, LociInterpolator, Locus};
pub use radial_build::{ComponentSpec, RadialBuildSpec, RadialLayer, PLASMA, SOL};

use crate::config::check_extension;
use crate::error::ConfigurationError;

/// Unit conversion from meters to centimeters.
pub const M2CM: f64 = 100.0;

/// Sampling and tagging options for an in-vessel build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Number of additional copies of the build segment around the torus.
    pub repeat: usize,
    /// Target number of ribs per segment.
    pub num_ribs: usize,
    /// Target number of points per rib, closing point included.
    pub num_rib_pts: usize,
    /// Factor from equilibrium meters to cm.
    pub scale: f64,
    /// Material tag for the plasma layer.
    pub plasma_mat_tag: Option<String>,
    /// Material tag for the scrape-off layer.
    pub sol_mat_tag: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            repeat: 0,
            num_ribs: 61,
            num_rib_pts: 61,
            scale: M2CM,
            plasma_mat_tag: None,
            sol_mat_tag: None,
        }
    }
}

impl BuildOptions {
    /// Checks the options against the grid they will sample.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] if a density is below
    /// the input grid size or the scale is not a positive number.
    pub fn validate(&self, spec: &RadialBuildSpec) -> Result<(), ConfigurationError> {
        if self.num_ribs < spec.toroidal_angles().len() {
            return Err(ConfigurationError::InvalidValue {
                option: "num_ribs",
                reason: format!(
                    "{} is below the {} toroidal angles of the radial build",
                    self.num_ribs,
                    spec.toroidal_angles().len()
                ),
            });
        }
        if self.num_rib_pts < spec.poloidal_angles().len().max(4) {
            return Err(ConfigurationError::InvalidValue {
                option: "num_rib_pts",
                reason: format!(
                    "{} is below the {} poloidal angles of the radial build",
                    self.num_rib_pts,
                    spec.poloidal_angles().len().max(4)
                ),
            });
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigurationError::InvalidValue {
                option: "scale",
                reason: format!("must be a positive number, got {}", self.scale),
            });
        }
        Ok(())
    }
}

/// Options for surface-meshing the in-vessel solids straight into an
/// in-vessel-only neutronics model.
#[derive(Debug, Clone, PartialEq)]
pub struct CadToDagmc {
    /// Output file name; `.h5m` is appended when missing.
    pub filename: String,
    /// Minimum element edge length, cm.
    pub min_mesh_size: f64,
    /// Maximum element edge length, cm.
    pub max_mesh_size: f64,
}

impl Default for CadToDagmc {
    fn default() -> Self {
        Self {
            filename: "dagmc".into(),
            min_mesh_size: 5.0,
            max_mesh_size: 20.0,
        }
    }
}

impl CadToDagmc {
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for a foreign file extension or a
    /// mesh size range that is empty or not positive.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_extension(&self.filename, "h5m")?;
        if !(self.min_mesh_size.is_finite() && self.min_mesh_size > 0.0) {
            return Err(ConfigurationError::InvalidValue {
                option: "min_mesh_size",
                reason: format!("must be a positive number, got {}", self.min_mesh_size),
            });
        }
        if !(self.max_mesh_size.is_finite() && self.max_mesh_size >= self.min_mesh_size) {
            return Err(ConfigurationError::InvalidValue {
                option: "max_mesh_size",
                reason: format!(
                    "must be at least min_mesh_size {}, got {}",
                    self.min_mesh_size, self.max_mesh_size
                ),
            });
        }
        Ok(())
    }
}
