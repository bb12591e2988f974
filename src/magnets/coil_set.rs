use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::output_path;
use crate::error::{ConfigurationError, Result};
use crate::kernel::{MeshId, ModelingKernel, SolidId};

use super::filament::{average_radial_distance, filter_and_sort};
use super::{CrossSection, Filament, MagnetOptions, SweepProfile};

/// The swept coil solids of one magnet set, all sharing a material tag.
#[derive(Debug, Clone)]
pub struct MagnetSet {
    solids: Vec<SolidId>,
    material: String,
    cross_section: CrossSection,
    filaments: Vec<Filament>,
    toroidal_extent: f64,
    step_path: Option<PathBuf>,
    mesh: Option<MeshId>,
}

impl MagnetSet {
    /// Coil solids, cut to the toroidal extent, in toroidal order.
    #[must_use]
    pub fn solids(&self) -> &[SolidId] {
        &self.solids
    }

    #[must_use]
    pub fn material(&self) -> &str {
        &self.material
    }

    #[must_use]
    pub fn cross_section(&self) -> CrossSection {
        self.cross_section
    }

    /// Filaments that were swept, sorted by toroidal angle.
    #[must_use]
    pub fn filaments(&self) -> &[Filament] {
        &self.filaments
    }

    /// Modeled toroidal extent in degrees.
    #[must_use]
    pub fn toroidal_extent(&self) -> f64 {
        self.toroidal_extent
    }

    #[must_use]
    pub fn step_path(&self) -> Option<&Path> {
        self.step_path.as_deref()
    }

    /// Writes every coil into a single STEP file.
    ///
    /// # Errors
    ///
    /// Returns an error if `filename` carries a foreign extension or the
    /// kernel export fails.
    pub fn export_step<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        export_dir: &Path,
        filename: &str,
    ) -> Result<PathBuf> {
        info!("exporting STEP file for magnet coils");
        let path = output_path(export_dir, filename, "step")?;
        kernel.export_step(&self.solids, &path)?;
        self.step_path = Some(path.clone());
        Ok(path)
    }

    /// Generates a tetrahedral mesh of the coils, once.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel cannot mesh the solids.
    pub fn mesh<K: ModelingKernel>(&mut self, kernel: &mut K) -> Result<MeshId> {
        if let Some(mesh) = self.mesh {
            return Ok(mesh);
        }
        info!("generating tetrahedral mesh of magnet coils");
        let mesh = kernel.mesh_generate(&self.solids)?;
        self.mesh = Some(mesh);
        Ok(mesh)
    }

    /// Meshes the coils if needed and writes the mesh as `.h5m`.
    ///
    /// # Errors
    ///
    /// Returns an error if `filename` carries a foreign extension, or
    /// meshing or writing fails.
    pub fn export_mesh<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        export_dir: &Path,
        filename: &str,
    ) -> Result<PathBuf> {
        let path = output_path(export_dir, filename, "h5m")?;
        let mesh = self.mesh(kernel)?;
        info!("exporting mesh file for magnet coils");
        kernel.export_mesh(mesh, &path)?;
        Ok(path)
    }
}

/// Sweeps one solid per coil filament and trims the set to the modeled
/// toroidal extent.
pub struct MagnetCoilSetGenerator<'a> {
    cross_section: CrossSection,
    toroidal_extent: f64,
    options: &'a MagnetOptions,
}

impl<'a> MagnetCoilSetGenerator<'a> {
    /// Creates a new `MagnetCoilSetGenerator`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] if the extent is not in
    /// `(0, 360]` degrees or the options are out of range.
    pub fn new(
        cross_section: CrossSection,
        toroidal_extent: f64,
        options: &'a MagnetOptions,
    ) -> std::result::Result<Self, ConfigurationError> {
        if !(toroidal_extent > 0.0 && toroidal_extent <= 360.0) {
            return Err(ConfigurationError::InvalidValue {
                option: "toroidal_extent",
                reason: format!("must lie in (0, 360] degrees, got {toroidal_extent}"),
            });
        }
        options.validate()?;
        Ok(Self {
            cross_section,
            toroidal_extent,
            options,
        })
    }

    /// Filters and sorts `filaments`, sweeps each one and cuts the result
    /// to the toroidal extent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no filament falls within the extent
    /// or a filament has no usable start tangent, and propagates kernel
    /// failures.
    pub fn execute<K: ModelingKernel>(
        &self,
        filaments: Vec<Filament>,
        kernel: &mut K,
    ) -> Result<MagnetSet> {
        info!("constructing magnet coils");
        let r_avg = average_radial_distance(&filaments);
        let filaments = filter_and_sort(
            filaments,
            self.toroidal_extent.to_radians(),
            self.cross_section.characteristic_length(),
            r_avg,
        );
        if filaments.is_empty() {
            return Err(ConfigurationError::InvalidValue {
                option: "toroidal_extent",
                reason: format!(
                    "no coil filament lies within {} degrees",
                    self.toroidal_extent
                ),
            }
            .into());
        }

        let mut solids = Vec::with_capacity(filaments.len());
        for filament in &filaments {
            let pts = filament.points();
            // Closed polyline: the neighbours of the start are pts[1] and pts[n - 2].
            let tangent = pts[1] - pts[pts.len() - 2];
            let profile = SweepProfile::new(self.cross_section, pts[0], tangent).ok_or_else(
                || ConfigurationError::Filament {
                    line: filament.line(),
                    reason: "coil start has no usable tangent or radial direction".into(),
                },
            )?;
            solids.push(kernel.sweep(pts, &profile)?);
        }

        info!(coils = solids.len(), "cutting magnet coils to toroidal extent");
        let solids = kernel.intersect_wedge(&solids, self.toroidal_extent, 2.0 * r_avg)?;

        Ok(MagnetSet {
            solids,
            material: self.options.mat_tag.clone(),
            cross_section: self.cross_section,
            filaments,
            toroidal_extent: self.toroidal_extent,
            step_path: None,
            mesh: None,
        })
    }
}
