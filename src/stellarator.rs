use std::path::{Path, PathBuf};

use tracing::info;

use crate::assembly::{self, DagmcExport, ExportReport};
use crate::config::{check_extension, StellaratorConfig};
use crate::equilibrium::Equilibrium;
use crate::error::{ConfigurationError, Result};
use crate::invessel::{BuildOptions, CadToDagmc, InVesselBuild, InVesselBuildGenerator, RadialBuildSpec};
use crate::kernel::ModelingKernel;
use crate::magnets::{read_filaments, CrossSection, MagnetCoilSetGenerator, MagnetOptions, MagnetSet};
use crate::source_mesh::{SourceMesh, SourceMeshGenerator, SourceMeshParams};

/// A stellarator model: in-vessel build, magnet set and source mesh built
/// from one equilibrium.
///
/// Each part is optional and independent until the neutronics export,
/// which assembles whichever of the in-vessel build and magnet set exist.
#[derive(Debug)]
pub struct Stellarator<E: Equilibrium> {
    equilibrium: E,
    invessel_build: Option<InVesselBuild>,
    magnet_set: Option<MagnetSet>,
    source_mesh: Option<SourceMesh>,
}

impl<E: Equilibrium> Stellarator<E> {
    /// Creates a new `Stellarator` with nothing constructed.
    #[must_use]
    pub fn new(equilibrium: E) -> Self {
        Self {
            equilibrium,
            invessel_build: None,
            magnet_set: None,
            source_mesh: None,
        }
    }

    #[must_use]
    pub fn equilibrium(&self) -> &E {
        &self.equilibrium
    }

    #[must_use]
    pub fn invessel_build(&self) -> Option<&InVesselBuild> {
        self.invessel_build.as_ref()
    }

    #[must_use]
    pub fn magnet_set(&self) -> Option<&MagnetSet> {
        self.magnet_set.as_ref()
    }

    #[must_use]
    pub fn source_mesh(&self) -> Option<&SourceMesh> {
        self.source_mesh.as_ref()
    }

    /// Lofts the in-vessel components, replacing any earlier build.
    ///
    /// # Errors
    ///
    /// Returns an error if the options do not fit the radial build, an
    /// equilibrium query fails, or the kernel fails.
    pub fn construct_invessel_build<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        spec: &RadialBuildSpec,
        options: &BuildOptions,
    ) -> Result<&InVesselBuild> {
        let build = InVesselBuildGenerator::new(spec, options).execute(&self.equilibrium, kernel)?;
        Ok(&*self.invessel_build.insert(build))
    }

    /// Writes one STEP file per in-vessel component and, when
    /// `cad_to_dagmc` is given, an in-vessel-only neutronics model.
    ///
    /// # Errors
    ///
    /// Returns an error if no build was constructed, the CAD-to-DAGMC
    /// options are invalid, or an export fails.
    pub fn export_invessel_build<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        export_dir: &Path,
        cad_to_dagmc: Option<&CadToDagmc>,
    ) -> Result<Vec<PathBuf>> {
        let build = self
            .invessel_build
            .as_mut()
            .ok_or_else(|| not_constructed("invessel_build"))?;
        if let Some(options) = cad_to_dagmc {
            options.validate()?;
        }
        let mut paths = build.export_step(kernel, export_dir)?;
        if let Some(options) = cad_to_dagmc {
            paths.push(build.export_cad_to_dagmc(kernel, export_dir, options)?);
        }
        Ok(paths)
    }

    /// Reads the coils file and sweeps the magnet set, replacing any
    /// earlier set. The extent and options are checked before the file is
    /// read.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options, unreadable or malformed coil
    /// data, or kernel failures.
    pub fn construct_magnets<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        coils_file: &Path,
        cross_section: CrossSection,
        toroidal_extent: f64,
        options: &MagnetOptions,
    ) -> Result<&MagnetSet> {
        let generator = MagnetCoilSetGenerator::new(cross_section, toroidal_extent, options)?;
        let filaments = read_filaments(coils_file, options)?;
        let set = generator.execute(filaments, kernel)?;
        Ok(&*self.magnet_set.insert(set))
    }

    /// Writes the magnet STEP file and, when `mesh_filename` is given, a
    /// tetrahedral mesh of the coils.
    ///
    /// # Errors
    ///
    /// Returns an error if no magnet set was constructed, a filename has a
    /// foreign extension, or the kernel fails.
    pub fn export_magnets<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        export_dir: &Path,
        step_filename: &str,
        mesh_filename: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let set = self
            .magnet_set
            .as_mut()
            .ok_or_else(|| not_constructed("magnet_coils"))?;
        let mut paths = vec![set.export_step(kernel, export_dir, step_filename)?];
        if let Some(mesh_filename) = mesh_filename {
            paths.push(set.export_mesh(kernel, export_dir, mesh_filename)?);
        }
        Ok(paths)
    }

    /// Samples the source mesh, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid parameters or failed equilibrium
    /// queries.
    pub fn construct_source_mesh(&mut self, params: SourceMeshParams) -> Result<&SourceMesh> {
        let mesh = SourceMeshGenerator::new(params)?.execute(&self.equilibrium)?;
        Ok(&*self.source_mesh.insert(mesh))
    }

    /// # Errors
    ///
    /// Returns an error if no source mesh was constructed or the file
    /// cannot be written.
    pub fn export_source_mesh(&self, export_dir: &Path, filename: &str) -> Result<PathBuf> {
        self.source_mesh
            .as_ref()
            .ok_or_else(|| not_constructed("source_mesh"))?
            .export_vtk(export_dir, filename)
    }

    /// Assembles, tags and facets the exported in-vessel components and
    /// magnets into a neutronics model.
    ///
    /// # Errors
    ///
    /// See [`assembly::run`].
    pub fn export_dagmc<K: ModelingKernel>(
        &self,
        kernel: &mut K,
        options: &DagmcExport,
    ) -> Result<ExportReport> {
        info!("exporting neutronics model");
        assembly::run(
            kernel,
            self.invessel_build.as_ref(),
            self.magnet_set.as_ref(),
            options,
        )
    }

    /// Runs every configured stage: in-vessel build, magnets, source mesh
    /// and neutronics export. All sections are converted and checked
    /// before the first kernel command.
    ///
    /// Returns the export report when a `dagmc_export` section is present.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, validation, domain or kernel error.
    pub fn run_config<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        config: &StellaratorConfig,
    ) -> Result<Option<ExportReport>> {
        let dir = config.export_dir.as_path();

        let invessel = match &config.invessel_build {
            Some(section) => {
                let spec = section.radial_build()?;
                let options = section.build_options();
                options.validate(&spec)?;
                let cad_to_dagmc = section.cad_to_dagmc();
                if let Some(cad) = &cad_to_dagmc {
                    cad.validate()?;
                }
                Some((spec, options, cad_to_dagmc))
            }
            None => None,
        };
        let magnets = match &config.magnet_coils {
            Some(section) => {
                let cross_section = section.cross_section()?;
                let options = section.options();
                MagnetCoilSetGenerator::new(cross_section, section.toroidal_extent, &options)?;
                check_extension(&section.step_filename, "step")?;
                if section.export_mesh {
                    check_extension(&section.mesh_filename, "h5m")?;
                }
                Some((section, cross_section, options))
            }
            None => None,
        };
        if let Some(section) = &config.source_mesh {
            section.params().validate()?;
            check_extension(&section.filename, "vtk")?;
        }
        let export = config.dagmc_export.as_ref().map(|section| section.export(dir));
        if let Some(export) = &export {
            check_extension(&export.filename, "h5m")?;
        }

        if let Some((spec, options, cad_to_dagmc)) = invessel {
            self.construct_invessel_build(kernel, &spec, &options)?;
            self.export_invessel_build(kernel, dir, cad_to_dagmc.as_ref())?;
        }
        if let Some((section, cross_section, options)) = magnets {
            self.construct_magnets(
                kernel,
                &section.coils_file,
                cross_section,
                section.toroidal_extent,
                &options,
            )?;
            let mesh = section.export_mesh.then_some(section.mesh_filename.as_str());
            self.export_magnets(kernel, dir, &section.step_filename, mesh)?;
        }
        if let Some(section) = &config.source_mesh {
            self.construct_source_mesh(section.params())?;
            self.export_source_mesh(dir, &section.filename)?;
        }

        export
            .map(|export| self.export_dagmc(kernel, &export))
            .transpose()
    }
}

fn not_constructed(part: &'static str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        option: part,
        reason: "has not been constructed".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::equilibrium::AnalyticEquilibrium;
    use crate::error::ParastellError;
    use crate::invessel::ComponentSpec;
    use crate::kernel::MemoryKernel;

    #[test]
    fn exports_require_construction() {
        let mut kernel = MemoryKernel::new();
        let dir = tempfile::tempdir().unwrap();
        let mut st = Stellarator::new(AnalyticEquilibrium::default());
        assert!(st
            .export_invessel_build(&mut kernel, dir.path(), None)
            .is_err());
        assert!(st
            .export_magnets(&mut kernel, dir.path(), "magnets", None)
            .is_err());
        assert!(st.export_source_mesh(dir.path(), "source_mesh").is_err());
        assert!(kernel.commands().is_empty());
    }

    #[test]
    fn source_mesh_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut st = Stellarator::new(AnalyticEquilibrium::default());
        let mesh = st
            .construct_source_mesh(SourceMeshParams::new(3, 8, 4, 90.0))
            .unwrap();
        assert_eq!(mesh.vertices().len(), 96);
        let path = st.export_source_mesh(dir.path(), "source").unwrap();
        assert!(path.ends_with("source.vtk"));
    }

    #[test]
    fn bad_magnet_extent_fails_before_reading_coils() {
        let mut kernel = MemoryKernel::new();
        let mut st = Stellarator::new(AnalyticEquilibrium::default());
        let err = st
            .construct_magnets(
                &mut kernel,
                Path::new("does-not-exist.txt"),
                CrossSection::Circle { radius: 10.0 },
                400.0,
                &MagnetOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ParastellError::Configuration(_)));
    }

    #[test]
    fn bad_cad_to_dagmc_name_fails_before_kernel_work() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            r#"
export_dir = {out:?}

[invessel_build]
toroidal_angles = [0.0, 90.0]
poloidal_angles = [0.0, 180.0, 360.0]
wall_s = 1.0
export_cad_to_dagmc = true
dagmc_filename = "invessel.stl"
"#,
            out = dir.path().to_string_lossy(),
        );
        let config = StellaratorConfig::from_toml_str(&text).unwrap();
        let mut kernel = MemoryKernel::new();
        let mut st = Stellarator::new(AnalyticEquilibrium::default());
        let err = st.run_config(&mut kernel, &config).unwrap_err();
        assert!(matches!(err, ParastellError::Configuration(_)));
        assert!(kernel.commands().is_empty());
    }

    #[test]
    fn rebuilding_replaces_the_previous_build() {
        let mut kernel = MemoryKernel::new();
        let mut st = Stellarator::new(AnalyticEquilibrium::default());
        let spec = RadialBuildSpec::new(
            vec![0.0, 90.0],
            vec![0.0, 120.0, 240.0, 360.0],
            1.0,
            vec![("wall".to_owned(), ComponentSpec::uniform(2, 4, 5.0))],
        )
        .unwrap();
        let opts = BuildOptions {
            num_ribs: 4,
            num_rib_pts: 6,
            ..BuildOptions::default()
        };
        st.construct_invessel_build(&mut kernel, &spec, &opts).unwrap();
        let build = st.construct_invessel_build(&mut kernel, &spec, &opts).unwrap();
        assert_eq!(build.components().len(), 2);
    }
}
