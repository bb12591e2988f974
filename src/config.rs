//! TOML run configuration and output naming.
//!
//! Every section is an explicit, closed set of options; unknown keys are
//! rejected at parse time. Sections convert into the immutable option
//! structs of the pipeline before any geometry work starts.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::Deserialize;
use tracing::warn;

use crate::assembly::{
    DagmcExport, FacetingRegime, Resolution, DEFAULT_ANISOTROPIC_RATIO, DEFAULT_DEVIATION_ANGLE,
};
use crate::error::{ConfigurationError, Result, ValidationError};
use crate::invessel::{BuildOptions, CadToDagmc, ComponentSpec, RadialBuildSpec, M2CM};
use crate::magnets::{CrossSection, MagnetOptions, ShapeParam};
use crate::source_mesh::SourceMeshParams;

/// Checks `filename` against the expected extension and returns it with
/// the extension present.
///
/// # Errors
///
/// Returns [`ConfigurationError::FileExtension`] if the name carries a
/// different extension.
pub fn check_extension(
    filename: &str,
    expected: &'static str,
) -> std::result::Result<PathBuf, ConfigurationError> {
    let path = PathBuf::from(filename);
    let found = match path.extension() {
        None => return Ok(path.with_extension(expected)),
        Some(ext) if ext == expected => return Ok(path),
        Some(ext) => ext.to_string_lossy().into_owned(),
    };
    Err(ConfigurationError::FileExtension {
        path,
        found,
        expected,
    })
}

/// Resolves an output file inside `export_dir`, creating the directory.
///
/// # Errors
///
/// Returns a configuration error for a foreign extension, or an I/O error
/// if the directory cannot be created.
pub fn output_path(export_dir: &Path, filename: &str, extension: &'static str) -> Result<PathBuf> {
    let name = check_extension(filename, extension)?;
    if !export_dir.as_os_str().is_empty() {
        fs::create_dir_all(export_dir)?;
    }
    Ok(export_dir.join(name))
}

/// Resolves `<stem>.<extension>` inside `export_dir`, creating the
/// directory. Dots in `stem` are kept as part of the name.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn named_output(export_dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    if !export_dir.as_os_str().is_empty() {
        fs::create_dir_all(export_dir)?;
    }
    Ok(export_dir.join(format!("{stem}.{extension}")))
}

fn default_num_ribs() -> usize {
    61
}

fn default_scale() -> f64 {
    M2CM
}

fn default_start_line() -> usize {
    3
}

fn default_sample_mod() -> usize {
    1
}

fn default_magnet_tag() -> String {
    "magnets".into()
}

fn default_magnet_step() -> String {
    "magnets".into()
}

fn default_magnet_mesh() -> String {
    "magnet_mesh".into()
}

fn default_source_mesh() -> String {
    "source_mesh".into()
}

fn default_dagmc() -> String {
    "dagmc".into()
}

fn default_min_mesh_size() -> f64 {
    5.0
}

fn default_max_mesh_size() -> f64 {
    20.0
}

fn default_true() -> bool {
    true
}

/// A whole pipeline run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StellaratorConfig {
    /// Directory for every output file.
    #[serde(default)]
    pub export_dir: PathBuf,
    pub invessel_build: Option<InVesselBuildConfig>,
    pub magnet_coils: Option<MagnetCoilsConfig>,
    pub source_mesh: Option<SourceMeshConfig>,
    pub dagmc_export: Option<DagmcExportConfig>,
}

impl StellaratorConfig {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Toml`] for malformed input or unknown
    /// keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(ConfigurationError::from)?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or any error of
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }
}

/// One in-vessel component, in radial order within the list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    pub name: String,
    /// Rows follow toroidal angles, columns poloidal angles; cm.
    pub thickness_matrix: Vec<Vec<f64>>,
    pub mat_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InVesselBuildConfig {
    pub toroidal_angles: Vec<f64>,
    pub poloidal_angles: Vec<f64>,
    pub wall_s: f64,
    #[serde(default)]
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub repeat: usize,
    #[serde(default = "default_num_ribs")]
    pub num_ribs: usize,
    #[serde(default = "default_num_ribs")]
    pub num_rib_pts: usize,
    #[serde(default = "default_scale")]
    pub scale: f64,
    pub plasma_mat_tag: Option<String>,
    pub sol_mat_tag: Option<String>,
    /// Also write an in-vessel-only neutronics model via CAD-to-DAGMC.
    #[serde(default)]
    pub export_cad_to_dagmc: bool,
    #[serde(default = "default_dagmc")]
    pub dagmc_filename: String,
    #[serde(default = "default_min_mesh_size")]
    pub min_mesh_size: f64,
    #[serde(default = "default_max_mesh_size")]
    pub max_mesh_size: f64,
}

impl InVesselBuildConfig {
    /// Builds the validated radial build.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for ragged or mis-sized thickness
    /// matrices and any other radial-build violation.
    pub fn radial_build(&self) -> std::result::Result<RadialBuildSpec, ValidationError> {
        let rows = self.toroidal_angles.len();
        let cols = self.poloidal_angles.len();
        let components = self
            .components
            .iter()
            .map(|c| {
                let matrix = &c.thickness_matrix;
                if let Some(bad) = matrix.iter().find(|row| row.len() != cols) {
                    return Err(ValidationError::GridShape {
                        component: c.name.clone(),
                        rows: matrix.len(),
                        cols: bad.len(),
                        expected_rows: rows,
                        expected_cols: cols,
                    });
                }
                let thickness = DMatrix::from_fn(matrix.len(), cols, |i, j| matrix[i][j]);
                let spec = ComponentSpec {
                    thickness,
                    material: c.mat_tag.clone(),
                };
                Ok((c.name.clone(), spec))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        RadialBuildSpec::new(
            self.toroidal_angles.clone(),
            self.poloidal_angles.clone(),
            self.wall_s,
            components,
        )
    }

    #[must_use]
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            repeat: self.repeat,
            num_ribs: self.num_ribs,
            num_rib_pts: self.num_rib_pts,
            scale: self.scale,
            plasma_mat_tag: self.plasma_mat_tag.clone(),
            sol_mat_tag: self.sol_mat_tag.clone(),
        }
    }

    /// CAD-to-DAGMC options, when that export is enabled.
    #[must_use]
    pub fn cad_to_dagmc(&self) -> Option<CadToDagmc> {
        self.export_cad_to_dagmc.then(|| CadToDagmc {
            filename: self.dagmc_filename.clone(),
            min_mesh_size: self.min_mesh_size,
            max_mesh_size: self.max_mesh_size,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MagnetCoilsConfig {
    pub coils_file: PathBuf,
    /// `["circle", radius]` or `["rectangle", width, thickness]`, cm.
    pub cross_section: Vec<ShapeParam>,
    /// Degrees.
    pub toroidal_extent: f64,
    #[serde(default = "default_start_line")]
    pub start_line: usize,
    #[serde(default = "default_sample_mod")]
    pub sample_mod: usize,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_magnet_tag")]
    pub mat_tag: String,
    #[serde(default = "default_magnet_step")]
    pub step_filename: String,
    #[serde(default)]
    pub export_mesh: bool,
    #[serde(default = "default_magnet_mesh")]
    pub mesh_filename: String,
}

impl MagnetCoilsConfig {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::CrossSection`] for a malformed list.
    pub fn cross_section(&self) -> std::result::Result<CrossSection, ConfigurationError> {
        CrossSection::from_params(&self.cross_section)
    }

    #[must_use]
    pub fn options(&self) -> MagnetOptions {
        MagnetOptions {
            start_line: self.start_line,
            sample_mod: self.sample_mod,
            scale: self.scale,
            mat_tag: self.mat_tag.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceMeshConfig {
    pub num_s: usize,
    pub num_theta: usize,
    pub num_phi: usize,
    /// Degrees.
    pub toroidal_extent: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default = "default_source_mesh")]
    pub filename: String,
}

impl SourceMeshConfig {
    #[must_use]
    pub fn params(&self) -> SourceMeshParams {
        SourceMeshParams {
            num_s: self.num_s,
            num_theta: self.num_theta,
            num_phi: self.num_phi,
            toroidal_extent: self.toroidal_extent,
            scale: self.scale,
        }
    }
}

/// Flat export options as written in a configuration file.
///
/// Both faceting regimes' tolerances may appear; only the selected
/// regime's are kept.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DagmcExportConfig {
    #[serde(default)]
    pub skip_imprint: bool,
    #[serde(default = "default_true")]
    pub legacy_faceting: bool,
    pub faceting_tolerance: Option<f64>,
    pub length_tolerance: Option<f64>,
    pub normal_tolerance: Option<f64>,
    pub anisotropic_ratio: Option<f64>,
    pub deviation_angle: Option<f64>,
    #[serde(default = "default_dagmc")]
    pub filename: String,
}

impl Default for DagmcExportConfig {
    fn default() -> Self {
        Self {
            skip_imprint: false,
            legacy_faceting: true,
            faceting_tolerance: None,
            length_tolerance: None,
            normal_tolerance: None,
            anisotropic_ratio: None,
            deviation_angle: None,
            filename: default_dagmc(),
        }
    }
}

impl DagmcExportConfig {
    /// Selects the faceting regime, dropping the other regime's
    /// parameters with a warning.
    #[must_use]
    pub fn faceting(&self) -> FacetingRegime {
        if self.legacy_faceting {
            if self.anisotropic_ratio.is_some() || self.deviation_angle.is_some() {
                warn!("native faceting parameters are ignored with legacy faceting");
            }
            FacetingRegime::Legacy {
                faceting_tolerance: self.faceting_tolerance,
                length_tolerance: self.length_tolerance,
                normal_tolerance: self.normal_tolerance,
            }
        } else {
            if self.faceting_tolerance.is_some()
                || self.length_tolerance.is_some()
                || self.normal_tolerance.is_some()
            {
                warn!("legacy faceting tolerances are ignored with native faceting");
            }
            FacetingRegime::Native {
                anisotropic_ratio: self.anisotropic_ratio.unwrap_or(DEFAULT_ANISOTROPIC_RATIO),
                deviation_angle: self.deviation_angle.unwrap_or(DEFAULT_DEVIATION_ANGLE),
            }
        }
    }

    #[must_use]
    pub fn export(&self, export_dir: &Path) -> DagmcExport {
        DagmcExport {
            resolution: Resolution::from_skip_imprint(self.skip_imprint),
            faceting: self.faceting(),
            filename: self.filename.clone(),
            export_dir: export_dir.to_path_buf(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ParastellError;

    const FULL: &str = r#"
export_dir = "out"

[invessel_build]
toroidal_angles = [0.0, 45.0, 90.0]
poloidal_angles = [0.0, 120.0, 240.0, 360.0]
wall_s = 1.08
num_ribs = 11
sol_mat_tag = "vacuum"

[[invessel_build.components]]
name = "first_wall"
thickness_matrix = [[5, 5, 5, 5], [5, 5, 5, 5], [5, 5, 5, 5]]

[[invessel_build.components]]
name = "breeder"
thickness_matrix = [[50, 50, 50, 50], [50, 50, 50, 50], [50, 50, 50, 50]]
mat_tag = "lithium"

[magnet_coils]
coils_file = "coils.example"
cross_section = ["rectangle", 20, 40]
toroidal_extent = 90.0
sample_mod = 6

[source_mesh]
num_s = 11
num_theta = 81
num_phi = 61
toroidal_extent = 90.0

[dagmc_export]
legacy_faceting = false
deviation_angle = 3.0
faceting_tolerance = 0.1
"#;

    #[test]
    fn parses_every_section() {
        let cfg = StellaratorConfig::from_toml_str(FULL).unwrap();
        assert_eq!(cfg.export_dir, PathBuf::from("out"));

        let ivb = cfg.invessel_build.unwrap();
        let spec = ivb.radial_build().unwrap();
        let names: Vec<&str> = spec.layers().iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["plasma", "sol", "first_wall", "breeder"]);
        assert_eq!(spec.layer("breeder").unwrap().material(), "lithium");
        let opts = ivb.build_options();
        assert_eq!(opts.num_ribs, 11);
        assert_eq!(opts.num_rib_pts, 61);
        assert_eq!(opts.sol_mat_tag.as_deref(), Some("vacuum"));
        assert!(ivb.cad_to_dagmc().is_none());

        let magnets = cfg.magnet_coils.unwrap();
        assert_eq!(
            magnets.cross_section().unwrap(),
            CrossSection::Rectangle {
                width: 20.0,
                thickness: 40.0
            }
        );
        assert_eq!(magnets.options().sample_mod, 6);
        assert_eq!(magnets.options().start_line, 3);
        assert_eq!(magnets.options().mat_tag, "magnets");
        assert!(!magnets.export_mesh);

        let mesh = cfg.source_mesh.unwrap().params();
        assert_eq!((mesh.num_s, mesh.num_theta, mesh.num_phi), (11, 81, 61));
        assert!((mesh.scale - 100.0).abs() < 1e-12);

        let export = cfg.dagmc_export.unwrap().export(Path::new("out"));
        assert_eq!(export.resolution, Resolution::ImprintMerge);
        assert_eq!(
            export.faceting,
            FacetingRegime::Native {
                anisotropic_ratio: 100.0,
                deviation_angle: 3.0
            }
        );
        assert_eq!(export.filename, "dagmc");
    }

    #[test]
    fn cad_to_dagmc_section_fields() {
        let text = r#"
[invessel_build]
toroidal_angles = [0.0, 90.0]
poloidal_angles = [0.0, 180.0, 360.0]
wall_s = 1.0
export_cad_to_dagmc = true
dagmc_filename = "invessel"
max_mesh_size = 15.0
"#;
        let cfg = StellaratorConfig::from_toml_str(text).unwrap();
        let cad = cfg.invessel_build.unwrap().cad_to_dagmc().unwrap();
        assert_eq!(
            cad,
            CadToDagmc {
                filename: "invessel".into(),
                min_mesh_size: 5.0,
                max_mesh_size: 15.0,
            }
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StellaratorConfig::from_toml_str("[dagmc_export]\nskip_imprnt = true\n").unwrap_err();
        assert!(matches!(
            err,
            ParastellError::Configuration(ConfigurationError::Toml(_))
        ));
        assert!(StellaratorConfig::from_toml_str("verbose = true\n").is_err());
    }

    #[test]
    fn legacy_regime_keeps_only_legacy_tolerances() {
        let cfg = DagmcExportConfig {
            faceting_tolerance: Some(0.1),
            anisotropic_ratio: Some(7.0),
            ..DagmcExportConfig::default()
        };
        assert_eq!(
            cfg.faceting(),
            FacetingRegime::Legacy {
                faceting_tolerance: Some(0.1),
                length_tolerance: None,
                normal_tolerance: None
            }
        );
    }

    #[test]
    fn ragged_thickness_matrix_is_a_shape_error() {
        let cfg = InVesselBuildConfig {
            toroidal_angles: vec![0.0, 90.0],
            poloidal_angles: vec![0.0, 180.0, 360.0],
            wall_s: 1.0,
            components: vec![ComponentConfig {
                name: "wall".into(),
                thickness_matrix: vec![vec![1.0, 1.0, 1.0], vec![1.0, 1.0]],
                mat_tag: None,
            }],
            repeat: 0,
            num_ribs: 61,
            num_rib_pts: 61,
            scale: 100.0,
            plasma_mat_tag: None,
            sol_mat_tag: None,
            export_cad_to_dagmc: false,
            dagmc_filename: "dagmc".into(),
            min_mesh_size: 5.0,
            max_mesh_size: 20.0,
        };
        assert!(matches!(
            cfg.radial_build(),
            Err(ValidationError::GridShape { cols: 2, .. })
        ));
    }

    #[test]
    fn extensions() {
        assert_eq!(check_extension("dagmc", "h5m").unwrap(), PathBuf::from("dagmc.h5m"));
        assert_eq!(check_extension("dagmc.h5m", "h5m").unwrap(), PathBuf::from("dagmc.h5m"));
        assert!(matches!(
            check_extension("dagmc.stl", "h5m"),
            Err(ConfigurationError::FileExtension { ref path, ref found, expected: "h5m" })
                if found == "stl" && path == Path::new("dagmc.stl")
        ));

        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let path = output_path(&nested, "wall", "step").unwrap();
        assert_eq!(path, nested.join("wall.step"));
        assert!(nested.is_dir());
    }
}
