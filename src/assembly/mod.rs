//! Neutronics model assembly.
//!
//! Imports the exported solids into the kernel session, resolves their
//! shared boundaries, tags materials and writes the faceted model. The
//! order of these steps is enforced by [`AssemblyCoordinator`]'s stage
//! types.

mod coordinator;
mod faceting;

pub use coordinator::{
    check_exports, legacy_group, stage, AssemblyCoordinator, AssemblyEntry, AssemblyState, ExportReport,
    VolumeOrigin,
};
pub use faceting::{FacetingRegime, Resolution, DEFAULT_ANISOTROPIC_RATIO, DEFAULT_DEVIATION_ANGLE};

use std::path::PathBuf;

use crate::config::output_path;
use crate::error::Result;
use crate::invessel::InVesselBuild;
use crate::kernel::ModelingKernel;
use crate::magnets::MagnetSet;

/// Options for one neutronics export, fixed before the export starts.
#[derive(Debug, Clone, PartialEq)]
pub struct DagmcExport {
    pub resolution: Resolution,
    pub faceting: FacetingRegime,
    /// Output file name; `.h5m` is appended when missing.
    pub filename: String,
    pub export_dir: PathBuf,
}

impl Default for DagmcExport {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            faceting: FacetingRegime::default(),
            filename: "dagmc".into(),
            export_dir: PathBuf::new(),
        }
    }
}

/// Runs a complete export from an empty assembly.
///
/// The output name and the STEP exports are checked before the kernel is
/// touched.
///
/// # Errors
///
/// Returns a configuration error for a bad output name or missing STEP
/// exports, and propagates kernel failures.
pub fn run<K: ModelingKernel>(
    kernel: &mut K,
    build: Option<&InVesselBuild>,
    magnets: Option<&MagnetSet>,
    options: &DagmcExport,
) -> Result<ExportReport> {
    let path = output_path(&options.export_dir, &options.filename, "h5m")?;
    check_exports(build, magnets)?;
    AssemblyCoordinator::begin(kernel)?
        .import(build, magnets)?
        .resolve(options.resolution)?
        .tag(options.faceting.clone())?
        .export(&path)
}
