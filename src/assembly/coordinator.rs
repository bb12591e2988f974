use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ConfigurationError, KernelError, Result};
use crate::invessel::InVesselBuild;
use crate::kernel::{ModelingKernel, VolumeId};
use crate::magnets::MagnetSet;

use super::{FacetingRegime, Resolution};

/// Where an assembly volume came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeOrigin {
    Component { name: String, layer: usize },
    Magnet { index: usize },
}

/// One imported volume with its provenance and material tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyEntry {
    pub volume: VolumeId,
    pub origin: VolumeOrigin,
    pub material: String,
}

/// Volume provenance for one export run. Built during import and dropped
/// once the export completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyState {
    entries: Vec<AssemblyEntry>,
}

impl AssemblyState {
    /// Entries in import order: components by layer, then magnets.
    #[must_use]
    pub fn entries(&self) -> &[AssemblyEntry] {
        &self.entries
    }

    /// Component volumes in layer order.
    #[must_use]
    pub fn component_volumes(&self) -> Vec<VolumeId> {
        self.entries
            .iter()
            .filter(|e| matches!(e.origin, VolumeOrigin::Component { .. }))
            .map(|e| e.volume)
            .collect()
    }

    /// Volumes by material tag.
    #[must_use]
    pub fn materials(&self) -> BTreeMap<String, BTreeSet<VolumeId>> {
        let mut map: BTreeMap<String, BTreeSet<VolumeId>> = BTreeMap::new();
        for e in &self.entries {
            map.entry(e.material.clone()).or_default().insert(e.volume);
        }
        map
    }

    /// Material tag of each volume.
    #[must_use]
    pub fn volume_materials(&self) -> BTreeMap<VolumeId, &str> {
        self.entries
            .iter()
            .map(|e| (e.volume, e.material.as_str()))
            .collect()
    }
}

/// Stage markers of [`AssemblyCoordinator`].
pub mod stage {
    /// Nothing imported yet.
    #[derive(Debug)]
    pub struct Empty;
    /// Volumes imported, boundaries not yet resolved.
    #[derive(Debug)]
    pub struct Imported;
    /// Boundaries imprinted and merged, or adjacent layers merged.
    #[derive(Debug)]
    pub struct Resolved;
    /// Materials tagged; ready to facet.
    #[derive(Debug)]
    pub struct Tagged;
}

use stage::{Empty, Imported, Resolved, Tagged};

/// Result of a completed neutronics export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub faceting: FacetingRegime,
    pub state: AssemblyState,
}

impl ExportReport {
    /// Tag of each volume, the grouping decision an export makes.
    #[must_use]
    pub fn volume_materials(&self) -> BTreeMap<VolumeId, &str> {
        self.state.volume_materials()
    }

    /// Names of the groups a legacy export creates, or the material names
    /// bound to blocks in a native export.
    #[must_use]
    pub fn material_names(&self) -> Vec<String> {
        let materials = self.state.materials().into_keys();
        if self.faceting.is_legacy() {
            materials.map(|tag| legacy_group(&tag)).collect()
        } else {
            materials.collect()
        }
    }
}

/// Group name used by legacy tagging.
#[must_use]
pub fn legacy_group(tag: &str) -> String {
    format!("mat:{tag}")
}

/// Drives one neutronics export through its stages:
/// `Empty -> Imported -> Resolved -> Tagged -> exported`.
///
/// Each stage transition consumes the coordinator, so stages cannot be
/// skipped, repeated or reordered, and a finished export cannot be
/// resumed. The coordinator is the only writer to the kernel session while
/// it lives.
#[derive(Debug)]
pub struct AssemblyCoordinator<'a, K: ModelingKernel, S> {
    kernel: &'a mut K,
    build: Option<&'a InVesselBuild>,
    state: AssemblyState,
    resolution: Resolution,
    faceting: FacetingRegime,
    stage: PhantomData<S>,
}

impl<'a, K: ModelingKernel, S> AssemblyCoordinator<'a, K, S> {
    /// Provenance recorded so far.
    #[must_use]
    pub fn state(&self) -> &AssemblyState {
        &self.state
    }

    fn advance<T>(self) -> AssemblyCoordinator<'a, K, T> {
        AssemblyCoordinator {
            kernel: self.kernel,
            build: self.build,
            state: self.state,
            resolution: self.resolution,
            faceting: self.faceting,
            stage: PhantomData,
        }
    }
}

impl<'a, K: ModelingKernel> AssemblyCoordinator<'a, K, Empty> {
    /// Starts a fresh assembly, clearing volumes, groups and blocks left in
    /// the session by any earlier export.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel cannot reset its assembly.
    pub fn begin(kernel: &'a mut K) -> Result<Self> {
        kernel.reset_assembly()?;
        Ok(Self {
            kernel,
            build: None,
            state: AssemblyState::default(),
            resolution: Resolution::default(),
            faceting: FacetingRegime::default(),
            stage: PhantomData,
        })
    }

    /// Imports each component's STEP file, in layer order, then the magnet
    /// STEP file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingStep`] if something was not
    /// exported, [`KernelError::UnexpectedVolumeCount`] if an import does
    /// not yield one volume per solid, or any kernel failure.
    pub fn import(
        mut self,
        build: Option<&'a InVesselBuild>,
        magnets: Option<&MagnetSet>,
    ) -> Result<AssemblyCoordinator<'a, K, Imported>> {
        check_exports(build, magnets)?;

        if let Some(build) = build {
            info!("importing in-vessel components");
            for component in build.components() {
                let path = component
                    .step_path()
                    .ok_or_else(|| ConfigurationError::MissingStep(component.name().to_owned()))?;
                let volume = import_exact(self.kernel, path, component.name(), 1)?[0];
                self.state.entries.push(AssemblyEntry {
                    volume,
                    origin: VolumeOrigin::Component {
                        name: component.name().to_owned(),
                        layer: component.layer(),
                    },
                    material: component.material().to_owned(),
                });
            }
        }

        if let Some(magnets) = magnets {
            info!("importing magnet coils");
            let path = magnets
                .step_path()
                .ok_or_else(|| ConfigurationError::MissingStep("magnets".into()))?;
            let volumes = import_exact(self.kernel, path, "magnets", magnets.solids().len())?;
            for (index, volume) in volumes.into_iter().enumerate() {
                self.state.entries.push(AssemblyEntry {
                    volume,
                    origin: VolumeOrigin::Magnet { index },
                    material: magnets.material().to_owned(),
                });
            }
        }

        self.build = build;
        Ok(self.advance())
    }
}

/// Checks that there is something to assemble and that every part has
/// been exported to STEP. Issues no kernel commands.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidValue`] if both parts are absent,
/// or [`ConfigurationError::MissingStep`] naming the first part without a
/// STEP file.
pub fn check_exports(build: Option<&InVesselBuild>, magnets: Option<&MagnetSet>) -> Result<()> {
    if build.is_none() && magnets.is_none() {
        return Err(ConfigurationError::InvalidValue {
            option: "dagmc_export",
            reason: "there are no in-vessel components or magnets to export".into(),
        }
        .into());
    }
    if let Some(component) = build
        .into_iter()
        .flat_map(InVesselBuild::components)
        .find(|c| c.step_path().is_none())
    {
        return Err(ConfigurationError::MissingStep(component.name().to_owned()).into());
    }
    if magnets.is_some_and(|m| m.step_path().is_none()) {
        return Err(ConfigurationError::MissingStep("magnets".into()).into());
    }
    Ok(())
}

fn import_exact<K: ModelingKernel>(
    kernel: &mut K,
    path: &Path,
    name: &str,
    expected: usize,
) -> Result<Vec<VolumeId>> {
    let volumes = kernel.import_step(path)?;
    if volumes.len() != expected {
        return Err(KernelError::UnexpectedVolumeCount {
            name: name.to_owned(),
            count: volumes.len(),
            expected,
        }
        .into());
    }
    Ok(volumes)
}

impl<'a, K: ModelingKernel> AssemblyCoordinator<'a, K, Imported> {
    /// Resolves shared boundaries with exactly one strategy.
    ///
    /// # Errors
    ///
    /// Propagates kernel failures.
    pub fn resolve(mut self, resolution: Resolution) -> Result<AssemblyCoordinator<'a, K, Resolved>> {
        match resolution {
            Resolution::ImprintMerge => {
                info!("imprinting and merging all volumes");
                self.kernel.imprint_all()?;
                self.kernel.merge_all()?;
            }
            Resolution::MergeLayerSurfaces => match self.build {
                Some(build) => {
                    info!("merging adjacent in-vessel layer surfaces");
                    let volumes = self.state.component_volumes();
                    build.merge_layer_surfaces(self.kernel, &volumes)?;
                }
                None => warn!("no in-vessel layers to merge; skipping boundary resolution"),
            },
        }
        self.resolution = resolution;
        Ok(self.advance())
    }
}

impl<'a, K: ModelingKernel> AssemblyCoordinator<'a, K, Resolved> {
    /// Applies material classification in the mode tied to `faceting`:
    /// `mat:<tag>` groups for legacy faceting, material blocks for native
    /// faceting. The mode is fixed for the rest of the export.
    ///
    /// Native block ids are the smallest volume id carrying the tag, which
    /// for a single-volume component is its own id.
    ///
    /// # Errors
    ///
    /// Propagates kernel failures.
    pub fn tag(mut self, faceting: FacetingRegime) -> Result<AssemblyCoordinator<'a, K, Tagged>> {
        info!(legacy = faceting.is_legacy(), "tagging materials");
        for (tag, volumes) in self.state.materials() {
            let volumes: Vec<VolumeId> = volumes.into_iter().collect();
            if faceting.is_legacy() {
                self.kernel.group_add(&legacy_group(&tag), &volumes)?;
            } else if let Some(&VolumeId(block)) = volumes.first() {
                self.kernel.block_create(block, &volumes, &tag)?;
            }
        }
        self.faceting = faceting;
        Ok(self.advance())
    }
}

impl<K: ModelingKernel> AssemblyCoordinator<'_, K, Tagged> {
    /// Facets and writes the assembly. This ends the export.
    ///
    /// # Errors
    ///
    /// Propagates kernel failures.
    pub fn export(self, path: &Path) -> Result<ExportReport> {
        info!(path = %path.display(), "exporting neutronics model");
        self.kernel.facet_export(&self.faceting, path)?;
        Ok(ExportReport {
            path: path.to_path_buf(),
            resolution: self.resolution,
            faceting: self.faceting,
            state: self.state,
        })
    }
}
