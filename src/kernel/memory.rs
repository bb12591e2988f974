use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use tracing::debug;

use crate::assembly::FacetingRegime;
use crate::error::KernelError;
use crate::invessel::Locus;
use crate::magnets::SweepProfile;
use crate::math::Point3;

use super::{KernelResult, MeshId, ModelingKernel, SolidId, VolumeId};

/// Description of how a construction solid was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolidShape {
    Loft {
        ribs: usize,
        points_per_rib: usize,
    },
    Difference {
        body: Box<SolidShape>,
        tool: Box<SolidShape>,
    },
    Sweep {
        samples: usize,
        section: String,
    },
    WedgeCut {
        source: Box<SolidShape>,
        toroidal_extent: f64,
    },
}

/// An assembly volume and the file it was imported from.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub source: PathBuf,
    pub shape: SolidShape,
}

/// One command as received by [`MemoryKernel`], in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelCommand {
    Loft { ribs: usize },
    Subtract,
    Delete,
    Sweep { samples: usize },
    IntersectWedge { solids: usize },
    ExportStep(PathBuf),
    ImportStep(PathBuf),
    ImprintAll,
    MergeAll,
    MergeSurfaces(VolumeId, VolumeId),
    GroupAdd { name: String, volumes: Vec<VolumeId> },
    BlockCreate { id: u32, volumes: Vec<VolumeId>, material: String },
    FacetExport { path: PathBuf, legacy: bool },
    CadToDagmc { path: PathBuf, solids: usize },
    MeshGenerate { solids: usize },
    ExportMesh(PathBuf),
    ResetAssembly,
}

impl KernelCommand {
    /// Short command name, as used for failure injection.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Loft { .. } => "loft",
            Self::Subtract => "subtract",
            Self::Delete => "delete",
            Self::Sweep { .. } => "sweep",
            Self::IntersectWedge { .. } => "intersect_wedge",
            Self::ExportStep(_) => "export_step",
            Self::ImportStep(_) => "import_step",
            Self::ImprintAll => "imprint_all",
            Self::MergeAll => "merge_all",
            Self::MergeSurfaces(..) => "merge_surfaces",
            Self::GroupAdd { .. } => "group_add",
            Self::BlockCreate { .. } => "block_create",
            Self::FacetExport { .. } => "facet_export",
            Self::CadToDagmc { .. } => "cad_to_dagmc",
            Self::MeshGenerate { .. } => "mesh_generate",
            Self::ExportMesh(_) => "export_mesh",
            Self::ResetAssembly => "reset_assembly",
        }
    }
}

/// A material block as created by [`ModelingKernel::block_create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub material: String,
    pub volumes: BTreeSet<VolumeId>,
}

#[derive(Serialize, Deserialize)]
struct StepManifest {
    solids: Vec<SolidShape>,
}

#[derive(Serialize)]
struct FacetManifest<'a> {
    regime: &'a FacetingRegime,
    imprinted: bool,
    merged: bool,
    volumes: Vec<VolumeId>,
    merged_surfaces: &'a [(VolumeId, VolumeId)],
    groups: &'a BTreeMap<String, BTreeSet<VolumeId>>,
    blocks: &'a BTreeMap<u32, Block>,
}

#[derive(Serialize)]
struct SurfaceMeshManifest<'a> {
    min_mesh_size: f64,
    max_mesh_size: f64,
    materials: Vec<&'a str>,
    solids: Vec<SolidShape>,
}

#[derive(Serialize)]
struct MeshManifest {
    elements: &'static str,
    solids: Vec<SolidShape>,
}

/// In-process modeling session that records geometry by construction
/// history instead of evaluating it.
///
/// Construction solids live in a slotmap arena. STEP files are written as
/// JSON manifests of the solids they hold, so an export followed by an
/// import round-trips through the filesystem like a real kernel would.
/// Volume ids are issued from 1 upward on import.
#[derive(Debug)]
pub struct MemoryKernel {
    solids: SlotMap<SolidId, SolidShape>,
    meshes: SlotMap<MeshId, Vec<SolidId>>,
    volumes: BTreeMap<VolumeId, VolumeRecord>,
    next_volume: u32,
    imprinted: bool,
    merged: bool,
    merged_surfaces: Vec<(VolumeId, VolumeId)>,
    groups: BTreeMap<String, BTreeSet<VolumeId>>,
    blocks: BTreeMap<u32, Block>,
    commands: Vec<KernelCommand>,
    fail_on: Option<&'static str>,
}

impl Default for MemoryKernel {
    fn default() -> Self {
        Self {
            solids: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            volumes: BTreeMap::new(),
            next_volume: 1,
            imprinted: false,
            merged: false,
            merged_surfaces: Vec::new(),
            groups: BTreeMap::new(),
            blocks: BTreeMap::new(),
            commands: Vec::new(),
            fail_on: None,
        }
    }
}

impl MemoryKernel {
    /// Creates a new, empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later command named `command` fail.
    pub fn fail_on(&mut self, command: &'static str) {
        self.fail_on = Some(command);
    }

    /// Every command received so far, in order.
    #[must_use]
    pub fn commands(&self) -> &[KernelCommand] {
        &self.commands
    }

    /// The construction history of a live solid.
    #[must_use]
    pub fn solid(&self, id: SolidId) -> Option<&SolidShape> {
        self.solids.get(id)
    }

    /// Number of live construction solids.
    #[must_use]
    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    /// Assembly volumes by id.
    #[must_use]
    pub fn volumes(&self) -> &BTreeMap<VolumeId, VolumeRecord> {
        &self.volumes
    }

    /// Named volume groups.
    #[must_use]
    pub fn groups(&self) -> &BTreeMap<String, BTreeSet<VolumeId>> {
        &self.groups
    }

    /// Material blocks by id.
    #[must_use]
    pub fn blocks(&self) -> &BTreeMap<u32, Block> {
        &self.blocks
    }

    /// Volume pairs whose boundary surfaces were merged individually.
    #[must_use]
    pub fn merged_surfaces(&self) -> &[(VolumeId, VolumeId)] {
        &self.merged_surfaces
    }

    /// Whether `imprint_all` has run since the last reset.
    #[must_use]
    pub fn is_imprinted(&self) -> bool {
        self.imprinted
    }

    /// Whether `merge_all` has run since the last reset.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merged
    }

    fn issue(&mut self, command: KernelCommand) -> KernelResult<()> {
        debug!(command = command.name(), "kernel command");
        if self.fail_on == Some(command.name()) {
            return Err(KernelError::CommandFailed {
                command: command.name(),
                reason: "injected failure".into(),
            });
        }
        self.commands.push(command);
        Ok(())
    }

    fn shape(&self, id: SolidId) -> KernelResult<&SolidShape> {
        self.solids
            .get(id)
            .ok_or_else(|| KernelError::EntityNotFound("solid".into()))
    }

    fn check_volumes(&self, volumes: &[VolumeId]) -> KernelResult<()> {
        match volumes.iter().find(|v| !self.volumes.contains_key(v)) {
            Some(missing) => Err(KernelError::EntityNotFound(format!("volume {missing}"))),
            None => Ok(()),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> KernelResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).map_err(|source| KernelError::File {
        path: path.to_path_buf(),
        source,
    })
}

impl ModelingKernel for MemoryKernel {
    fn loft(&mut self, ribs: &[Locus]) -> KernelResult<SolidId> {
        self.issue(KernelCommand::Loft { ribs: ribs.len() })?;
        if ribs.len() < 2 {
            return Err(KernelError::CommandFailed {
                command: "loft",
                reason: "at least two ribs are required".into(),
            });
        }
        let points_per_rib = ribs[0].points.len();
        if points_per_rib < 3 || ribs.iter().any(|r| r.points.len() != points_per_rib) {
            return Err(KernelError::CommandFailed {
                command: "loft",
                reason: "ribs must share a point count of at least three".into(),
            });
        }
        Ok(self.solids.insert(SolidShape::Loft {
            ribs: ribs.len(),
            points_per_rib,
        }))
    }

    fn subtract(&mut self, body: SolidId, tool: SolidId) -> KernelResult<SolidId> {
        self.issue(KernelCommand::Subtract)?;
        let shape = SolidShape::Difference {
            body: Box::new(self.shape(body)?.clone()),
            tool: Box::new(self.shape(tool)?.clone()),
        };
        Ok(self.solids.insert(shape))
    }

    fn delete(&mut self, solid: SolidId) -> KernelResult<()> {
        self.issue(KernelCommand::Delete)?;
        self.solids
            .remove(solid)
            .map(|_| ())
            .ok_or_else(|| KernelError::EntityNotFound("solid".into()))
    }

    fn sweep(&mut self, path: &[Point3], profile: &SweepProfile) -> KernelResult<SolidId> {
        self.issue(KernelCommand::Sweep {
            samples: path.len(),
        })?;
        if path.len() < 4 {
            return Err(KernelError::CommandFailed {
                command: "sweep",
                reason: "path needs at least three distinct points".into(),
            });
        }
        Ok(self.solids.insert(SolidShape::Sweep {
            samples: path.len(),
            section: profile.section.to_string(),
        }))
    }

    fn intersect_wedge(
        &mut self,
        solids: &[SolidId],
        toroidal_extent: f64,
        radial_extent: f64,
    ) -> KernelResult<Vec<SolidId>> {
        self.issue(KernelCommand::IntersectWedge {
            solids: solids.len(),
        })?;
        if radial_extent <= 0.0 {
            return Err(KernelError::CommandFailed {
                command: "intersect_wedge",
                reason: format!("wedge radius must be positive, got {radial_extent}"),
            });
        }
        let mut trimmed = Vec::with_capacity(solids.len());
        for &id in solids {
            let source = self
                .solids
                .remove(id)
                .ok_or_else(|| KernelError::EntityNotFound("solid".into()))?;
            trimmed.push(self.solids.insert(SolidShape::WedgeCut {
                source: Box::new(source),
                toroidal_extent,
            }));
        }
        Ok(trimmed)
    }

    fn export_step(&mut self, solids: &[SolidId], path: &Path) -> KernelResult<()> {
        self.issue(KernelCommand::ExportStep(path.to_path_buf()))?;
        let manifest = StepManifest {
            solids: solids
                .iter()
                .map(|&id| self.shape(id).cloned())
                .collect::<KernelResult<_>>()?,
        };
        write_json(path, &manifest)
    }

    fn import_step(&mut self, path: &Path) -> KernelResult<Vec<VolumeId>> {
        self.issue(KernelCommand::ImportStep(path.to_path_buf()))?;
        let text = fs::read_to_string(path).map_err(|source| KernelError::File {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: StepManifest = serde_json::from_str(&text)?;

        let mut ids = Vec::with_capacity(manifest.solids.len());
        for shape in manifest.solids {
            let id = VolumeId(self.next_volume);
            self.next_volume += 1;
            self.volumes.insert(
                id,
                VolumeRecord {
                    source: path.to_path_buf(),
                    shape,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn imprint_all(&mut self) -> KernelResult<()> {
        self.issue(KernelCommand::ImprintAll)?;
        self.imprinted = true;
        Ok(())
    }

    fn merge_all(&mut self) -> KernelResult<()> {
        self.issue(KernelCommand::MergeAll)?;
        self.merged = true;
        Ok(())
    }

    fn merge_surfaces(&mut self, inner: VolumeId, outer: VolumeId) -> KernelResult<bool> {
        self.issue(KernelCommand::MergeSurfaces(inner, outer))?;
        self.check_volumes(&[inner, outer])?;
        if inner == outer || self.merged_surfaces.contains(&(inner, outer)) {
            return Ok(false);
        }
        self.merged_surfaces.push((inner, outer));
        Ok(true)
    }

    fn group_add(&mut self, name: &str, volumes: &[VolumeId]) -> KernelResult<()> {
        self.issue(KernelCommand::GroupAdd {
            name: name.to_owned(),
            volumes: volumes.to_vec(),
        })?;
        self.check_volumes(volumes)?;
        self.groups
            .entry(name.to_owned())
            .or_default()
            .extend(volumes.iter().copied());
        Ok(())
    }

    fn block_create(&mut self, id: u32, volumes: &[VolumeId], material: &str) -> KernelResult<()> {
        self.issue(KernelCommand::BlockCreate {
            id,
            volumes: volumes.to_vec(),
            material: material.to_owned(),
        })?;
        self.check_volumes(volumes)?;
        if self.blocks.contains_key(&id) {
            return Err(KernelError::CommandFailed {
                command: "block_create",
                reason: format!("block {id} already exists"),
            });
        }
        self.blocks.insert(
            id,
            Block {
                material: material.to_owned(),
                volumes: volumes.iter().copied().collect(),
            },
        );
        Ok(())
    }

    fn facet_export(&mut self, regime: &FacetingRegime, path: &Path) -> KernelResult<()> {
        self.issue(KernelCommand::FacetExport {
            path: path.to_path_buf(),
            legacy: matches!(regime, FacetingRegime::Legacy { .. }),
        })?;
        if self.volumes.is_empty() {
            return Err(KernelError::CommandFailed {
                command: "facet_export",
                reason: "assembly has no volumes".into(),
            });
        }
        let manifest = FacetManifest {
            regime,
            imprinted: self.imprinted,
            merged: self.merged,
            volumes: self.volumes.keys().copied().collect(),
            merged_surfaces: &self.merged_surfaces,
            groups: &self.groups,
            blocks: &self.blocks,
        };
        write_json(path, &manifest)
    }

    fn cad_to_dagmc(
        &mut self,
        solids: &[(SolidId, &str)],
        mesh_size: (f64, f64),
        path: &Path,
    ) -> KernelResult<()> {
        self.issue(KernelCommand::CadToDagmc {
            path: path.to_path_buf(),
            solids: solids.len(),
        })?;
        let (min_mesh_size, max_mesh_size) = mesh_size;
        if !(min_mesh_size > 0.0 && min_mesh_size <= max_mesh_size) {
            return Err(KernelError::CommandFailed {
                command: "cad_to_dagmc",
                reason: format!("invalid mesh size range [{min_mesh_size}, {max_mesh_size}]"),
            });
        }
        let manifest = SurfaceMeshManifest {
            min_mesh_size,
            max_mesh_size,
            materials: solids.iter().map(|&(_, tag)| tag).collect(),
            solids: solids
                .iter()
                .map(|&(id, _)| self.shape(id).cloned())
                .collect::<KernelResult<_>>()?,
        };
        write_json(path, &manifest)
    }

    fn mesh_generate(&mut self, solids: &[SolidId]) -> KernelResult<MeshId> {
        self.issue(KernelCommand::MeshGenerate {
            solids: solids.len(),
        })?;
        for &id in solids {
            self.shape(id)?;
        }
        Ok(self.meshes.insert(solids.to_vec()))
    }

    fn export_mesh(&mut self, mesh: MeshId, path: &Path) -> KernelResult<()> {
        self.issue(KernelCommand::ExportMesh(path.to_path_buf()))?;
        let solids = self
            .meshes
            .get(mesh)
            .ok_or_else(|| KernelError::EntityNotFound("mesh".into()))?;
        let manifest = MeshManifest {
            elements: "tet4",
            solids: solids
                .iter()
                .map(|&id| self.shape(id).cloned())
                .collect::<KernelResult<_>>()?,
        };
        write_json(path, &manifest)
    }

    fn reset_assembly(&mut self) -> KernelResult<()> {
        self.issue(KernelCommand::ResetAssembly)?;
        self.volumes.clear();
        self.next_volume = 1;
        self.imprinted = false;
        self.merged = false;
        self.merged_surfaces.clear();
        self.groups.clear();
        self.blocks.clear();
        Ok(())
    }
}
