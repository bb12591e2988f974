//! Command interface to the solid-modeling kernel.
//!
//! Lofting, sweeping, booleans, imprint/merge and tessellation happen in an
//! external kernel. The pipeline drives it as a command sink through
//! [`ModelingKernel`] and only ever looks at the identifiers it hands back.
//! A kernel session is shared mutable state; every call takes it by `&mut`
//! so a single writer is enforced by the borrow checker.

mod memory;

pub use memory::{Block, KernelCommand, MemoryKernel, SolidShape, VolumeRecord};

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assembly::FacetingRegime;
use crate::error::KernelError;
use crate::invessel::Locus;
use crate::magnets::SweepProfile;
use crate::math::Point3;

slotmap::new_key_type! {
    /// Handle to a construction solid living in the kernel session.
    pub struct SolidId;
}

slotmap::new_key_type! {
    /// Handle to a volume mesh generated by the kernel.
    pub struct MeshId;
}

/// Identifier of an assembly volume, as numbered by the kernel on import.
///
/// Ids are only meaningful within one session and are not stable across
/// runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u32);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result type for kernel commands.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// The set of commands the pipeline issues to a modeling kernel.
///
/// Implementations block until each command completes. Failures are
/// reported verbatim and never retried by the caller.
pub trait ModelingKernel {
    /// Lofts a closed solid through an ordered sequence of closed ribs.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel cannot build the loft.
    fn loft(&mut self, ribs: &[Locus]) -> KernelResult<SolidId>;

    /// Creates `body - tool` as a new solid. Both inputs stay alive.
    ///
    /// # Errors
    ///
    /// Returns an error if either solid is unknown or the boolean fails.
    fn subtract(&mut self, body: SolidId, tool: SolidId) -> KernelResult<SolidId>;

    /// Removes a construction solid from the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the solid is unknown.
    fn delete(&mut self, solid: SolidId) -> KernelResult<()>;

    /// Sweeps a profile along a closed path.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel cannot build the sweep.
    fn sweep(&mut self, path: &[Point3], profile: &SweepProfile) -> KernelResult<SolidId>;

    /// Intersects each solid with the wedge spanning `[0, toroidal_extent]`
    /// degrees about the z axis, out to `radial_extent`. The inputs are
    /// consumed and the trimmed solids returned in the same order.
    ///
    /// # Errors
    ///
    /// Returns an error if any solid is unknown or the boolean fails.
    fn intersect_wedge(
        &mut self,
        solids: &[SolidId],
        toroidal_extent: f64,
        radial_extent: f64,
    ) -> KernelResult<Vec<SolidId>>;

    /// Writes the given solids to a STEP file.
    ///
    /// # Errors
    ///
    /// Returns an error if a solid is unknown or the file cannot be written.
    fn export_step(&mut self, solids: &[SolidId], path: &Path) -> KernelResult<()>;

    /// Imports a STEP file into the assembly, one volume per solid.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    fn import_step(&mut self, path: &Path) -> KernelResult<Vec<VolumeId>>;

    /// Imprints every assembly volume on every other.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel command fails.
    fn imprint_all(&mut self) -> KernelResult<()>;

    /// Merges every coincident surface in the assembly.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel command fails.
    fn merge_all(&mut self) -> KernelResult<()>;

    /// Merges the outer boundary surface of `inner` with the inner boundary
    /// surface of `outer`. Returns whether a merge took place.
    ///
    /// # Errors
    ///
    /// Returns an error if either volume is unknown.
    fn merge_surfaces(&mut self, inner: VolumeId, outer: VolumeId) -> KernelResult<bool>;

    /// Adds volumes to a named group, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume is unknown.
    fn group_add(&mut self, name: &str, volumes: &[VolumeId]) -> KernelResult<()>;

    /// Creates material block `id` holding `volumes`, bound to `material`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block already exists or a volume is unknown.
    fn block_create(&mut self, id: u32, volumes: &[VolumeId], material: &str) -> KernelResult<()>;

    /// Facets the tagged assembly and writes the neutronics model.
    ///
    /// # Errors
    ///
    /// Returns an error if faceting or writing fails.
    fn facet_export(&mut self, regime: &FacetingRegime, path: &Path) -> KernelResult<()>;

    /// Surface-meshes construction solids directly into a neutronics model,
    /// bypassing the assembly session. Each solid is paired with its
    /// material tag; element edge lengths are bounded by `mesh_size`
    /// as `(min, max)`.
    ///
    /// # Errors
    ///
    /// Returns an error if a solid is unknown, meshing fails or the file
    /// cannot be written.
    fn cad_to_dagmc(
        &mut self,
        solids: &[(SolidId, &str)],
        mesh_size: (f64, f64),
        path: &Path,
    ) -> KernelResult<()>;

    /// Generates a tetrahedral volume mesh of the given solids.
    ///
    /// # Errors
    ///
    /// Returns an error if a solid is unknown or meshing fails.
    fn mesh_generate(&mut self, solids: &[SolidId]) -> KernelResult<MeshId>;

    /// Writes a generated mesh to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh is unknown or the file cannot be written.
    fn export_mesh(&mut self, mesh: MeshId, path: &Path) -> KernelResult<()>;

    /// Drops every assembly volume, group and block so that a new assembly
    /// starts from an empty state. Construction solids are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel command fails.
    fn reset_assembly(&mut self) -> KernelResult<()>;
}
