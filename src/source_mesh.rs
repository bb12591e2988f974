//! Structured source-mesh grid in flux coordinates.
//!
//! Vertices are generated plane by plane: toroidal angle outermost, flux
//! label in the middle and poloidal angle innermost. Downstream source
//! tools index the exported vertices by this order, so it must not change.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::output_path;
use crate::equilibrium::Equilibrium;
use crate::error::{ConfigurationError, Result};
use crate::invessel::M2CM;
use crate::math::{linspace, Point3};

/// VTK cell type of a six-node wedge.
const VTK_WEDGE: u8 = 13;

/// VTK cell type of an eight-node hexahedron.
const VTK_HEXAHEDRON: u8 = 12;

/// One source-mesh cell, with node indices in VTK order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshCell {
    /// Cell of the band around the magnetic axis. Both triangles start at
    /// the axis vertex of their toroidal plane.
    Wedge([usize; 6]),
    Hexahedron([usize; 8]),
}

impl MeshCell {
    #[must_use]
    pub fn nodes(&self) -> &[usize] {
        match self {
            Self::Wedge(nodes) => nodes,
            Self::Hexahedron(nodes) => nodes,
        }
    }

    #[must_use]
    pub fn vtk_type(&self) -> u8 {
        match self {
            Self::Wedge(_) => VTK_WEDGE,
            Self::Hexahedron(_) => VTK_HEXAHEDRON,
        }
    }
}

/// Grid dimensions of a source mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeshParams {
    /// Flux surfaces per plane, from the magnetic axis (s = 0) to the last
    /// closed surface (s = 1).
    pub num_s: usize,
    /// Poloidal angles per surface, evenly spaced over a full turn.
    pub num_theta: usize,
    /// Toroidal planes, evenly spaced over `[0, toroidal_extent]`.
    pub num_phi: usize,
    /// Toroidal extent in degrees.
    pub toroidal_extent: f64,
    /// Factor from equilibrium meters to cm.
    pub scale: f64,
}

impl SourceMeshParams {
    /// Creates parameters with the default meter-to-cm scale.
    #[must_use]
    pub fn new(num_s: usize, num_theta: usize, num_phi: usize, toroidal_extent: f64) -> Self {
        Self {
            num_s,
            num_theta,
            num_phi,
            toroidal_extent,
            scale: M2CM,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] if a grid dimension is
    /// too small to form cells, the extent is outside `(0, 360]` or the
    /// scale is not positive.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        for (option, value, min) in [
            ("num_s", self.num_s, 2),
            ("num_theta", self.num_theta, 3),
            ("num_phi", self.num_phi, 2),
        ] {
            if value < min {
                return Err(ConfigurationError::InvalidValue {
                    option,
                    reason: format!("must be at least {min}, got {value}"),
                });
            }
        }
        if !(self.toroidal_extent > 0.0 && self.toroidal_extent <= 360.0) {
            return Err(ConfigurationError::InvalidValue {
                option: "toroidal_extent",
                reason: format!("must lie in (0, 360] degrees, got {}", self.toroidal_extent),
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

/// Vertex grid of a source mesh, in cm.
#[derive(Debug, Clone)]
pub struct SourceMesh {
    params: SourceMeshParams,
    s_values: Vec<f64>,
    theta_values: Vec<f64>,
    phi_values: Vec<f64>,
    vertices: Vec<Point3>,
}

impl SourceMesh {
    #[must_use]
    pub fn params(&self) -> &SourceMeshParams {
        &self.params
    }

    /// Flux labels of the surfaces.
    #[must_use]
    pub fn s_values(&self) -> &[f64] {
        &self.s_values
    }

    /// Poloidal angles in degrees.
    #[must_use]
    pub fn theta_values(&self) -> &[f64] {
        &self.theta_values
    }

    /// Toroidal angles in degrees.
    #[must_use]
    pub fn phi_values(&self) -> &[f64] {
        &self.phi_values
    }

    /// All vertices in phi, s, theta order.
    #[must_use]
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Position of vertex `(phi, s, theta)` in [`vertices`](Self::vertices).
    #[must_use]
    pub fn vertex_index(&self, i_phi: usize, i_s: usize, i_theta: usize) -> usize {
        (i_phi * self.params.num_s + i_s) * self.params.num_theta + i_theta
    }

    /// Cells in VTK node order. The poloidal direction wraps, so every
    /// surface band closes on itself. The band touching the magnetic axis
    /// is made of wedges that share the first axis vertex of each plane;
    /// the remaining axis vertices are not referenced by any cell.
    #[must_use]
    pub fn cells(&self) -> Vec<MeshCell> {
        let SourceMeshParams {
            num_s,
            num_theta,
            num_phi,
            ..
        } = self.params;
        let mut cells = Vec::with_capacity((num_phi - 1) * (num_s - 1) * num_theta);
        for p in 0..num_phi - 1 {
            for j in 0..num_theta {
                let k = (j + 1) % num_theta;
                cells.push(MeshCell::Wedge([
                    self.vertex_index(p, 0, 0),
                    self.vertex_index(p, 1, j),
                    self.vertex_index(p, 1, k),
                    self.vertex_index(p + 1, 0, 0),
                    self.vertex_index(p + 1, 1, j),
                    self.vertex_index(p + 1, 1, k),
                ]));
            }
            for i in 1..num_s - 1 {
                for j in 0..num_theta {
                    let k = (j + 1) % num_theta;
                    cells.push(MeshCell::Hexahedron([
                        self.vertex_index(p, i, j),
                        self.vertex_index(p, i + 1, j),
                        self.vertex_index(p, i + 1, k),
                        self.vertex_index(p, i, k),
                        self.vertex_index(p + 1, i, j),
                        self.vertex_index(p + 1, i + 1, j),
                        self.vertex_index(p + 1, i + 1, k),
                        self.vertex_index(p + 1, i, k),
                    ]));
                }
            }
        }
        cells
    }

    /// Writes the mesh as a legacy ASCII VTK unstructured grid, with the
    /// flux label of each vertex as point data.
    ///
    /// # Errors
    ///
    /// Returns an error if `filename` carries a foreign extension or the
    /// file cannot be written.
    pub fn export_vtk(&self, export_dir: &Path, filename: &str) -> Result<PathBuf> {
        let path = output_path(export_dir, filename, "vtk")?;
        info!(path = %path.display(), "exporting source mesh");

        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "# vtk DataFile Version 3.0")?;
        writeln!(out, "source mesh")?;
        writeln!(out, "ASCII")?;
        writeln!(out, "DATASET UNSTRUCTURED_GRID")?;
        writeln!(out, "POINTS {} double", self.vertices.len())?;
        for v in &self.vertices {
            writeln!(out, "{} {} {}", v.x, v.y, v.z)?;
        }

        let cells = self.cells();
        let size: usize = cells.iter().map(|c| c.nodes().len() + 1).sum();
        writeln!(out, "CELLS {} {size}", cells.len())?;
        for cell in &cells {
            write!(out, "{}", cell.nodes().len())?;
            for node in cell.nodes() {
                write!(out, " {node}")?;
            }
            writeln!(out)?;
        }
        writeln!(out, "CELL_TYPES {}", cells.len())?;
        for cell in &cells {
            writeln!(out, "{}", cell.vtk_type())?;
        }

        writeln!(out, "POINT_DATA {}", self.vertices.len())?;
        writeln!(out, "SCALARS s double 1")?;
        writeln!(out, "LOOKUP_TABLE default")?;
        for _ in &self.phi_values {
            for s in &self.s_values {
                for _ in &self.theta_values {
                    writeln!(out, "{s}")?;
                }
            }
        }
        out.flush()?;
        Ok(path)
    }
}

/// Samples the equilibrium on the source-mesh grid.
pub struct SourceMeshGenerator {
    params: SourceMeshParams,
}

impl SourceMeshGenerator {
    /// Creates a new `SourceMeshGenerator`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are out of range.
    pub fn new(params: SourceMeshParams) -> std::result::Result<Self, ConfigurationError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Queries one vertex per grid node.
    ///
    /// # Errors
    ///
    /// Propagates equilibrium domain errors.
    pub fn execute<E: Equilibrium>(&self, equilibrium: &E) -> Result<SourceMesh> {
        info!("constructing source mesh");
        let p = &self.params;
        let unit = equilibrium.unit_scale() * p.scale;

        let s_values = linspace(0.0, 1.0, p.num_s);
        #[allow(clippy::cast_precision_loss)]
        let theta_values: Vec<f64> = (0..p.num_theta)
            .map(|j| j as f64 * 360.0 / p.num_theta as f64)
            .collect();
        let phi_values = linspace(0.0, p.toroidal_extent, p.num_phi);

        let mut vertices = Vec::with_capacity(p.num_phi * p.num_s * p.num_theta);
        for &phi in &phi_values {
            for &s in &s_values {
                for &theta in &theta_values {
                    let point =
                        equilibrium.surface_point(s, theta.to_radians(), phi.to_radians())?;
                    vertices.push(point * unit);
                }
            }
        }

        Ok(SourceMesh {
            params: p.clone(),
            s_values,
            theta_values,
            phi_values,
            vertices,
        })
    }
}
