use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{named_output, output_path};
use crate::equilibrium::Equilibrium;
use crate::error::{KernelError, Result};
use crate::kernel::{ModelingKernel, SolidId, VolumeId};

use super::{BuildOptions, CadToDagmc, LayerLoci, LociInterpolator, RadialBuildSpec};

/// One generated in-vessel component.
#[derive(Debug, Clone)]
pub struct InVesselComponent {
    name: String,
    material: String,
    layer: usize,
    loci: LayerLoci,
    solid: SolidId,
    step_path: Option<PathBuf>,
}

impl InVesselComponent {
    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Material tag.
    #[must_use]
    pub fn material(&self) -> &str {
        &self.material
    }

    /// Position in the radial stack; 0 is the plasma.
    #[must_use]
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Outer-boundary ribs of this layer.
    #[must_use]
    pub fn loci(&self) -> &LayerLoci {
        &self.loci
    }

    /// Kernel solid of this layer.
    #[must_use]
    pub fn solid(&self) -> SolidId {
        self.solid
    }

    /// STEP file the component was last exported to.
    #[must_use]
    pub fn step_path(&self) -> Option<&Path> {
        self.step_path.as_deref()
    }
}

/// The layered in-vessel build, innermost component first.
#[derive(Debug, Clone)]
pub struct InVesselBuild {
    components: Vec<InVesselComponent>,
}

impl InVesselBuild {
    /// Components in layer order.
    #[must_use]
    pub fn components(&self) -> &[InVesselComponent] {
        &self.components
    }

    /// Looks up a component by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&InVesselComponent> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Writes one STEP file per component, named after the component.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the kernel
    /// export fails.
    pub fn export_step<K: ModelingKernel>(
        &mut self,
        kernel: &mut K,
        export_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        info!("exporting STEP files for in-vessel components");
        let mut paths = Vec::with_capacity(self.components.len());
        for component in &mut self.components {
            let path = named_output(export_dir, &component.name, "step")?;
            kernel.export_step(&[component.solid], &path)?;
            component.step_path = Some(path.clone());
            paths.push(path);
        }
        Ok(paths)
    }

    /// Surface-meshes every component solid into one in-vessel-only
    /// neutronics model, each tagged with its component's material. The
    /// assembly session is not touched.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid options, checked before
    /// any kernel command, or any kernel failure.
    pub fn export_cad_to_dagmc<K: ModelingKernel>(
        &self,
        kernel: &mut K,
        export_dir: &Path,
        options: &CadToDagmc,
    ) -> Result<PathBuf> {
        options.validate()?;
        let path = output_path(export_dir, &options.filename, "h5m")?;
        info!(path = %path.display(), "exporting in-vessel components via CAD-to-DAGMC");
        let solids: Vec<(SolidId, &str)> = self
            .components
            .iter()
            .map(|c| (c.solid, c.material.as_str()))
            .collect();
        kernel.cad_to_dagmc(
            &solids,
            (options.min_mesh_size, options.max_mesh_size),
            &path,
        )?;
        Ok(path)
    }

    /// Merges the shared boundary surface of each pair of adjacent layers.
    ///
    /// `volumes` are the assembly volumes of the components, in layer
    /// order. Only neighbouring layers are paired; no geometric search is
    /// made. Returns the number of pairs the kernel merged.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::UnexpectedVolumeCount`] if the volume count
    /// does not match the component count, or any kernel failure.
    pub fn merge_layer_surfaces<K: ModelingKernel>(
        &self,
        kernel: &mut K,
        volumes: &[VolumeId],
    ) -> Result<usize> {
        if volumes.len() != self.components.len() {
            return Err(KernelError::UnexpectedVolumeCount {
                name: "in-vessel build".into(),
                count: volumes.len(),
                expected: self.components.len(),
            }
            .into());
        }

        let mut merged = 0;
        for (pair, names) in volumes.windows(2).zip(self.components.windows(2)) {
            if kernel.merge_surfaces(pair[0], pair[1])? {
                merged += 1;
            } else {
                warn!(
                    inner = names[0].name.as_str(),
                    outer = names[1].name.as_str(),
                    "layer surfaces were not merged"
                );
            }
        }
        Ok(merged)
    }
}

/// Lofts one solid per radial layer, strictly innermost first.
///
/// The plasma layer is the loft of its own boundary. Every later layer is
/// the loft of its outer boundary minus the loft of the layer below, so
/// each solid is enclosed by the next.
pub struct InVesselBuildGenerator<'a> {
    spec: &'a RadialBuildSpec,
    options: &'a BuildOptions,
}

impl<'a> InVesselBuildGenerator<'a> {
    /// Creates a new `InVesselBuildGenerator`.
    #[must_use]
    pub fn new(spec: &'a RadialBuildSpec, options: &'a BuildOptions) -> Self {
        Self { spec, options }
    }

    /// Computes the loci and builds every layer in the kernel session.
    ///
    /// # Errors
    ///
    /// Returns an error if the loci cannot be computed or a kernel command
    /// fails.
    pub fn execute<E, K>(&self, equilibrium: &E, kernel: &mut K) -> Result<InVesselBuild>
    where
        E: Equilibrium,
        K: ModelingKernel,
    {
        let spec = self
            .spec
            .clone()
            .with_material_overrides(
                self.options.plasma_mat_tag.as_deref(),
                self.options.sol_mat_tag.as_deref(),
            );

        info!("computing in-vessel component loci");
        let loci = LociInterpolator::new(&spec, self.options).execute(equilibrium)?;

        info!("constructing in-vessel components");
        // Envelope of the layer below, and whether it is also a component's solid.
        let mut inner: Option<(SolidId, bool)> = None;
        let mut components = Vec::with_capacity(loci.len());
        for (layer, layer_loci) in spec.layers().iter().zip(loci) {
            info!(component = layer.name(), "lofting component");
            let envelope = kernel.loft(layer_loci.ribs())?;
            let solid = match inner {
                Some((tool, _)) => kernel.subtract(envelope, tool)?,
                None => envelope,
            };
            if let Some((tool, false)) = inner {
                kernel.delete(tool)?;
            }
            inner = Some((envelope, envelope == solid));

            components.push(InVesselComponent {
                name: layer.name().to_owned(),
                material: layer.material().to_owned(),
                layer: layer.index(),
                loci: layer_loci,
                solid,
                step_path: None,
            });
        }
        if let Some((tool, false)) = inner {
            kernel.delete(tool)?;
        }

        Ok(InVesselBuild { components })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::equilibrium::AnalyticEquilibrium;
    use crate::error::ParastellError;
    use crate::invessel::ComponentSpec;
    use crate::kernel::{KernelCommand, MemoryKernel, SolidShape};

    fn spec(wall_s: f64) -> RadialBuildSpec {
        RadialBuildSpec::new(
            vec![0.0, 45.0, 90.0],
            vec![0.0, 90.0, 180.0, 270.0, 360.0],
            wall_s,
            vec![
                ("first_wall".to_owned(), ComponentSpec::uniform(3, 5, 5.0)),
                (
                    "breeder".to_owned(),
                    ComponentSpec::uniform(3, 5, 50.0).with_material("lithium"),
                ),
            ],
        )
        .unwrap()
    }

    fn options() -> BuildOptions {
        BuildOptions {
            num_ribs: 5,
            num_rib_pts: 9,
            sol_mat_tag: Some("vacuum".into()),
            ..BuildOptions::default()
        }
    }

    #[test]
    fn layers_are_lofted_in_order_and_nested() {
        let mut kernel = MemoryKernel::new();
        let opts = options();
        let build = InVesselBuildGenerator::new(&spec(1.08), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();

        let names: Vec<&str> = build.components().iter().map(InVesselComponent::name).collect();
        assert_eq!(names, vec!["plasma", "sol", "first_wall", "breeder"]);
        let materials: Vec<&str> =
            build.components().iter().map(InVesselComponent::material).collect();
        assert_eq!(materials, vec!["plasma", "vacuum", "first_wall", "lithium"]);

        assert!(matches!(
            kernel.solid(build.components()[0].solid()),
            Some(SolidShape::Loft { .. })
        ));
        for c in &build.components()[1..] {
            assert!(matches!(
                kernel.solid(c.solid()),
                Some(SolidShape::Difference { .. })
            ));
        }
        // Four layer solids; intermediate envelopes are cleaned up.
        assert_eq!(kernel.solid_count(), 4);

        let lofts = kernel
            .commands()
            .iter()
            .filter(|c| matches!(c, KernelCommand::Loft { ribs: 5 }))
            .count();
        assert_eq!(lofts, 4);
    }

    #[test]
    fn export_writes_one_step_file_per_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = MemoryKernel::new();
        let opts = options();
        let mut build = InVesselBuildGenerator::new(&spec(1.0), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();

        let paths = build.export_step(&mut kernel, dir.path()).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));
        assert_eq!(
            build.component("breeder").unwrap().step_path(),
            Some(dir.path().join("breeder.step").as_path())
        );
    }

    #[test]
    fn dotted_component_names_keep_their_dots() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = MemoryKernel::new();
        let spec = RadialBuildSpec::new(
            vec![0.0, 45.0, 90.0],
            vec![0.0, 90.0, 180.0, 270.0, 360.0],
            1.0,
            vec![("breeder_v1.2".to_owned(), ComponentSpec::uniform(3, 5, 50.0))],
        )
        .unwrap();
        let opts = options();
        let mut build = InVesselBuildGenerator::new(&spec, &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();

        let paths = build.export_step(&mut kernel, dir.path()).unwrap();
        assert_eq!(paths[1], dir.path().join("breeder_v1.2.step"));
        assert!(paths[1].exists());
    }

    #[test]
    fn cad_to_dagmc_tags_components_outside_the_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = MemoryKernel::new();
        let opts = options();
        let build = InVesselBuildGenerator::new(&spec(1.0), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();

        let cad = CadToDagmc {
            filename: "invessel".into(),
            ..CadToDagmc::default()
        };
        let path = build
            .export_cad_to_dagmc(&mut kernel, dir.path(), &cad)
            .unwrap();
        assert_eq!(path, dir.path().join("invessel.h5m"));
        assert_eq!(
            kernel.commands().last(),
            Some(&KernelCommand::CadToDagmc {
                path: path.clone(),
                solids: 3
            })
        );
        assert!(kernel.volumes().is_empty());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            manifest["materials"],
            serde_json::json!(["plasma", "first_wall", "lithium"])
        );
        assert_eq!(manifest["max_mesh_size"], serde_json::json!(20.0));
    }

    #[test]
    fn cad_to_dagmc_options_are_checked_before_meshing() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = MemoryKernel::new();
        let opts = options();
        let build = InVesselBuildGenerator::new(&spec(1.0), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();
        let issued = kernel.commands().len();

        for cad in [
            CadToDagmc {
                filename: "invessel.stl".into(),
                ..CadToDagmc::default()
            },
            CadToDagmc {
                min_mesh_size: 30.0,
                ..CadToDagmc::default()
            },
            CadToDagmc {
                min_mesh_size: 0.0,
                ..CadToDagmc::default()
            },
        ] {
            let err = build
                .export_cad_to_dagmc(&mut kernel, dir.path(), &cad)
                .unwrap_err();
            assert!(matches!(err, ParastellError::Configuration(_)));
        }
        assert_eq!(kernel.commands().len(), issued);
    }

    #[test]
    fn layer_merge_pairs_only_neighbours() {
        let dir = tempfile::tempdir().unwrap();
        let mut kernel = MemoryKernel::new();
        let opts = options();
        let mut build = InVesselBuildGenerator::new(&spec(1.08), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap();
        let paths = build.export_step(&mut kernel, dir.path()).unwrap();
        let volumes: Vec<VolumeId> = paths
            .iter()
            .flat_map(|p| kernel.import_step(p).unwrap())
            .collect();

        let merged = build.merge_layer_surfaces(&mut kernel, &volumes).unwrap();
        assert_eq!(merged, 3);
        assert_eq!(
            kernel.merged_surfaces(),
            &[
                (volumes[0], volumes[1]),
                (volumes[1], volumes[2]),
                (volumes[2], volumes[3])
            ]
        );

        let err = build
            .merge_layer_surfaces(&mut kernel, &volumes[..2])
            .unwrap_err();
        assert!(matches!(
            err,
            ParastellError::Kernel(KernelError::UnexpectedVolumeCount { .. })
        ));
    }

    #[test]
    fn kernel_failures_propagate() {
        let mut kernel = MemoryKernel::new();
        kernel.fail_on("subtract");
        let opts = options();
        let err = InVesselBuildGenerator::new(&spec(1.0), &opts)
            .execute(&AnalyticEquilibrium::default(), &mut kernel)
            .unwrap_err();
        assert!(matches!(
            err,
            ParastellError::Kernel(KernelError::CommandFailed {
                command: "subtract",
                ..
            })
        ));
    }
}
