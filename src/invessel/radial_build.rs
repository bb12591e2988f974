use std::cmp::Ordering;

use nalgebra::DMatrix;
use tracing::warn;

use crate::error::ValidationError;
use crate::math::TOLERANCE;

/// Name of the implicit innermost layer bounded by the last closed flux
/// surface.
pub const PLASMA: &str = "plasma";

/// Name of the implicit scrape-off layer between the last closed flux
/// surface and the wall surface.
pub const SOL: &str = "sol";

/// Thickness grid and optional material tag for one user component.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    /// Thickness in cm; rows follow toroidal angles, columns poloidal angles.
    pub thickness: DMatrix<f64>,
    /// Material tag; the component name is used when absent.
    pub material: Option<String>,
}

impl ComponentSpec {
    /// A component with the same thickness everywhere on the grid.
    #[must_use]
    pub fn uniform(rows: usize, cols: usize, thickness: f64) -> Self {
        Self {
            thickness: DMatrix::from_element(rows, cols, thickness),
            material: None,
        }
    }

    /// Sets the material tag.
    #[must_use]
    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }
}

/// One radial layer of the build, innermost first.
#[derive(Debug, Clone)]
pub struct RadialLayer {
    name: String,
    thickness: DMatrix<f64>,
    material: String,
    explicit_material: bool,
    index: usize,
}

impl RadialLayer {
    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Thickness matrix in cm.
    #[must_use]
    pub fn thickness(&self) -> &DMatrix<f64> {
        &self.thickness
    }

    /// Material tag.
    #[must_use]
    pub fn material(&self) -> &str {
        &self.material
    }

    /// Position in the radial stack; 0 is the plasma.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Validated three-dimensional radial build.
///
/// Layer order is load-bearing: each layer's outer boundary is the next
/// layer's inner boundary, so the stack is lofted strictly in this order.
#[derive(Debug, Clone)]
pub struct RadialBuildSpec {
    toroidal_angles: Vec<f64>,
    poloidal_angles: Vec<f64>,
    wall_s: f64,
    layers: Vec<RadialLayer>,
}

impl RadialBuildSpec {
    /// Validates the angle grid and user components and assembles the layer
    /// stack.
    ///
    /// The stack always starts with a zero-thickness `plasma` layer and,
    /// when `wall_s > 1`, a zero-thickness `sol` layer. A user component
    /// with either name replaces the implicit layer in place; all other
    /// components follow in the order given.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the angle sequences are malformed,
    /// `wall_s` is below 1, a component name repeats, or a thickness matrix
    /// has the wrong shape or a negative or non-finite entry.
    pub fn new(
        toroidal_angles: Vec<f64>,
        poloidal_angles: Vec<f64>,
        wall_s: f64,
        components: Vec<(String, ComponentSpec)>,
    ) -> Result<Self, ValidationError> {
        validate_toroidal(&toroidal_angles)?;
        validate_poloidal(&poloidal_angles)?;
        if !wall_s.is_finite() || wall_s < 1.0 {
            return Err(ValidationError::WallFluxLabel(wall_s));
        }

        let rows = toroidal_angles.len();
        let cols = poloidal_angles.len();

        let mut entries: Vec<(String, ComponentSpec, bool)> =
            vec![(PLASMA.to_owned(), ComponentSpec::uniform(rows, cols, 0.0), true)];
        if wall_s > 1.0 {
            entries.push((SOL.to_owned(), ComponentSpec::uniform(rows, cols, 0.0), true));
        }

        for (name, component) in components {
            validate_thickness(&name, &component.thickness, rows, cols)?;
            match entries.iter_mut().find(|(n, _, _)| *n == name) {
                Some(entry) if entry.2 => *entry = (name, component, false),
                Some(_) => return Err(ValidationError::DuplicateComponent(name)),
                None => entries.push((name, component, false)),
            }
        }

        let layers = entries
            .into_iter()
            .enumerate()
            .map(|(index, (name, component, _))| {
                let explicit_material = component.material.is_some();
                RadialLayer {
                    material: component.material.unwrap_or_else(|| name.clone()),
                    name,
                    thickness: component.thickness,
                    explicit_material,
                    index,
                }
            })
            .collect();

        Ok(Self {
            toroidal_angles,
            poloidal_angles,
            wall_s,
            layers,
        })
    }

    /// Replaces the default material tags of the `plasma` and `sol` layers.
    /// Tags given explicitly on a user component are kept.
    #[must_use]
    pub fn with_material_overrides(mut self, plasma: Option<&str>, sol: Option<&str>) -> Self {
        for layer in &mut self.layers {
            let tag = match layer.name.as_str() {
                PLASMA => plasma,
                SOL => sol,
                _ => None,
            };
            if let (Some(tag), false) = (tag, layer.explicit_material) {
                tag.clone_into(&mut layer.material);
            }
        }
        self
    }

    /// Toroidal angles of the thickness grid rows, in degrees.
    #[must_use]
    pub fn toroidal_angles(&self) -> &[f64] {
        &self.toroidal_angles
    }

    /// Poloidal angles of the thickness grid columns, in degrees.
    #[must_use]
    pub fn poloidal_angles(&self) -> &[f64] {
        &self.poloidal_angles
    }

    /// Flux label of the wall surface.
    #[must_use]
    pub fn wall_s(&self) -> f64 {
        self.wall_s
    }

    /// Toroidal extent of one build segment, in degrees.
    #[must_use]
    pub fn toroidal_extent(&self) -> f64 {
        self.toroidal_angles[self.toroidal_angles.len() - 1]
    }

    /// Layers, innermost first.
    #[must_use]
    pub fn layers(&self) -> &[RadialLayer] {
        &self.layers
    }

    /// Looks up a layer by component name.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&RadialLayer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

fn validate_increasing(angles: &[f64], axis: &'static str) -> Result<(), ValidationError> {
    if angles.len() < 2 {
        return Err(ValidationError::TooFewAngles {
            axis,
            min: 2,
            count: angles.len(),
        });
    }
    match angles
        .windows(2)
        .position(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
    {
        Some(i) => Err(ValidationError::NotIncreasing { axis, index: i + 1 }),
        None => Ok(()),
    }
}

fn validate_toroidal(angles: &[f64]) -> Result<(), ValidationError> {
    validate_increasing(angles, "toroidal")?;
    if angles[0].abs() > TOLERANCE {
        return Err(ValidationError::ToroidalStart(angles[0]));
    }
    let last = angles[angles.len() - 1];
    if last > 360.0 + TOLERANCE {
        return Err(ValidationError::ToroidalExtent(last));
    }
    Ok(())
}

fn validate_poloidal(angles: &[f64]) -> Result<(), ValidationError> {
    validate_increasing(angles, "poloidal")?;
    let span = angles[angles.len() - 1] - angles[0];
    if (span - 360.0).abs() > 1e-9 {
        return Err(ValidationError::PoloidalSpan(span));
    }
    Ok(())
}

fn validate_thickness(
    name: &str,
    thickness: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ValidationError> {
    if thickness.nrows() != rows || thickness.ncols() != cols {
        return Err(ValidationError::GridShape {
            component: name.to_owned(),
            rows: thickness.nrows(),
            cols: thickness.ncols(),
            expected_rows: rows,
            expected_cols: cols,
        });
    }
    for row in 0..rows {
        for col in 0..cols {
            let value = thickness[(row, col)];
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidThickness {
                    component: name.to_owned(),
                    row,
                    col,
                    value,
                });
            }
        }
    }
    for row in 0..rows {
        if (thickness[(row, 0)] - thickness[(row, cols - 1)]).abs() > TOLERANCE {
            warn!(
                component = name,
                row, "thickness at the first and last poloidal angle differ"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOR: [f64; 3] = [0.0, 30.0, 60.0];
    const POL: [f64; 4] = [0.0, 120.0, 240.0, 360.0];

    fn component(t: f64) -> ComponentSpec {
        ComponentSpec::uniform(TOR.len(), POL.len(), t)
    }

    fn build(wall_s: f64, components: Vec<(&str, ComponentSpec)>) -> Result<RadialBuildSpec, ValidationError> {
        RadialBuildSpec::new(
            TOR.to_vec(),
            POL.to_vec(),
            wall_s,
            components.into_iter().map(|(n, c)| (n.to_owned(), c)).collect(),
        )
    }

    fn names(spec: &RadialBuildSpec) -> Vec<&str> {
        spec.layers().iter().map(RadialLayer::name).collect()
    }

    #[test]
    fn layers_follow_insertion_order_after_implicit_layers() {
        let spec = build(
            1.08,
            vec![("first_wall", component(5.0)), ("breeder", component(50.0))],
        )
        .unwrap();
        assert_eq!(names(&spec), vec!["plasma", "sol", "first_wall", "breeder"]);
        let indices: Vec<usize> = spec.layers().iter().map(RadialLayer::index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(spec.layer("breeder").unwrap().material(), "breeder");
    }

    #[test]
    fn no_scrape_off_layer_at_the_last_closed_surface() {
        let spec = build(1.0, vec![("wall", component(5.0))]).unwrap();
        assert_eq!(names(&spec), vec!["plasma", "wall"]);
    }

    #[test]
    fn user_plasma_replaces_implicit_layer_in_place() {
        let spec = build(
            1.0,
            vec![
                ("wall", component(5.0)),
                ("plasma", component(0.0).with_material("dt_plasma")),
            ],
        )
        .unwrap();
        assert_eq!(names(&spec), vec!["plasma", "wall"]);
        assert_eq!(spec.layer("plasma").unwrap().material(), "dt_plasma");
    }

    #[test]
    fn material_overrides_skip_explicit_tags() {
        let spec = build(1.1, vec![("sol", component(0.0).with_material("vacuum"))])
            .unwrap()
            .with_material_overrides(Some("hydrogen"), Some("ignored"));
        assert_eq!(spec.layer("plasma").unwrap().material(), "hydrogen");
        assert_eq!(spec.layer("sol").unwrap().material(), "vacuum");
    }

    #[test]
    fn matrix_shape_must_match_grid() {
        let bad = ComponentSpec::uniform(TOR.len(), POL.len() + 1, 1.0);
        let err = build(1.0, vec![("wall", bad)]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::GridShape {
                rows: 3,
                cols: 5,
                expected_rows: 3,
                expected_cols: 4,
                ..
            }
        ));

        let bad = ComponentSpec::uniform(TOR.len() - 1, POL.len(), 1.0);
        assert!(build(1.0, vec![("wall", bad)]).is_err());
    }

    #[test]
    fn negative_thickness_is_rejected() {
        let mut c = component(1.0);
        c.thickness[(1, 2)] = -0.5;
        let err = build(1.0, vec![("wall", c)]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidThickness { row: 1, col: 2, .. }
        ));
    }

    #[test]
    fn toroidal_angles_must_start_at_zero_and_increase() {
        let err = RadialBuildSpec::new(vec![10.0, 20.0], POL.to_vec(), 1.0, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::ToroidalStart(_)));

        let err = RadialBuildSpec::new(vec![0.0, 20.0, 20.0], POL.to_vec(), 1.0, vec![]).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::NotIncreasing {
                axis: "toroidal",
                index: 2
            }
        ));

        let err = RadialBuildSpec::new(vec![0.0, 400.0], POL.to_vec(), 1.0, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::ToroidalExtent(_)));
    }

    #[test]
    fn poloidal_angles_must_span_a_full_turn() {
        let err = RadialBuildSpec::new(TOR.to_vec(), vec![0.0, 90.0, 180.0, 270.0], 1.0, vec![])
            .unwrap_err();
        assert!(matches!(err, ValidationError::PoloidalSpan(_)));

        assert!(RadialBuildSpec::new(TOR.to_vec(), vec![-180.0, 0.0, 180.0], 1.0, vec![]).is_ok());
    }

    #[test]
    fn wall_label_below_last_closed_surface_is_rejected() {
        assert!(matches!(
            build(0.9, vec![]).unwrap_err(),
            ValidationError::WallFluxLabel(_)
        ));
        assert!(build(f64::NAN, vec![]).is_err());
    }

    #[test]
    fn duplicate_user_components_are_rejected() {
        let err = build(1.0, vec![("wall", component(1.0)), ("wall", component(2.0))]).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateComponent(name) if name == "wall"));
    }
}
