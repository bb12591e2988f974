use std::fmt;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigurationError;
use crate::math::{Point3, Vector3};

/// One entry of a cross-section list such as `["rectangle", 20, 40]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ShapeParam {
    Name(String),
    Length(f64),
}

impl From<&str> for ShapeParam {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<f64> for ShapeParam {
    fn from(length: f64) -> Self {
        Self::Length(length)
    }
}

/// Coil cross-section, dimensions in cm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossSection {
    Circle { radius: f64 },
    Rectangle { width: f64, thickness: f64 },
}

impl CrossSection {
    /// Parses the list form `[shape, dims...]`.
    ///
    /// A circle takes one radius; further values are ignored with a
    /// warning. A rectangle takes exactly a width and a thickness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::CrossSection`] for an unknown shape,
    /// a wrong number of dimensions, or a dimension that is not a positive
    /// length.
    pub fn from_params(params: &[ShapeParam]) -> Result<Self, ConfigurationError> {
        let Some((ShapeParam::Name(shape), dims)) = params.split_first() else {
            return Err(ConfigurationError::CrossSection(
                "the first entry must name the shape, 'circle' or 'rectangle'".into(),
            ));
        };
        let dims = dims
            .iter()
            .map(|p| match p {
                ShapeParam::Length(v) if v.is_finite() && *v > 0.0 => Ok(*v),
                other => Err(ConfigurationError::CrossSection(format!(
                    "dimension {other:?} is not a positive length"
                ))),
            })
            .collect::<Result<Vec<f64>, _>>()?;

        match (shape.as_str(), dims.as_slice()) {
            ("circle", [radius, rest @ ..]) => {
                if !rest.is_empty() {
                    warn!(
                        radius,
                        "more than one length given for a circular cross-section; \
                         using the first as the radius"
                    );
                }
                Ok(Self::Circle { radius: *radius })
            }
            ("circle", []) => Err(ConfigurationError::CrossSection(
                "a circle is defined as [\"circle\", radius]".into(),
            )),
            ("rectangle", [width, thickness]) => Ok(Self::Rectangle {
                width: *width,
                thickness: *thickness,
            }),
            ("rectangle", _) => Err(ConfigurationError::CrossSection(
                "a rectangle is defined as [\"rectangle\", width, thickness]".into(),
            )),
            (other, _) => Err(ConfigurationError::CrossSection(format!(
                "unsupported shape '{other}', expected 'circle' or 'rectangle'"
            ))),
        }
    }

    /// Largest in-plane dimension of the profile.
    #[must_use]
    pub fn characteristic_length(&self) -> f64 {
        match *self {
            Self::Circle { radius } => radius,
            Self::Rectangle { width, thickness } => width.max(thickness),
        }
    }
}

/// Kernel profile notation. The rectangle's thickness runs along the
/// profile's local x axis, so it is passed as the kernel's width.
impl fmt::Display for CrossSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Circle { radius } => write!(f, "circle radius {radius}"),
            Self::Rectangle { width, thickness } => {
                write!(f, "rectangle width {thickness} height {width}")
            }
        }
    }
}

/// A cross-section placed at the start of a sweep path.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepProfile {
    pub section: CrossSection,
    /// First point of the path.
    pub origin: Point3,
    /// Unit path tangent at the origin; the profile plane normal.
    pub normal: Vector3,
    /// In-plane unit direction of the rectangle's thickness, pointing away
    /// from the z axis. `None` for circles.
    pub thickness_axis: Option<Vector3>,
}

impl SweepProfile {
    /// Places `section` at `origin` facing `normal`.
    ///
    /// Returns `None` if `normal` is degenerate or, for a rectangle, the
    /// origin has no component in the profile plane to orient against.
    #[must_use]
    pub fn new(section: CrossSection, origin: Point3, normal: Vector3) -> Option<Self> {
        let normal = normal.try_normalize(crate::math::TOLERANCE)?;
        let thickness_axis = match section {
            CrossSection::Circle { .. } => None,
            CrossSection::Rectangle { .. } => {
                let position = origin.coords;
                let projected = position - normal * position.dot(&normal);
                Some(projected.try_normalize(crate::math::TOLERANCE)?)
            }
        };
        Some(Self {
            section,
            origin,
            normal,
            thickness_axis,
        })
    }
}
