use serde::Serialize;

/// Default edge-length ratio for native faceting.
pub const DEFAULT_ANISOTROPIC_RATIO: f64 = 100.0;

/// Default facet deviation angle for native faceting, in degrees.
pub const DEFAULT_DEVIATION_ANGLE: f64 = 5.0;

/// Tessellation regime for the neutronics export.
///
/// The regime also fixes how materials are tagged: legacy faceting uses
/// `mat:<tag>` groups, native faceting uses material blocks. Parameters of
/// one regime cannot be given to the other.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FacetingRegime {
    Legacy {
        /// Maximum distance of a facet from its surface.
        faceting_tolerance: Option<f64>,
        /// Maximum facet edge length.
        length_tolerance: Option<f64>,
        /// Maximum angle between normals of adjacent facets.
        normal_tolerance: Option<f64>,
    },
    Native {
        anisotropic_ratio: f64,
        deviation_angle: f64,
    },
}

impl FacetingRegime {
    /// Legacy faceting with kernel-default tolerances.
    #[must_use]
    pub fn legacy() -> Self {
        Self::Legacy {
            faceting_tolerance: None,
            length_tolerance: None,
            normal_tolerance: None,
        }
    }

    /// Native faceting with default ratio and angle.
    #[must_use]
    pub fn native() -> Self {
        Self::Native {
            anisotropic_ratio: DEFAULT_ANISOTROPIC_RATIO,
            deviation_angle: DEFAULT_DEVIATION_ANGLE,
        }
    }

    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }
}

impl Default for FacetingRegime {
    fn default() -> Self {
        Self::legacy()
    }
}

/// How overlapping volume boundaries are resolved before tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Imprint every volume on every other, then merge all coincident
    /// surfaces.
    #[default]
    ImprintMerge,
    /// Merge only the shared surfaces of adjacent in-vessel layers.
    MergeLayerSurfaces,
}

impl Resolution {
    #[must_use]
    pub fn from_skip_imprint(skip_imprint: bool) -> Self {
        if skip_imprint {
            Self::MergeLayerSurfaces
        } else {
            Self::ImprintMerge
        }
    }
}
