//! Magnet coils swept from filament point data.

mod coil_set;
mod cross_section;
mod filament;

pub use coil_set::{MagnetCoilSetGenerator, MagnetSet};
pub use cross_section::{CrossSection, ShapeParam, SweepProfile};
pub use filament::{
    average_radial_distance, filter_and_sort, parse_filaments, read_filaments, Filament,
};

use crate::error::ConfigurationError;
use crate::invessel::M2CM;

/// Options for reading and tagging a magnet set.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetOptions {
    /// Number of header lines before filament data.
    pub start_line: usize,
    /// Keep every n-th filament point.
    pub sample_mod: usize,
    /// Factor from filament units to cm.
    pub scale: f64,
    pub mat_tag: String,
}

impl Default for MagnetOptions {
    fn default() -> Self {
        Self {
            start_line: 3,
            sample_mod: 1,
            scale: M2CM,
            mat_tag: "magnets".into(),
        }
    }
}

impl MagnetOptions {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidValue`] if `sample_mod` is zero
    /// or `scale` is not a positive number.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.sample_mod == 0 {
            return Err(ConfigurationError::InvalidValue {
                option: "sample_mod",
                reason: "must be at least 1".into(),
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
