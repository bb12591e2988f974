//! Plasma-equilibrium flux-surface queries.
//!
//! The equilibrium solver and its file format live outside this crate; the
//! pipeline only needs points on closed flux surfaces, addressed by
//! normalized flux label `s`, poloidal angle `theta` and toroidal angle
//! `phi` (both in radians).

mod analytic;

pub use analytic::AnalyticEquilibrium;

use crate::error::DomainError;
use crate::math::Point3;

/// Source of flux-surface geometry.
pub trait Equilibrium {
    /// Cartesian point on the flux surface `s` at `(theta, phi)`, in the
    /// equilibrium's own length unit.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::FluxLabelOutOfRange`] if `s` is outside
    /// `[0, 1]`.
    fn surface_point(&self, s: f64, theta: f64, phi: f64) -> Result<Point3, DomainError>;

    /// Length of one equilibrium unit in meters.
    fn unit_scale(&self) -> f64 {
        1.0
    }
}

impl<E: Equilibrium + ?Sized> Equilibrium for &E {
    fn surface_point(&self, s: f64, theta: f64, phi: f64) -> Result<Point3, DomainError> {
        (**self).surface_point(s, theta, phi)
    }

    fn unit_scale(&self) -> f64 {
        (**self).unit_scale()
    }
}

/// Checks that a flux label lies in the closed interval `[0, 1]`.
///
/// # Errors
///
/// Returns [`DomainError::FluxLabelOutOfRange`] otherwise (NaN included).
pub fn check_flux_label(s: f64) -> Result<(), DomainError> {
    if (0.0..=1.0).contains(&s) {
        Ok(())
    } else {
        Err(DomainError::FluxLabelOutOfRange { value: s })
    }
}
