use crate::error::DomainError;
use crate::math::Point3;

use super::{check_flux_label, Equilibrium};

/// Closed-form equilibrium with rotating elliptical flux surfaces.
///
/// The minor radius of surface `s` grows as `sqrt(s)`, matching the usual
/// relation between toroidal flux and radius. The ellipse turns once per
/// field period, which gives the surfaces the periodicity of an
/// `N`-period stellarator.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticEquilibrium {
    /// Major radius of the magnetic axis.
    pub major_radius: f64,
    /// Minor radius of the last closed flux surface.
    pub minor_radius: f64,
    /// Ratio of vertical to horizontal semi-axis.
    pub elongation: f64,
    /// Number of toroidal field periods.
    pub num_field_periods: u32,
}

impl AnalyticEquilibrium {
    /// Creates a circular-section torus (no elongation, no rotation).
    #[must_use]
    pub fn circular(major_radius: f64, minor_radius: f64) -> Self {
        Self {
            major_radius,
            minor_radius,
            elongation: 1.0,
            num_field_periods: 0,
        }
    }
}

impl Equilibrium for AnalyticEquilibrium {
    fn surface_point(&self, s: f64, theta: f64, phi: f64) -> Result<Point3, DomainError> {
        check_flux_label(s)?;

        let r = self.minor_radius * s.sqrt();
        let u = r * theta.cos();
        let v = self.elongation * r * theta.sin();

        let alpha = f64::from(self.num_field_periods) * phi;
        let (sin_a, cos_a) = alpha.sin_cos();
        let major = self.major_radius + u * cos_a - v * sin_a;
        let z = u * sin_a + v * cos_a;

        Ok(Point3::new(major * phi.cos(), major * phi.sin(), z))
    }
}

impl Default for AnalyticEquilibrium {
    fn default() -> Self {
        Self {
            major_radius: 5.5,
            minor_radius: 0.5,
            elongation: 1.6,
            num_field_periods: 4,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    #[test]
    fn axis_is_independent_of_poloidal_angle() {
        let eq = AnalyticEquilibrium::default();
        let a = eq.surface_point(0.0, 0.0, 0.3).unwrap();
        let b = eq.surface_point(0.0, 2.0, 0.3).unwrap();
        assert!((a - b).norm() < 1e-12);
    }

    #[test]
    fn circular_surface_has_expected_radius() {
        let eq = AnalyticEquilibrium::circular(10.0, 2.0);
        let p = eq.surface_point(0.25, 0.0, 0.0).unwrap();
        // sqrt(0.25) * 2.0 = 1.0 outboard of the axis.
        assert!((p.x - 11.0).abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);
    }

    #[test]
    fn surfaces_repeat_every_field_period() {
        let eq = AnalyticEquilibrium::default();
        let period = 2.0 * PI / f64::from(eq.num_field_periods);
        let a = eq.surface_point(1.0, 0.7, 0.1).unwrap();
        let b = eq.surface_point(1.0, 0.7, 0.1 + period).unwrap();
        let ra = (a.x * a.x + a.y * a.y).sqrt();
        let rb = (b.x * b.x + b.y * b.y).sqrt();
        assert!((ra - rb).abs() < 1e-9);
        assert!((a.z - b.z).abs() < 1e-9);
    }

    #[test]
    fn rejects_labels_outside_unit_interval() {
        let eq = AnalyticEquilibrium::default();
        assert!(matches!(
            eq.surface_point(1.2, 0.0, 0.0),
            Err(DomainError::FluxLabelOutOfRange { .. })
        ));
        assert!(eq.surface_point(-0.1, 0.0, 0.0).is_err());
        assert!(eq.surface_point(f64::NAN, 0.0, 0.0).is_err());
    }
}
