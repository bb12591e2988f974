use nalgebra::{DMatrix, Rotation3, Vector3 as NVector3};

use crate::equilibrium::Equilibrium;
use crate::error::{DomainError, Result, ValidationError};
use crate::math::{expand_angles, GridInterpolator, Point3, Vector3, TOLERANCE};

use super::{BuildOptions, RadialBuildSpec};

/// Angular step (radians) for the finite differences behind surface normals.
const NORMAL_STEP: f64 = 1e-4;

/// One rib: a closed cross-section at a fixed toroidal angle.
///
/// Points run in increasing poloidal angle; the closing point is implied,
/// not repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct Locus {
    /// Toroidal angle of the rib plane, in degrees.
    pub toroidal_angle: f64,
    /// Rib points in cm.
    pub points: Vec<Point3>,
}

/// Outer-boundary ribs of one radial layer across all repeated segments.
///
/// Consecutive segments share their boundary rib, so the sequence can be
/// lofted as a single solid without seam volumes.
#[derive(Debug, Clone)]
pub struct LayerLoci {
    name: String,
    ribs: Vec<Locus>,
    ribs_per_segment: usize,
}

impl LayerLoci {
    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All ribs in toroidal order.
    #[must_use]
    pub fn ribs(&self) -> &[Locus] {
        &self.ribs
    }

    /// Number of repeated segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        (self.ribs.len() - 1) / (self.ribs_per_segment - 1)
    }

    /// Ribs of segment `k`, both boundary ribs included.
    #[must_use]
    pub fn segment(&self, k: usize) -> Option<&[Locus]> {
        let stride = self.ribs_per_segment - 1;
        let start = k * stride;
        self.ribs.get(start..=start + stride)
    }
}

/// Samples flux surfaces in cm, extrapolating beyond the last closed
/// surface radially from the magnetic axis.
struct SurfaceSampler<'a, E: Equilibrium> {
    equilibrium: &'a E,
    unit: f64,
}

impl<E: Equilibrium> SurfaceSampler<'_, E> {
    fn point(&self, s: f64, theta: f64, phi: f64) -> std::result::Result<Point3, DomainError> {
        let p = if s > 1.0 {
            let axis = self.equilibrium.surface_point(0.0, theta, phi)?;
            let edge = self.equilibrium.surface_point(1.0, theta, phi)?;
            axis + (edge - axis) * s.sqrt()
        } else {
            self.equilibrium.surface_point(s, theta, phi)?
        };
        Ok(p * self.unit)
    }

    /// Outward unit normal of surface `s`, pointing away from the axis.
    fn normal(&self, s: f64, theta: f64, phi: f64) -> std::result::Result<Vector3, DomainError> {
        let d_theta =
            self.point(s, theta + NORMAL_STEP, phi)? - self.point(s, theta - NORMAL_STEP, phi)?;
        let d_phi =
            self.point(s, theta, phi + NORMAL_STEP)? - self.point(s, theta, phi - NORMAL_STEP)?;
        let normal = d_theta.cross(&d_phi);
        let len = normal.norm();
        if len < TOLERANCE {
            return Err(DomainError::DegenerateNormal { theta, phi });
        }
        let normal = normal / len;

        let outward = self.point(s, theta, phi)? - self.point(0.0, theta, phi)?;
        Ok(if normal.dot(&outward) < 0.0 { -normal } else { normal })
    }
}

/// Produces dense rib loci for every layer of a radial build.
///
/// Ribs are placed at the toroidal angles of the build densified towards
/// `num_ribs`, with points at the poloidal angles densified towards
/// `num_rib_pts`. Every input angle is kept, so at the input density the
/// sampling reproduces the input grid. Each layer's outer boundary is its
/// base flux surface (`s = 1` for the plasma, `wall_s` otherwise) pushed
/// out along the surface normal by the cumulative thickness of every layer
/// up to and including it, bilinearly interpolated on the input grid.
pub struct LociInterpolator<'a> {
    spec: &'a RadialBuildSpec,
    options: &'a BuildOptions,
}

impl<'a> LociInterpolator<'a> {
    /// Creates a new `LociInterpolator`.
    #[must_use]
    pub fn new(spec: &'a RadialBuildSpec, options: &'a BuildOptions) -> Self {
        Self { spec, options }
    }

    /// Toroidal rib angles of one segment, in degrees.
    #[must_use]
    pub fn toroidal_samples(&self) -> Vec<f64> {
        expand_angles(self.spec.toroidal_angles(), self.options.num_ribs)
    }

    /// Poloidal point angles of each rib, in degrees, without the closing
    /// angle.
    #[must_use]
    pub fn poloidal_samples(&self) -> Vec<f64> {
        let mut thetas = expand_angles(self.spec.poloidal_angles(), self.options.num_rib_pts);
        thetas.pop();
        thetas
    }

    /// Computes the loci of every layer, innermost first.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ConfigurationError`] if the sampling
    /// densities or scale are out of range, a [`ValidationError`] if the
    /// repeated build exceeds a full turn, and a [`DomainError`] if an
    /// equilibrium query fails.
    pub fn execute<E: Equilibrium>(&self, equilibrium: &E) -> Result<Vec<LayerLoci>> {
        self.options.validate(self.spec)?;

        let extent = self.spec.toroidal_extent();
        #[allow(clippy::cast_precision_loss)]
        let total = extent * (self.options.repeat + 1) as f64;
        if total > 360.0 + TOLERANCE {
            return Err(ValidationError::RepeatedExtent(total).into());
        }

        let sampler = SurfaceSampler {
            equilibrium,
            unit: equilibrium.unit_scale() * self.options.scale,
        };
        let phis = self.toroidal_samples();
        let thetas = self.poloidal_samples();

        let mut cumulative = DMatrix::zeros(
            self.spec.toroidal_angles().len(),
            self.spec.poloidal_angles().len(),
        );
        let mut loci = Vec::with_capacity(self.spec.layers().len());
        for layer in self.spec.layers() {
            cumulative += layer.thickness();
            let offsets = GridInterpolator::new(
                self.spec.toroidal_angles().to_vec(),
                self.spec.poloidal_angles().to_vec(),
                cumulative.clone(),
            );
            let s = if layer.index() == 0 { 1.0 } else { self.spec.wall_s() };

            let mut ribs = Vec::with_capacity(phis.len());
            for &phi in &phis {
                let mut points = Vec::with_capacity(thetas.len());
                for &theta in &thetas {
                    let (theta_rad, phi_rad) = (theta.to_radians(), phi.to_radians());
                    let base = sampler.point(s, theta_rad, phi_rad)?;
                    let offset = offsets.value(phi, theta);
                    points.push(if offset > 0.0 {
                        base + sampler.normal(s, theta_rad, phi_rad)? * offset
                    } else {
                        base
                    });
                }
                ribs.push(Locus {
                    toroidal_angle: phi,
                    points,
                });
            }

            loci.push(tile(layer.name(), &ribs, self.options.repeat, extent));
        }
        Ok(loci)
    }
}

/// Appends `repeat` rotated copies of a segment's ribs. Each copy reuses
/// the previous segment's last rib as its first.
fn tile(name: &str, base: &[Locus], repeat: usize, extent: f64) -> LayerLoci {
    let ribs_per_segment = base.len();
    let mut ribs = Vec::with_capacity(ribs_per_segment + repeat * (ribs_per_segment - 1));
    ribs.extend_from_slice(base);

    for copy in 1..=repeat {
        #[allow(clippy::cast_precision_loss)]
        let shift = extent * copy as f64;
        let rotation = Rotation3::from_axis_angle(&NVector3::z_axis(), shift.to_radians());
        for rib in base.iter().skip(1) {
            ribs.push(Locus {
                toroidal_angle: rib.toroidal_angle + shift,
                points: rib.points.iter().map(|p| rotation * p).collect(),
            });
        }
    }

    LayerLoci {
        name: name.to_owned(),
        ribs,
        ribs_per_segment,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::equilibrium::AnalyticEquilibrium;
    use crate::error::ParastellError;
    use crate::invessel::ComponentSpec;

    const POL: [f64; 5] = [0.0, 90.0, 180.0, 270.0, 360.0];

    fn spec(tor: &[f64], wall_s: f64, layers: &[(&str, f64)]) -> RadialBuildSpec {
        RadialBuildSpec::new(
            tor.to_vec(),
            POL.to_vec(),
            wall_s,
            layers
                .iter()
                .map(|&(n, t)| (n.to_owned(), ComponentSpec::uniform(tor.len(), POL.len(), t)))
                .collect(),
        )
        .unwrap()
    }

    fn options(num_ribs: usize, num_rib_pts: usize, repeat: usize) -> BuildOptions {
        BuildOptions {
            num_ribs,
            num_rib_pts,
            repeat,
            ..BuildOptions::default()
        }
    }

    fn axis_distance(eq: &AnalyticEquilibrium, p: &Point3, phi_deg: f64) -> f64 {
        let axis = eq.surface_point(0.0, 0.0, phi_deg.to_radians()).unwrap() * 100.0;
        (p - axis).norm()
    }

    #[test]
    fn input_density_reproduces_input_angles() {
        let spec = spec(&[0.0, 15.0, 30.0, 60.0], 1.0, &[("wall", 5.0)]);
        let opts = options(4, 5, 0);
        let interp = LociInterpolator::new(&spec, &opts);
        assert_eq!(interp.toroidal_samples(), vec![0.0, 15.0, 30.0, 60.0]);
        assert_eq!(interp.poloidal_samples(), vec![0.0, 90.0, 180.0, 270.0]);

        let loci = interp.execute(&AnalyticEquilibrium::default()).unwrap();
        let angles: Vec<f64> = loci[1].ribs().iter().map(|r| r.toroidal_angle).collect();
        assert_eq!(angles, vec![0.0, 15.0, 30.0, 60.0]);
        assert!(loci[1].ribs().iter().all(|r| r.points.len() == 4));
    }

    #[test]
    fn plasma_boundary_lies_on_last_closed_surface() {
        let eq = AnalyticEquilibrium::circular(5.0, 1.0);
        let spec = spec(&[0.0, 90.0], 1.0, &[("wall", 5.0)]);
        let opts = options(4, 9, 0);
        let loci = LociInterpolator::new(&spec, &opts).execute(&eq).unwrap();

        for rib in loci[0].ribs() {
            for p in &rib.points {
                let d = axis_distance(&eq, p, rib.toroidal_angle);
                assert!((d - 100.0).abs() < 1e-9, "plasma point {d} cm from axis");
            }
        }
    }

    #[test]
    fn thickness_offsets_along_outward_normal() {
        let eq = AnalyticEquilibrium::circular(5.0, 1.0);
        let spec = spec(&[0.0, 90.0], 1.0, &[("wall", 5.0), ("shield", 20.0)]);
        let opts = options(2, 9, 0);
        let loci = LociInterpolator::new(&spec, &opts).execute(&eq).unwrap();

        let expected = [100.0, 105.0, 125.0];
        for (layer, &radius) in loci.iter().zip(&expected) {
            for rib in layer.ribs() {
                for p in &rib.points {
                    let d = axis_distance(&eq, p, rib.toroidal_angle);
                    assert!((d - radius).abs() < 1e-4, "{}: {d} vs {radius}", layer.name());
                }
            }
        }
    }

    #[test]
    fn wall_surface_is_extrapolated_beyond_last_closed_surface() {
        let eq = AnalyticEquilibrium::circular(5.0, 1.0);
        let spec = spec(&[0.0, 90.0], 1.21, &[]);
        let opts = options(2, 5, 0);
        let loci = LociInterpolator::new(&spec, &opts).execute(&eq).unwrap();

        assert_eq!(loci[1].name(), "sol");
        let p = &loci[1].ribs()[0].points[0];
        assert!((axis_distance(&eq, p, 0.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn layer_boundaries_are_ordered_outward() {
        let eq = AnalyticEquilibrium::default();
        let tor = RadialBuildSpec::new(
            vec![0.0, 45.0, 90.0],
            POL.to_vec(),
            1.08,
            vec![
                ("first_wall".to_owned(), ComponentSpec::uniform(3, 5, 5.0)),
                (
                    "breeder".to_owned(),
                    ComponentSpec {
                        thickness: DMatrix::from_fn(3, 5, |r, c| 10.0 + (r + c) as f64),
                        material: None,
                    },
                ),
            ],
        )
        .unwrap();
        let opts = options(7, 13, 0);
        let loci = LociInterpolator::new(&tor, &opts).execute(&eq).unwrap();

        for pair in loci.windows(2) {
            let (inner, outer) = (&pair[0], &pair[1]);
            for (ri, ro) in inner.ribs().iter().zip(outer.ribs()) {
                for (pi, po) in ri.points.iter().zip(&ro.points) {
                    let di = axis_distance(&eq, pi, ri.toroidal_angle);
                    let d_o = axis_distance(&eq, po, ro.toroidal_angle);
                    assert!(di < d_o, "{} not inside {}", inner.name(), outer.name());
                }
            }
        }
    }

    #[test]
    fn repeated_segments_share_their_boundary_rib() {
        let eq = AnalyticEquilibrium::default();
        let spec = spec(&[0.0, 30.0, 60.0], 1.0, &[("wall", 5.0)]);
        let opts = options(3, 5, 2);
        let loci = LociInterpolator::new(&spec, &opts).execute(&eq).unwrap();

        let wall = &loci[1];
        assert_eq!(wall.segment_count(), 3);
        assert_eq!(wall.ribs().len(), 7);

        let first = wall.segment(0).unwrap();
        let second = wall.segment(1).unwrap();
        let last = first.last().unwrap();
        let start = second.first().unwrap();
        assert!((last.toroidal_angle - start.toroidal_angle).abs() < 1e-12);
        for (a, b) in last.points.iter().zip(&start.points) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
        assert!(wall.segment(3).is_none());
    }

    #[test]
    fn repeated_segments_are_rotated_copies() {
        let eq = AnalyticEquilibrium::default();
        let spec = spec(&[0.0, 30.0, 60.0], 1.0, &[("wall", 5.0)]);
        let opts = options(3, 5, 1);
        let loci = LociInterpolator::new(&spec, &opts).execute(&eq).unwrap();

        let ribs = loci[1].ribs();
        let rotation = Rotation3::from_axis_angle(&NVector3::z_axis(), 60f64.to_radians());
        assert!((ribs[3].toroidal_angle - 90.0).abs() < 1e-12);
        for (original, copy) in ribs[1].points.iter().zip(&ribs[3].points) {
            assert_relative_eq!(rotation * original, *copy, epsilon = 1e-9);
        }
    }

    #[test]
    fn repeat_beyond_full_turn_is_rejected() {
        let spec = spec(&[0.0, 90.0], 1.0, &[]);
        let opts = options(2, 5, 4);
        let err = LociInterpolator::new(&spec, &opts)
            .execute(&AnalyticEquilibrium::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ParastellError::Validation(ValidationError::RepeatedExtent(_))
        ));
    }

    #[test]
    fn out_of_range_flux_queries_propagate() {
        struct Narrow;
        impl Equilibrium for Narrow {
            fn surface_point(
                &self,
                s: f64,
                _theta: f64,
                _phi: f64,
            ) -> std::result::Result<Point3, DomainError> {
                if s > 0.5 {
                    return Err(DomainError::FluxLabelOutOfRange { value: s });
                }
                Ok(Point3::origin())
            }
        }

        let spec = spec(&[0.0, 90.0], 1.0, &[]);
        let opts = options(2, 5, 0);
        let err = LociInterpolator::new(&spec, &opts).execute(&Narrow).unwrap_err();
        assert!(matches!(
            err,
            ParastellError::Domain(DomainError::FluxLabelOutOfRange { .. })
        ));
    }
}
