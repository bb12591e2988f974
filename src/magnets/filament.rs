use std::cmp::Ordering;
use std::f64::consts::TAU;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::ConfigurationError;
use crate::math::{wrap_angle, Point3, TOLERANCE};

use super::MagnetOptions;

/// A closed coil filament polyline in cm.
///
/// The last point always repeats the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Filament {
    points: Vec<Point3>,
    line: usize,
}

impl Filament {
    /// Builds a filament from its sampled points, appending the first point
    /// again if the polyline is not already closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Filament`] if fewer than three distinct
    /// points remain.
    pub fn new(mut points: Vec<Point3>, line: usize) -> Result<Self, ConfigurationError> {
        if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
            if (first - last).norm() > TOLERANCE {
                points.push(first);
            }
        }
        if points.len() < 4 {
            return Err(ConfigurationError::Filament {
                line,
                reason: format!(
                    "a coil needs at least three distinct points, got {}",
                    points.len().saturating_sub(1)
                ),
            });
        }
        Ok(Self { points, line })
    }

    /// Closed polyline, last point equal to the first.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Line of the coils file that closed this filament.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Distinct points, without the closing repeat.
    fn distinct(&self) -> &[Point3] {
        &self.points[..self.points.len() - 1]
    }

    /// Average of the distinct points.
    #[must_use]
    pub fn center_of_mass(&self) -> Point3 {
        let pts = self.distinct();
        #[allow(clippy::cast_precision_loss)]
        let n = pts.len() as f64;
        Point3::from(pts.iter().map(|p| p.coords).sum::<nalgebra::Vector3<f64>>() / n)
    }

    /// Toroidal angle of the centre of mass in `[0, 2π)`.
    #[must_use]
    pub fn toroidal_angle(&self) -> f64 {
        let com = self.center_of_mass();
        wrap_angle(com.y.atan2(com.x))
    }

    /// Whether any point lies within `[-tolerance, extent + tolerance]`
    /// radians of toroidal angle.
    fn overlaps(&self, extent: f64, tolerance: f64) -> bool {
        if extent + 2.0 * tolerance >= TAU {
            return true;
        }
        self.distinct().iter().any(|p| {
            let phi = wrap_angle(p.y.atan2(p.x));
            phi <= extent + tolerance || phi >= TAU - tolerance
        })
    }
}

/// Parses MAKEGRID-style coil data.
///
/// The first `start_line` lines are skipped. Each data row holds
/// `x y z current` (extra columns ignored); a zero current closes the
/// current filament and `end` stops parsing. Only every
/// `sample_mod`-th point is kept within a filament, counting from its
/// first point, and the closing point is always kept.
///
/// # Errors
///
/// Returns [`ConfigurationError::Filament`] for malformed rows or
/// filaments with too few points.
pub fn parse_filaments(
    text: &str,
    options: &MagnetOptions,
) -> Result<Vec<Filament>, ConfigurationError> {
    let sample_mod = options.sample_mod.max(1);
    let mut filaments = Vec::new();
    let mut coords = Vec::new();
    let mut counter = 0usize;

    for (idx, raw) in text.lines().enumerate().skip(options.start_line) {
        let line = idx + 1;
        let columns: Vec<&str> = raw.split_whitespace().collect();
        match columns.first() {
            None => continue,
            Some(&"end") => break,
            Some(_) => {}
        }
        if columns.len() < 4 {
            return Err(ConfigurationError::Filament {
                line,
                reason: format!("expected 'x y z current', got {} columns", columns.len()),
            });
        }
        let mut values = [0.0; 4];
        for (value, column) in values.iter_mut().zip(&columns) {
            *value = column.parse().map_err(|_| ConfigurationError::Filament {
                line,
                reason: format!("'{column}' is not a number"),
            })?;
        }
        let [x, y, z, current] = values;
        let point = Point3::new(x, y, z) * options.scale;

        if current.abs() < TOLERANCE {
            coords.push(point);
            filaments.push(Filament::new(std::mem::take(&mut coords), line)?);
            counter = 0;
        } else {
            if counter % sample_mod == 0 {
                coords.push(point);
            }
            counter += 1;
        }
    }

    if !coords.is_empty() {
        warn!(
            points = coords.len(),
            "coils file ends inside a filament; trailing points dropped"
        );
    }
    Ok(filaments)
}

/// Reads and parses a coils file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or any error of
/// [`parse_filaments`].
pub fn read_filaments(path: &Path, options: &MagnetOptions) -> crate::Result<Vec<Filament>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_filaments(&text, options)?)
}

/// Mean distance of all filament points from the z axis.
#[must_use]
pub fn average_radial_distance(filaments: &[Filament]) -> f64 {
    let (sum, count) = filaments
        .iter()
        .flat_map(Filament::distinct)
        .fold((0.0, 0usize), |(sum, count), p| {
            (sum + p.x.hypot(p.y), count + 1)
        });
    if count == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = count as f64;
    sum / count
}

/// Keeps the filaments that reach into `[0, extent]` radians of toroidal
/// angle, widened by `2·atan2(length, r_avg)` for the coil width, and
/// sorts them by the toroidal angle of their centre of mass.
#[must_use]
pub fn filter_and_sort(
    filaments: Vec<Filament>,
    extent: f64,
    characteristic_length: f64,
    r_avg: f64,
) -> Vec<Filament> {
    let tolerance = 2.0 * characteristic_length.atan2(r_avg);
    let mut kept: Vec<(f64, Filament)> = filaments
        .into_iter()
        .filter(|f| f.overlaps(extent, tolerance))
        .map(|f| (f.toroidal_angle(), f))
        .collect();
    kept.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    kept.into_iter().map(|(_, f)| f).collect()
}
